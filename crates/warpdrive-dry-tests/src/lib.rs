// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Shared test doubles and fixtures for WarpDrive crates.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`hooks`] - Counting and secondary-key identifier hooks
//! - [`notifier`] - Recording notification port
//! - [`payloads`] - Resource and document builders
//! - [`schemas`] - Canonical fixture schemas
//! - [`store`] - Store builder preloaded with test doubles

pub mod hooks;
pub mod notifier;
pub mod payloads;
pub mod schemas;
pub mod store;

// Re-export commonly used items at crate root for convenience
pub use hooks::{HookCounters, SecondaryKeyHooks};
pub use notifier::{Notification, RecordingNotifier};
pub use payloads::{document, documents, pointer, ResourceBuilder};
pub use schemas::blog_schema;
pub use store::{StoreHarness, StoreTestBuilder};
