// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! warpdrive-core: identifier cache and relationship graph for a client-side
//! record cache.
//!
//! Every resource that enters the cache is mapped to exactly one
//! [`RecordIdentifier`], whatever combination of lid, `type:id` or
//! secondary key it arrived with. The [`Graph`] keeps the relationships
//! between identifiers symmetric, separates canonical (server) state from
//! local edits, and batches canonical payloads into a single flush. The
//! [`Store`] ties both to a small record lifecycle cache.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::too_many_lines,
    clippy::needless_pass_by_value,
    clippy::option_if_let_else,
    clippy::significant_drop_tightening
)]
// Identifier keys hash by their immutable lid; the set-once id cell never
// participates in `Hash` or `Eq`.
#![allow(clippy::mutable_key_type)]

mod config;
mod edge;
mod graph;
mod ident;
mod identifier_cache;
mod notify;
mod record_cache;
mod relationship;
mod resource;
mod scheduler;
mod schema;
mod store;

// Re-exports for stable public API
/// Store, graph and identifier configuration.
pub use config::{ConfigError, GraphConfig, IdentifierConfig, StoreConfig, DEFAULT_LID_PREFIX};
/// Resolved edge definitions and relationship keys.
pub use edge::{
    EdgeDefinition, EdgeError, EdgeKind, EdgeResolver, FieldKey, ImplicitKey, Inverse,
    DEFAULT_ASYNC, DEFAULT_POLYMORPHIC,
};
/// Relationship graph and its owner registry.
pub use graph::{Graph, GraphError, GraphRegistry, OwnerHandle};
/// Identifier handles.
pub use ident::{DocumentIdentifier, IdentifierBucket, RecordIdentifier, ResourceKey};
/// Identifier cache and its lifecycle hooks.
pub use identifier_cache::{
    ForgetMethod, GenerationInput, GenerationMethod, IdentifierCache, IdentifierError,
    IdentifierHooks, ResetMethod, ResourceRef, UpdateMethod,
};
/// Change notification port.
pub use notify::{NotificationBucket, NotificationPort, NullNotifier};
/// Record lifecycle cache.
pub use record_cache::{RecordCache, RecordEntry, RecordState};
/// Relationship variants and their shared state.
pub use relationship::{
    BelongsToRelationship, CollectionRelationship, ImplicitRelationship, LinksUpdate, MemberSet,
    Membership, RecordLifecycle, Relationship, RelationshipFlags, RelationshipMembers,
    RelationshipSnapshot, RelationshipState,
};
/// JSON:API-shaped payload types.
pub use resource::{
    Document, Link, Links, PrimaryData, RelationshipData, RelationshipPayload, RequestInfo,
    Resource, ResourcePointer, ResourceView,
};
/// Flush scheduling port.
pub use scheduler::{FlushScheduler, ManualScheduler};
/// Schema port and the in-memory registry.
pub use schema::{
    InverseOption, RelationshipKind, RelationshipOptions, RelationshipSchema, SchemaPort,
    SchemaRegistry,
};
/// Store facade.
pub use store::{Store, StoreBuilder, StoreError};
