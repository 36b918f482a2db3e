// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Store builder utilities for tests.

use std::rc::Rc;

use warpdrive_core::{
    GraphConfig, IdentifierHooks, ManualScheduler, RecordIdentifier, RelationshipState,
    SchemaPort, Store, StoreConfig, StoreError,
};

use crate::notifier::RecordingNotifier;
use crate::schemas::blog_schema;

/// A store wired to test doubles, plus handles to inspect them.
#[derive(Debug)]
pub struct StoreHarness {
    /// The store under test.
    pub store: Store,
    /// Every notification the store emitted.
    pub notifier: Rc<RecordingNotifier>,
    /// Flush request counter.
    pub scheduler: ManualScheduler,
}

impl StoreHarness {
    /// Runs the pending flush, if any.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.store.flush()
    }

    /// Local members of `owner.field`.
    pub fn local(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
    ) -> Result<Vec<RecordIdentifier>, StoreError> {
        Ok(self.store.graph_mut().get(owner, field)?.local_members())
    }

    /// Canonical members of `owner.field`.
    pub fn remote(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
    ) -> Result<Vec<RecordIdentifier>, StoreError> {
        Ok(self.store.graph_mut().get(owner, field)?.remote_members())
    }
}

/// Builder for [`StoreHarness`].
///
/// Defaults to [`blog_schema`], strict polymorphic assertions, and no
/// identifier hooks.
///
/// # Example
///
/// ```
/// use warpdrive_dry_tests::StoreTestBuilder;
///
/// let mut harness = StoreTestBuilder::new().build();
/// harness
///     .store
///     .push_value(serde_json::json!({ "data": { "type": "post", "id": "1" } }))
///     .unwrap();
/// assert_eq!(harness.store.records().len(), 1);
/// ```
pub struct StoreTestBuilder {
    schema: Rc<dyn SchemaPort>,
    config: StoreConfig,
    hooks: IdentifierHooks,
}

impl Default for StoreTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreTestBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            schema: Rc::new(blog_schema()),
            config: StoreConfig {
                graph: GraphConfig {
                    assert_polymorphic_types: true,
                    payload_diagnostics: false,
                },
                ..StoreConfig::default()
            },
            hooks: IdentifierHooks::default(),
        }
    }

    /// Use a different schema.
    pub fn with_schema(mut self, schema: impl SchemaPort + 'static) -> Self {
        self.schema = Rc::new(schema);
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Install identifier hooks.
    pub fn with_hooks(mut self, hooks: IdentifierHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Build the harness.
    pub fn build(self) -> StoreHarness {
        let notifier = Rc::new(RecordingNotifier::new());
        let scheduler = ManualScheduler::new();
        let store = Store::builder(self.schema)
            .with_config(self.config)
            .with_hooks(self.hooks)
            .with_notifier(notifier.clone())
            .with_scheduler(scheduler.clone())
            .build();
        StoreHarness {
            store,
            notifier,
            scheduler,
        }
    }
}
