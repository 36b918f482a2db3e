// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Store facade: identifier cache, relationship graph and record cache
//! behind one API.
//!
//! The store is where request outcomes meet the cache. [`Store::push`]
//! ingests documents, [`Store::fulfill`] reconciles the identifier a request
//! was made with against the resource that came back (merging when both
//! denote one entity), and the commit methods drive the save lifecycle the
//! graph consults when reconciling canonical state.
use std::fmt;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::StoreConfig;
use crate::graph::{Graph, GraphError};
use crate::ident::RecordIdentifier;
use crate::identifier_cache::{IdentifierCache, IdentifierError, IdentifierHooks, ResourceRef};
use crate::notify::{NotificationBucket, NotificationPort, NullNotifier};
use crate::record_cache::{RecordCache, RecordState};
use crate::relationship::{RecordLifecycle, RelationshipSnapshot};
use crate::resource::{Document, PrimaryData, Resource, ResourcePointer, ResourceView};
use crate::scheduler::{FlushScheduler, ManualScheduler};
use crate::schema::SchemaPort;

/// Errors raised by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Graph operation failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Identifier operation failed.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    /// Document JSON did not parse.
    #[error("invalid document: {0}")]
    Json(#[from] serde_json::Error),
    /// Unload requested while a save is in flight.
    #[error("cannot unload `{lid}` while a save is in flight")]
    UnloadInFlight {
        /// Identifier lid.
        lid: String,
    },
    /// No record is materialized for the identifier.
    #[error("no record for `{lid}`")]
    UnknownRecord {
        /// Identifier lid.
        lid: String,
    },
    /// Commit outcome reported for a record that is not being saved.
    #[error("record `{lid}` has no save in flight")]
    NotInFlight {
        /// Identifier lid.
        lid: String,
    },
    /// A request outcome carried no single primary resource.
    #[error("document has no single primary resource")]
    MissingPrimaryData,
}

/// Builder for [`Store`].
pub struct StoreBuilder {
    schema: Rc<dyn SchemaPort>,
    config: StoreConfig,
    hooks: IdentifierHooks,
    notifier: Rc<dyn NotificationPort>,
    scheduler: Box<dyn FlushScheduler>,
}

impl StoreBuilder {
    /// Builder over `schema` with default config, no hooks, a discarding
    /// notifier and a [`ManualScheduler`].
    pub fn new(schema: Rc<dyn SchemaPort>) -> Self {
        Self {
            schema,
            config: StoreConfig::default(),
            hooks: IdentifierHooks::default(),
            notifier: Rc::new(NullNotifier),
            scheduler: Box::new(ManualScheduler::new()),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Installs identifier lifecycle hooks.
    pub fn with_hooks(mut self, hooks: IdentifierHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Routes notifications to `notifier`.
    pub fn with_notifier(mut self, notifier: Rc<dyn NotificationPort>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Uses `scheduler` for flush requests.
    pub fn with_scheduler(mut self, scheduler: impl FlushScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    /// Builds the store.
    pub fn build(self) -> Store {
        let graph = Graph::new(
            self.schema,
            self.config.graph,
            self.scheduler,
            Rc::clone(&self.notifier),
        );
        Store {
            identifiers: IdentifierCache::new(self.config.identifiers, self.hooks),
            graph,
            records: RecordCache::new(),
            notifier: self.notifier,
            dematerialized: FxHashSet::default(),
        }
    }
}

/// The cache as seen by a host application.
pub struct Store {
    identifiers: IdentifierCache,
    graph: Graph,
    records: RecordCache,
    notifier: Rc<dyn NotificationPort>,
    /// Unloaded identifiers still referenced by an async edge.
    dematerialized: FxHashSet<RecordIdentifier>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("identifiers", &self.identifiers)
            .field("graph", &self.graph)
            .field("records", &self.records.len())
            .field("dematerialized", &self.dematerialized.len())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Starts a [`StoreBuilder`].
    pub fn builder(schema: Rc<dyn SchemaPort>) -> StoreBuilder {
        StoreBuilder::new(schema)
    }

    /// Identifier cache.
    pub fn identifier_cache(&self) -> &IdentifierCache {
        &self.identifiers
    }

    /// Mutable identifier cache, for hook setters and request-layer lookups.
    pub fn identifier_cache_mut(&mut self) -> &mut IdentifierCache {
        &mut self.identifiers
    }

    /// Relationship graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable relationship graph.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Record cache.
    pub fn records(&self) -> &RecordCache {
        &self.records
    }

    /// Resolves `resource` to an identifier, creating one if needed.
    pub fn identifier_for<'a>(
        &mut self,
        resource: impl Into<ResourceRef<'a>>,
    ) -> Result<RecordIdentifier, StoreError> {
        Ok(self.identifiers.get_or_create_record_identifier(resource)?)
    }

    /// Returns `true` while `identifier` is unloaded but still referenced.
    pub fn is_dematerialized(&self, identifier: &RecordIdentifier) -> bool {
        self.dematerialized.contains(identifier)
    }

    /// Returns `true` while a graph flush has been requested and not run.
    pub fn has_pending_flush(&self) -> bool {
        self.graph.has_pending_flush()
    }

    /// Ingests a document and returns the primary identifiers in order.
    /// Resources are applied one at a time, primary data first.
    ///
    /// The whole document is checked before anything is applied: a resource
    /// whose type or id contradicts a known identifier, or a linkage with a
    /// bad shape, key or member type, rejects the document with no record,
    /// identifier, relationship or notification changed. Failures raised by
    /// host identifier hooks can only surface while applying.
    pub fn push(&mut self, document: Document) -> Result<Vec<RecordIdentifier>, StoreError> {
        self.validate(&document)?;
        self.apply(&document)
    }

    fn apply(&mut self, document: &Document) -> Result<Vec<RecordIdentifier>, StoreError> {
        let primary = match &document.data {
            Some(PrimaryData::Many(list)) => list.len(),
            Some(PrimaryData::One(_)) => 1,
            Some(PrimaryData::Null) | None => 0,
        };
        let mut identifiers = Vec::with_capacity(primary);
        for (index, resource) in document.resources().enumerate() {
            let identifier = self.push_resource(resource)?;
            if index < primary {
                identifiers.push(identifier);
            }
        }
        Ok(identifiers)
    }

    /// [`Store::push`] for raw JSON.
    pub fn push_value(&mut self, document: Value) -> Result<Vec<RecordIdentifier>, StoreError> {
        let document: Document = serde_json::from_value(document)?;
        self.push(document)
    }

    /// Settles a request made with `request` against the document it
    /// returned and yields the identifier that now stands for the entity.
    ///
    /// When the returned resource turns out to be an entity that is already
    /// known under another identifier, the two are merged before the data
    /// is pushed, so racing lookups settle on one identifier and one record.
    pub fn fulfill(
        &mut self,
        request: &RecordIdentifier,
        document: Document,
    ) -> Result<RecordIdentifier, StoreError> {
        let Some(PrimaryData::One(resource)) = &document.data else {
            return Err(StoreError::MissingPrimaryData);
        };
        self.identifiers.check_update(request, resource.view())?;
        self.validate(&document)?;
        let survivor = self.reconcile(request, resource.view())?;
        self.apply(&document)?;
        Ok(survivor)
    }

    /// Creates a client-side record.
    pub fn create_record(
        &mut self,
        resource_type: &str,
        id: Option<&str>,
        attributes: Map<String, Value>,
    ) -> Result<RecordIdentifier, StoreError> {
        let identifier = self
            .identifiers
            .create_identifier_for_new_record(resource_type, id)?;
        self.records.insert_new(&identifier, attributes);
        self.notifier
            .notify(&identifier, NotificationBucket::Added, None);
        Ok(identifier)
    }

    /// Current value of `identifier.name`.
    pub fn attribute(&self, identifier: &RecordIdentifier, name: &str) -> Option<&Value> {
        self.records.get(identifier)?.attributes.get(name)
    }

    /// Sets `identifier.name` locally; notifies if the value changed.
    pub fn set_attribute(
        &mut self,
        identifier: &RecordIdentifier,
        name: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        if !self.records.contains(identifier) {
            return Err(unknown_record(identifier));
        }
        let mut single = Map::new();
        single.insert(name.to_owned(), value);
        for changed in self.records.apply_attributes(identifier, &single) {
            self.notifier
                .notify(identifier, NotificationBucket::Attributes, Some(&changed));
        }
        Ok(())
    }

    /// Reader snapshot of `identifier.field`.
    pub fn relationship(
        &mut self,
        identifier: &RecordIdentifier,
        field: &str,
    ) -> Result<RelationshipSnapshot, StoreError> {
        Ok(self.graph.get_data(identifier, field)?)
    }

    /// Local add to a to-many field. See [`Graph::add_to_relationship`].
    pub fn add_to_relationship(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        members: &[RecordIdentifier],
        index: Option<usize>,
    ) -> Result<(), StoreError> {
        Ok(self.graph.add_to_relationship(owner, field, members, index)?)
    }

    /// Local removal from a to-many field.
    pub fn remove_from_relationship(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        members: &[RecordIdentifier],
    ) -> Result<(), StoreError> {
        Ok(self.graph.remove_from_relationship(owner, field, members)?)
    }

    /// Local replacement of a field's members.
    pub fn replace_relationship(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        members: &[RecordIdentifier],
    ) -> Result<(), StoreError> {
        Ok(self.graph.replace_relationship(owner, field, members)?)
    }

    /// Local assignment of a to-one field.
    pub fn set_belongs_to(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        member: Option<&RecordIdentifier>,
    ) -> Result<(), StoreError> {
        Ok(self.graph.set_belongs_to(owner, field, member)?)
    }

    /// Marks a save as started.
    pub fn will_commit(&mut self, identifier: &RecordIdentifier) -> Result<(), StoreError> {
        match self.records.state(identifier) {
            None => Err(unknown_record(identifier)),
            Some(RecordState::InFlight { .. }) => Ok(()),
            Some(_) => {
                self.records.will_commit(identifier);
                Ok(())
            }
        }
    }

    /// Settles an accepted save. The server's copy of the resource, when
    /// returned, may assign the id and carries the new canonical state.
    pub fn did_commit(
        &mut self,
        identifier: &RecordIdentifier,
        resource: Option<Resource>,
    ) -> Result<RecordIdentifier, StoreError> {
        if !self.records.is_in_flight(identifier) {
            return Err(StoreError::NotInFlight {
                lid: identifier.lid().to_owned(),
            });
        }
        let Some(resource) = resource else {
            self.records.settle(identifier, true);
            return Ok(identifier.clone());
        };
        let survivor = self.reconcile(identifier, resource.view())?;
        self.records.settle(&survivor, true);
        self.push(Document::single(resource))?;
        Ok(survivor)
    }

    /// Settles a rejected save; the record returns to its prior state.
    pub fn commit_was_rejected(&mut self, identifier: &RecordIdentifier) -> Result<(), StoreError> {
        if self.records.settle(identifier, false) {
            Ok(())
        } else {
            Err(StoreError::NotInFlight {
                lid: identifier.lid().to_owned(),
            })
        }
    }

    /// Unloads the record for `identifier`.
    ///
    /// Refused while a save is in flight. The graph decides per edge whether
    /// the departure removes the edge; the identifier is forgotten once no
    /// edge references it, now or at a later [`Store::flush`].
    pub fn unload_record(&mut self, identifier: &RecordIdentifier) -> Result<(), StoreError> {
        if self.records.is_in_flight(identifier) {
            return Err(StoreError::UnloadInFlight {
                lid: identifier.lid().to_owned(),
            });
        }
        let releasable = self.graph.unload(identifier, &self.records)?;
        if self.records.remove(identifier).is_some() {
            self.notifier
                .notify(identifier, NotificationBucket::Removed, None);
        }
        if releasable {
            self.dematerialized.remove(identifier);
            self.identifiers.forget_record_identifier(identifier);
        } else {
            self.dematerialized.insert(identifier.clone());
        }
        Ok(())
    }

    /// Runs a pending graph flush, then forgets dematerialized identifiers
    /// that no edge references any more. Payloads that failed to apply are
    /// reported after the release sweep has run.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let applied = self.graph.flush(&self.records);
        let records = &self.records;
        self.dematerialized
            .retain(|identifier| !records.contains(identifier));
        let released: Vec<RecordIdentifier> = self
            .dematerialized
            .iter()
            .filter(|identifier| self.graph.is_releasable(identifier))
            .cloned()
            .collect();
        for identifier in released {
            self.dematerialized.remove(&identifier);
            self.graph.remove(&identifier);
            self.identifiers.forget_record_identifier(&identifier);
        }
        applied.map_err(StoreError::from)
    }

    /// Tears the store down: destroys the graph, drops every record and
    /// resets the identifier cache (firing its reset method).
    pub fn reset(&mut self) {
        self.graph.destroy();
        self.records.clear();
        self.dematerialized.clear();
        self.identifiers.reset();
    }

    /// Checks every resource and linkage of `document` against the current
    /// caches. Linkage may point at the lid of a resource applied earlier in
    /// the same document, or at its own resource.
    fn validate(&mut self, document: &Document) -> Result<(), StoreError> {
        let identifiers = &self.identifiers;
        let graph = &mut self.graph;
        let mut staged: FxHashMap<&str, &str> = FxHashMap::default();
        for resource in document.resources() {
            if resource.resource_type.is_empty() {
                return Err(IdentifierError::MissingType.into());
            }
            if let Some(known) = identifiers.peek_record_identifier(resource.view()) {
                identifiers.check_update(&known, resource.view())?;
            }
            if let Some(lid) = resource.lid.as_deref() {
                staged.insert(lid, &resource.resource_type);
            }
            let Some(relationships) = &resource.relationships else {
                continue;
            };
            let member_type =
                |pointer: &ResourcePointer| pointer_type(identifiers, &staged, pointer);
            for (field, payload) in relationships {
                graph.validate_push(&resource.resource_type, field, payload, &member_type)?;
            }
        }
        Ok(())
    }

    fn push_resource(&mut self, resource: &Resource) -> Result<RecordIdentifier, StoreError> {
        let found = self.identifiers.get_or_create_record_identifier(resource)?;
        let identifier = self.reconcile(&found, resource.view())?;
        let (_, created) = self.records.upsert_loaded(&identifier);
        if created {
            self.notifier
                .notify(&identifier, NotificationBucket::Added, None);
        }
        if let Some(attributes) = &resource.attributes {
            for changed in self.records.apply_attributes(&identifier, attributes) {
                self.notifier
                    .notify(&identifier, NotificationBucket::Attributes, Some(&changed));
            }
        }
        if let Some(relationships) = &resource.relationships {
            for (field, payload) in relationships {
                self.graph
                    .push(&mut self.identifiers, &identifier, field, payload.clone())?;
            }
        }
        self.dematerialized.remove(&identifier);
        Ok(identifier)
    }

    /// Applies `view` to `identifier` in the identifier cache and carries any
    /// resulting merge through the graph and the record cache.
    fn reconcile(
        &mut self,
        identifier: &RecordIdentifier,
        view: ResourceView<'_>,
    ) -> Result<RecordIdentifier, StoreError> {
        let candidates: Vec<RecordIdentifier> = [
            Some(identifier.clone()),
            view.lid.and_then(|lid| self.identifiers.peek_lid(lid)),
            view.id.and_then(|id| {
                self.identifiers
                    .peek_record_identifier(ResourceView::new(identifier.resource_type(), Some(id)))
            }),
        ]
        .into_iter()
        .flatten()
        .collect();
        let had_id = identifier.id().is_some();
        let survivor = self.identifiers.update_record_identifier(identifier, view)?;

        let mut merged = false;
        for loser in &candidates {
            if loser.ptr_eq(&survivor) || self.identifiers.contains(loser) {
                continue;
            }
            debug!(loser = loser.lid(), survivor = survivor.lid(), "absorbing merged identifier");
            self.graph.merge_identifiers(loser, &survivor);
            self.records.rekey(loser, &survivor);
            self.dematerialized.remove(loser);
            merged = true;
        }
        if merged || (!had_id && survivor.id().is_some()) {
            self.notifier
                .notify(&survivor, NotificationBucket::Identity, None);
        }
        Ok(survivor)
    }
}

/// Type a linkage resolves to: a known or staged lid first, then the
/// pointer's own type.
fn pointer_type(
    identifiers: &IdentifierCache,
    staged: &FxHashMap<&str, &str>,
    pointer: &ResourcePointer,
) -> Option<String> {
    if let Some(lid) = pointer.lid.as_deref() {
        if let Some(known) = identifiers.peek_lid(lid) {
            return Some(known.resource_type().to_owned());
        }
        if let Some(staged) = staged.get(lid) {
            return Some((*staged).to_owned());
        }
    }
    pointer.resource_type.clone().filter(|ty| !ty.is_empty())
}

fn unknown_record(identifier: &RecordIdentifier) -> StoreError {
    StoreError::UnknownRecord {
        lid: identifier.lid().to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::schema::{RelationshipSchema, SchemaRegistry};

    #[derive(Default)]
    struct Log(RefCell<Vec<(String, NotificationBucket, Option<String>)>>);

    impl NotificationPort for Log {
        fn notify(&self, identifier: &RecordIdentifier, bucket: NotificationBucket, key: Option<&str>) {
            self.0
                .borrow_mut()
                .push((identifier.lid().to_owned(), bucket, key.map(str::to_owned)));
        }
    }

    fn store() -> (Store, Rc<Log>) {
        let schema = SchemaRegistry::new()
            .with_type(
                "post",
                [RelationshipSchema::has_many("comments", "comment").with_async(false)],
            )
            .with_type(
                "comment",
                [RelationshipSchema::belongs_to("post", "post").with_async(false)],
            );
        let log = Rc::new(Log::default());
        let store = Store::builder(Rc::new(schema))
            .with_notifier(log.clone())
            .build();
        (store, log)
    }

    #[test]
    fn push_notifies_added_then_changed_attributes() {
        let (mut store, log) = store();
        let ids = store
            .push_value(json!({ "data": { "type": "post", "id": "1", "attributes": { "title": "A" } } }))
            .unwrap();
        assert_eq!(ids.len(), 1);
        let buckets: Vec<_> = log.0.take().into_iter().map(|(_, b, _)| b).collect();
        assert_eq!(buckets, vec![NotificationBucket::Added, NotificationBucket::Attributes]);

        store
            .push_value(json!({ "data": { "type": "post", "id": "1", "attributes": { "title": "B" } } }))
            .unwrap();
        let seen = log.0.take();
        assert_eq!(seen, vec![(ids[0].lid().to_owned(), NotificationBucket::Attributes, Some("title".into()))]);
        assert_eq!(store.attribute(&ids[0], "title"), Some(&json!("B")));
    }

    #[test]
    fn did_commit_assigns_id_and_notifies_identity() {
        let (mut store, log) = store();
        let post = store.create_record("post", None, Map::new()).unwrap();
        store.will_commit(&post).unwrap();
        log.0.take();
        let survivor = store
            .did_commit(&post, Some(Resource::new("post", Some("9"))))
            .unwrap();
        assert!(survivor.ptr_eq(&post));
        assert_eq!(post.id(), Some("9"));
        assert_eq!(store.records().state(&post), Some(RecordState::Loaded));
        assert!(log.0.take().iter().any(|(_, b, _)| *b == NotificationBucket::Identity));
        assert!(matches!(store.did_commit(&post, None), Err(StoreError::NotInFlight { .. })));
    }

    #[test]
    fn rejected_commit_restores_new_state() {
        let (mut store, _) = store();
        let post = store.create_record("post", None, Map::new()).unwrap();
        store.will_commit(&post).unwrap();
        store.commit_was_rejected(&post).unwrap();
        assert_eq!(store.records().state(&post), Some(RecordState::New));
        assert!(store.commit_was_rejected(&post).is_err());
    }

    #[test]
    fn unload_forgets_unreferenced_identifier() {
        let (mut store, log) = store();
        let ids = store.push_value(json!({ "data": { "type": "post", "id": "1" } })).unwrap();
        log.0.take();
        store.unload_record(&ids[0]).unwrap();
        assert!(!store.identifier_cache().contains(&ids[0]));
        assert!(!store.records().contains(&ids[0]));
        assert_eq!(log.0.take()[0].1, NotificationBucket::Removed);
        let again = store.push_value(json!({ "data": { "type": "post", "id": "1" } })).unwrap();
        assert!(!again[0].ptr_eq(&ids[0]), "a forgotten identifier is not reused");
    }

    #[test]
    fn reset_tears_everything_down() {
        let (mut store, _) = store();
        store.push_value(json!({ "data": { "type": "post", "id": "1" } })).unwrap();
        store.reset();
        assert!(store.identifier_cache().is_empty());
        assert!(store.records().is_empty());
        assert!(store.graph().is_destroyed());
        assert!(matches!(
            store.push_value(json!({ "data": { "type": "post", "id": "1", "relationships": { "comments": { "data": [] } } } })),
            Err(StoreError::Graph(GraphError::Destroyed))
        ));
    }

    #[test]
    fn rejected_linkage_leaves_store_untouched() {
        let (mut store, log) = store();
        let err = store
            .push_value(json!({ "data": {
                "type": "post", "id": "1",
                "attributes": { "title": "A" },
                "relationships": { "comments": { "data": [{ "id": "9" }] } }
            } }))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Graph(GraphError::MissingResourceKey { .. })
        ));
        assert!(store.records().is_empty());
        assert!(store.identifier_cache().is_empty());
        assert!(log.0.take().is_empty());
        assert!(!store.has_pending_flush());
    }

    #[test]
    fn later_bad_resource_rejects_whole_document() {
        let (mut store, log) = store();
        let err = store
            .push_value(json!({ "data": [
                { "type": "post", "id": "1",
                  "relationships": { "comments": { "data": [{ "type": "comment", "id": "1" }] } } },
                { "type": "post", "id": "2",
                  "relationships": { "comments": { "data": { "type": "comment", "id": "3" } } } }
            ] }))
            .unwrap_err();
        assert!(matches!(err, StoreError::Graph(GraphError::PayloadShape { .. })));
        assert!(store.records().is_empty());
        assert!(store.identifier_cache().is_empty());
        assert!(log.0.take().is_empty());
        assert!(!store.has_pending_flush());
    }

    #[test]
    fn contradicting_known_identifier_rejects_before_applying() {
        let (mut store, log) = store();
        let post = store.create_record("post", None, Map::new()).unwrap();
        store.push_value(json!({ "data": { "type": "post", "id": "7" } })).unwrap();
        log.0.take();
        let err = store
            .push_value(json!({ "data": [
                { "type": "post", "id": "8", "attributes": { "title": "fine" } },
                { "type": "comment", "lid": post.lid() }
            ] }))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Identifier(IdentifierError::TypeMismatch { .. })
        ));
        assert_eq!(store.records().len(), 2);
        assert_eq!(store.identifier_cache().len(), 2);
        assert!(log.0.take().is_empty());
    }

    #[test]
    fn linkage_may_name_a_lid_introduced_by_the_same_document() {
        let (mut store, _) = store();
        let err = store
            .push_value(json!({ "data": {
                "type": "post", "id": "1",
                "relationships": { "comments": { "data": [{ "lid": "draft-comment" }] } }
            } }))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Graph(GraphError::Identifier(IdentifierError::MissingType))
        ));

        let ids = store
            .push_value(json!({ "data": {
                "type": "comment", "lid": "draft-comment",
                "relationships": { "post": { "data": { "type": "post", "id": "1" } } }
            }, "included": [{
                "type": "post", "id": "1",
                "relationships": { "comments": { "data": [{ "lid": "draft-comment" }] } }
            }] }))
            .unwrap();
        store.flush().unwrap();
        let post = store.identifier_for(&Resource::new("post", Some("1"))).unwrap();
        let comments = store.relationship(&post, "comments").unwrap();
        assert_eq!(
            comments.data,
            Some(crate::relationship::RelationshipMembers::Many(ids))
        );
    }

    #[test]
    fn fulfill_requires_single_primary_resource() {
        let (mut store, _) = store();
        let request = store.identifier_for(&Resource::new("post", Some("1"))).unwrap();
        assert!(matches!(
            store.fulfill(&request, Document::default()),
            Err(StoreError::MissingPrimaryData)
        ));
    }
}
