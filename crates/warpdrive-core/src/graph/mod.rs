// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Relationship graph: identifier -> relationship bags.
//!
//! The graph owns every relationship instance and keeps inverse edges
//! symmetric. Canonical payloads are queued by [`Graph::push`] and applied in
//! one batch by [`Graph::flush`]; local edits apply and notify immediately.
//!
//! # Flush
//!
//! A flush takes both queues before applying anything, applies the has-many
//! queue and then the belongs-to queue (each in enqueue order), reconciles
//! every relationship whose canonical state changed, and finally dispatches
//! at most one notification per `(identifier, field)`.
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap, FxHashSet};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::GraphConfig;
use crate::edge::{EdgeDefinition, EdgeError, EdgeKind, EdgeResolver, FieldKey, ImplicitKey};
use crate::ident::RecordIdentifier;
use crate::identifier_cache::{IdentifierCache, IdentifierError};
use crate::notify::{NotificationBucket, NotificationPort};
use crate::relationship::{
    MemberSet, RecordLifecycle, Relationship, RelationshipSnapshot, RelationshipState,
};
use crate::resource::{Links, RelationshipData, RelationshipPayload, ResourcePointer};
use crate::scheduler::FlushScheduler;
use crate::schema::SchemaPort;

mod operations;
mod registry;
mod unload;

pub use registry::{GraphRegistry, OwnerHandle};

/// Errors raised by graph operations. All are raised before any mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Schema resolution failed.
    #[error(transparent)]
    Edge(#[from] EdgeError),
    /// Identifier resolution failed.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),
    /// A linkage had neither a lid nor a `type` + `id` pair.
    #[error("`{resource_type}.{field}` received linkage without a lid or a type and id")]
    MissingResourceKey {
        /// Owner type.
        resource_type: String,
        /// Field name.
        field: String,
    },
    /// Linkage shape does not match the field's cardinality.
    #[error("`{resource_type}.{field}` expects {expected}")]
    PayloadShape {
        /// Owner type.
        resource_type: String,
        /// Field name.
        field: String,
        /// Expected shape.
        expected: &'static str,
    },
    /// The operation does not apply to this field's kind.
    #[error("`{operation}` is not valid for `{resource_type}.{field}`")]
    WrongKind {
        /// Owner type.
        resource_type: String,
        /// Field name.
        field: String,
        /// Rejected operation.
        operation: &'static str,
    },
    /// Member type is neither the declared type nor a registered pairing.
    #[error("`{resource_type}.{field}` relates to `{expected}`, cannot hold a `{found}`")]
    TypeMismatch {
        /// Owner type.
        resource_type: String,
        /// Field name.
        field: String,
        /// Declared related type.
        expected: String,
        /// Offending member type.
        found: String,
    },
    /// Unload requested while a save is in flight.
    #[error("cannot unload `{lid}` while a save is in flight")]
    UnloadInFlight {
        /// Identifier lid.
        lid: String,
    },
    /// The graph was destroyed.
    #[error("graph has been destroyed")]
    Destroyed,
    /// Queued payloads that could not be applied during a flush. The rest
    /// of the batch was applied.
    #[error("{} queued relationship payload(s) failed to apply", .0.len())]
    Flush(Vec<GraphError>),
}

/// A canonical payload waiting for the next flush. Linkage is already
/// resolved to identifiers so that errors surface at push time.
#[derive(Debug)]
struct QueuedPush {
    identifier: RecordIdentifier,
    field: String,
    data: Option<Vec<RecordIdentifier>>,
    links: Option<Links>,
    meta: Option<Value>,
}

#[derive(Debug, Default)]
struct PushQueues {
    has_many: Vec<QueuedPush>,
    belongs_to: Vec<QueuedPush>,
}

impl PushQueues {
    fn len(&self) -> usize {
        self.has_many.len() + self.belongs_to.len()
    }
}

type ExplicitBag = FxHashMap<String, Relationship>;
type ImplicitBag = FxHashMap<ImplicitKey, Relationship>;

/// The relationship graph.
pub struct Graph {
    edges: EdgeResolver,
    config: GraphConfig,
    identifiers: FxHashMap<RecordIdentifier, ExplicitBag>,
    implicit: FxHashMap<RecordIdentifier, ImplicitBag>,
    queued: PushQueues,
    pending_flush: bool,
    pending_sync: Vec<(RecordIdentifier, FieldKey)>,
    changed: IndexSet<(RecordIdentifier, String), FxBuildHasher>,
    polymorphic: FxHashMap<String, FxHashSet<String>>,
    scheduler: Box<dyn FlushScheduler>,
    notifier: Rc<dyn NotificationPort>,
    destroyed: bool,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("edges", &self.edges)
            .field("identifiers", &self.identifiers.len())
            .field("implicit", &self.implicit.len())
            .field("queued", &self.queued.len())
            .field("pending_flush", &self.pending_flush)
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl Graph {
    /// Creates an empty graph.
    pub fn new(
        schema: Rc<dyn SchemaPort>,
        config: GraphConfig,
        scheduler: Box<dyn FlushScheduler>,
        notifier: Rc<dyn NotificationPort>,
    ) -> Self {
        Self {
            edges: EdgeResolver::new(schema),
            config,
            identifiers: FxHashMap::default(),
            implicit: FxHashMap::default(),
            queued: PushQueues::default(),
            pending_flush: false,
            pending_sync: Vec::new(),
            changed: IndexSet::default(),
            polymorphic: FxHashMap::default(),
            scheduler,
            notifier,
            destroyed: false,
        }
    }

    /// Resolved definition of `resource_type.field`.
    pub fn definition(
        &mut self,
        resource_type: &str,
        field: &str,
    ) -> Result<Rc<EdgeDefinition>, GraphError> {
        Ok(self.edges.definition(resource_type, field)?)
    }

    /// Returns `true` once `identifier.field` has been instantiated.
    pub fn has(&self, identifier: &RecordIdentifier, field: &str) -> bool {
        self.identifiers
            .get(identifier)
            .is_some_and(|bag| bag.contains_key(field))
    }

    /// Existing relationship instance, without instantiating.
    pub fn peek(&self, identifier: &RecordIdentifier, key: &FieldKey) -> Option<&Relationship> {
        match key {
            FieldKey::Named(field) => self.identifiers.get(identifier)?.get(field),
            FieldKey::Implicit(key) => self.implicit.get(identifier)?.get(key),
        }
    }

    /// Relationship instance for `identifier.field`, created on first access.
    pub fn get(
        &mut self,
        identifier: &RecordIdentifier,
        field: &str,
    ) -> Result<&Relationship, GraphError> {
        self.ensure_live()?;
        let rel = self.ensure(identifier, &FieldKey::Named(field.to_owned()))?;
        Ok(rel)
    }

    /// Reader snapshot of `identifier.field`.
    pub fn get_data(
        &mut self,
        identifier: &RecordIdentifier,
        field: &str,
    ) -> Result<RelationshipSnapshot, GraphError> {
        self.get(identifier, field).map(RelationshipState::get_data)
    }

    /// Identifiers with at least one instantiated explicit relationship.
    pub fn identifiers(&self) -> impl Iterator<Item = &RecordIdentifier> {
        self.identifiers.keys()
    }

    /// Returns `true` while a flush has been requested and not yet run.
    pub fn has_pending_flush(&self) -> bool {
        self.pending_flush
    }

    /// Queues a canonical payload for `identifier.field`.
    ///
    /// Linkage is resolved through `cache` and type-checked immediately; the
    /// relationship itself changes on the next [`Graph::flush`]. The first
    /// push of a batch asks the scheduler for a flush.
    pub fn push(
        &mut self,
        cache: &mut IdentifierCache,
        identifier: &RecordIdentifier,
        field: &str,
        payload: RelationshipPayload,
    ) -> Result<(), GraphError> {
        self.ensure_live()?;
        let definition = self.edges.definition(identifier.resource_type(), field)?;
        let data = match &payload.data {
            Some(data) => Some(self.resolve_linkage(cache, &definition, data)?),
            None => None,
        };
        let queued = QueuedPush {
            identifier: identifier.clone(),
            field: field.to_owned(),
            data,
            links: payload.links,
            meta: payload.meta,
        };
        if definition.kind == EdgeKind::BelongsTo {
            self.queued.belongs_to.push(queued);
        } else {
            self.queued.has_many.push(queued);
        }
        self.schedule();
        Ok(())
    }

    /// Checks a canonical payload for `resource_type.field` without
    /// resolving or creating identifiers and without queueing anything.
    ///
    /// `member_type` names the type a pointer resolves to, or `None` when it
    /// cannot be resolved. Every error [`Graph::push`] can raise for the
    /// payload's shape, keys or member types is raised here first.
    pub fn validate_push(
        &mut self,
        resource_type: &str,
        field: &str,
        payload: &RelationshipPayload,
        member_type: &dyn Fn(&ResourcePointer) -> Option<String>,
    ) -> Result<(), GraphError> {
        self.ensure_live()?;
        let definition = self.edges.definition(resource_type, field)?;
        let Some(data) = &payload.data else {
            return Ok(());
        };
        for pointer in linkage_pointers(&definition, data)? {
            check_pointer_key(&definition, pointer)?;
            let found = member_type(pointer).ok_or(IdentifierError::MissingType)?;
            self.admit_member_type(&definition, &found)?;
        }
        Ok(())
    }

    /// Applies queued payloads, reconciles changed relationships and
    /// dispatches notifications.
    ///
    /// A payload that fails to apply does not stop the batch; the failures
    /// are returned together as [`GraphError::Flush`] once the batch has
    /// been applied and notified.
    pub fn flush(&mut self, lifecycle: &dyn RecordLifecycle) -> Result<(), GraphError> {
        if self.destroyed {
            self.pending_flush = false;
            return Ok(());
        }
        // Held for the whole drain so that work queued by the drain itself
        // joins this flush instead of requesting another.
        self.pending_flush = true;
        let PushQueues {
            has_many,
            belongs_to,
        } = std::mem::take(&mut self.queued);
        trace!(
            has_many = has_many.len(),
            belongs_to = belongs_to.len(),
            "draining queued relationship payloads"
        );
        let mut failed = Vec::new();
        for queued in has_many.into_iter().chain(belongs_to) {
            if let Err(err) = self.apply_push(queued) {
                warn!(%err, "queued relationship payload failed to apply");
                failed.push(err);
            }
        }
        while !self.pending_sync.is_empty() {
            let batch = std::mem::take(&mut self.pending_sync);
            trace!(relationships = batch.len(), "syncing canonical state");
            for (identifier, key) in batch {
                self.sync_relationship(&identifier, &key, lifecycle);
            }
        }
        self.pending_flush = false;
        self.dispatch_notifications();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(GraphError::Flush(failed))
        }
    }

    /// Records that `concrete_type` satisfies `abstract_type` (and the
    /// reverse). Idempotent.
    pub fn register_polymorphic_type(&mut self, abstract_type: &str, concrete_type: &str) {
        let fresh = self
            .polymorphic
            .entry(abstract_type.to_owned())
            .or_default()
            .insert(concrete_type.to_owned());
        self.polymorphic
            .entry(concrete_type.to_owned())
            .or_default()
            .insert(abstract_type.to_owned());
        if fresh {
            debug!(abstract_type, concrete_type, "registered polymorphic pairing");
        }
    }

    /// Returns `true` if the pairing was registered (in either direction).
    pub fn is_registered_polymorphic(&self, abstract_type: &str, concrete_type: &str) -> bool {
        self.polymorphic
            .get(abstract_type)
            .is_some_and(|types| types.contains(concrete_type))
    }

    /// Flags a failed load through the request layer.
    pub fn mark_load_failed(
        &mut self,
        identifier: &RecordIdentifier,
        field: &str,
    ) -> Result<(), GraphError> {
        self.update_flags(identifier, field, |flags| flags.has_failed_load_attempt = true)
    }

    /// Asks the request layer to reload on next access.
    pub fn request_reload(
        &mut self,
        identifier: &RecordIdentifier,
        field: &str,
    ) -> Result<(), GraphError> {
        self.update_flags(identifier, field, |flags| flags.should_force_reload = true)
    }

    fn update_flags(
        &mut self,
        identifier: &RecordIdentifier,
        field: &str,
        update: impl FnOnce(&mut crate::relationship::RelationshipFlags),
    ) -> Result<(), GraphError> {
        self.ensure_live()?;
        let key = FieldKey::Named(field.to_owned());
        let rel = self.ensure(identifier, &key)?;
        let before = *rel.flags();
        update(rel.flags_mut());
        if *rel.flags() != before {
            self.mark_changed(identifier, &key);
            self.dispatch_notifications();
        }
        Ok(())
    }

    /// Drops every relationship and queued payload. Safe on a graph that
    /// never instantiated anything; later mutations return
    /// [`GraphError::Destroyed`].
    pub fn destroy(&mut self) {
        for rel in self
            .identifiers
            .values_mut()
            .flat_map(FxHashMap::values_mut)
            .chain(self.implicit.values_mut().flat_map(FxHashMap::values_mut))
        {
            rel.destroy();
        }
        self.identifiers.clear();
        self.implicit.clear();
        self.queued = PushQueues::default();
        self.pending_sync.clear();
        self.changed.clear();
        self.polymorphic.clear();
        self.pending_flush = false;
        self.destroyed = true;
    }

    /// Returns `true` after [`Graph::destroy`].
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn ensure_live(&self) -> Result<(), GraphError> {
        if self.destroyed {
            Err(GraphError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn schedule(&mut self) {
        if !self.pending_flush {
            self.pending_flush = true;
            self.scheduler.schedule_flush();
        }
    }

    fn relationship_mut(
        &mut self,
        identifier: &RecordIdentifier,
        key: &FieldKey,
    ) -> Option<&mut Relationship> {
        match key {
            FieldKey::Named(field) => self.identifiers.get_mut(identifier)?.get_mut(field),
            FieldKey::Implicit(key) => self.implicit.get_mut(identifier)?.get_mut(key),
        }
    }

    /// Instantiates `identifier.key` on first access.
    fn ensure(
        &mut self,
        identifier: &RecordIdentifier,
        key: &FieldKey,
    ) -> Result<&mut Relationship, GraphError> {
        if self.peek(identifier, key).is_none() {
            let definition = self.edges.definition_for(identifier.resource_type(), key)?;
            let rel = Relationship::new(identifier.clone(), definition);
            match key {
                FieldKey::Named(field) => {
                    self.identifiers
                        .entry(identifier.clone())
                        .or_default()
                        .insert(field.clone(), rel);
                }
                FieldKey::Implicit(implicit) => {
                    self.implicit
                        .entry(identifier.clone())
                        .or_default()
                        .insert(implicit.clone(), rel);
                }
            }
        }
        self.relationship_mut(identifier, key)
            .ok_or_else(|| GraphError::Edge(EdgeError::UnknownField {
                resource_type: identifier.resource_type().to_owned(),
                field: key.to_string(),
            }))
    }

    fn resolve_linkage(
        &mut self,
        cache: &mut IdentifierCache,
        definition: &EdgeDefinition,
        data: &RelationshipData,
    ) -> Result<Vec<RecordIdentifier>, GraphError> {
        let pointers = linkage_pointers(definition, data)?;
        // Checked up front so a bad pointer late in the list leaves the
        // identifier cache untouched.
        for pointer in &pointers {
            check_pointer_key(definition, pointer)?;
        }
        let mut members = MemberSet::default();
        for pointer in pointers {
            let member = cache.get_or_create_record_identifier(pointer)?;
            self.check_member_type(definition, &member)?;
            members.insert(member);
        }
        Ok(members.into_iter().collect())
    }

    /// Accepts `member` for `definition`, registering polymorphic pairings.
    fn check_member_type(
        &mut self,
        definition: &EdgeDefinition,
        member: &RecordIdentifier,
    ) -> Result<(), GraphError> {
        if self.admit_member_type(definition, member.resource_type())? {
            self.register_polymorphic_type(&definition.related_type, member.resource_type());
        }
        Ok(())
    }

    /// Decides whether a member of type `found` may join `definition`.
    /// `Ok(true)` means the pairing is new and must be registered.
    ///
    /// A member of another type is accepted when the field is polymorphic or
    /// type assertions are off, and in both cases only if the member's type
    /// declares the inverse field. The inverse definition is resolved here so
    /// that applying the edge later cannot fail on it.
    fn admit_member_type(
        &mut self,
        definition: &EdgeDefinition,
        found: &str,
    ) -> Result<bool, GraphError> {
        if found == definition.related_type
            || self.is_registered_polymorphic(&definition.related_type, found)
        {
            self.edges.definition_for(found, &definition.inverse_key())?;
            return Ok(false);
        }
        let declares_inverse = definition
            .inverse_field()
            .is_none_or(|inverse| self.edges.schema().relationship(found, inverse).is_some());
        let allowed = definition.is_polymorphic || !self.config.assert_polymorphic_types;
        if declares_inverse && allowed {
            self.edges.definition_for(found, &definition.inverse_key())?;
            return Ok(true);
        }
        Err(GraphError::TypeMismatch {
            resource_type: definition.owner_type.clone(),
            field: definition.key.clone(),
            expected: definition.related_type.clone(),
            found: found.to_owned(),
        })
    }

    fn apply_push(&mut self, queued: QueuedPush) -> Result<(), GraphError> {
        let QueuedPush {
            identifier,
            field,
            data,
            links,
            meta,
        } = queued;
        let key = FieldKey::Named(field);
        let (is_async, has_received) = {
            let rel = self.ensure(&identifier, &key)?;
            (rel.definition().is_async, rel.flags().has_received_data)
        };
        let diagnostics = self.config.payload_diagnostics;
        let has_data = data.is_some();
        let mut changed = false;

        if let (Some(meta), Some(rel)) = (meta, self.relationship_mut(&identifier, &key)) {
            changed |= rel.update_meta(meta);
        }

        // A sync relationship without data or link is defined to be empty.
        let members = data.or_else(|| (!is_async && !has_received).then(Vec::new));
        if let Some(members) = members {
            if let Some(rel) = self.relationship_mut(&identifier, &key) {
                let flags = rel.flags_mut();
                let before = *flags;
                flags.has_received_data = true;
                flags.is_stale = false;
                flags.has_dematerialized_inverse = false;
                flags.is_empty = members.is_empty();
                flags.has_failed_load_attempt = false;
                flags.should_force_reload = false;
                changed |= *flags != before;
            }
            if let Err(err) = self.replace_remote_members(&identifier, &key, &members) {
                // Flags and meta already moved; still notify before failing.
                self.mark_changed(&identifier, &key);
                return Err(err);
            }
        }

        if let Some(links) = links {
            let has_related = links.related.is_some();
            if let Some(rel) = self.relationship_mut(&identifier, &key) {
                let update = rel.update_links(links);
                changed |= update.changed;
                if !has_data && (update.related_changed || (!is_async && has_related)) {
                    let flags = rel.flags_mut();
                    changed |= !flags.is_stale;
                    flags.is_stale = true;
                }
            }
            if !has_data && !is_async && has_related && diagnostics {
                warn!(
                    resource_type = identifier.resource_type(),
                    lid = identifier.lid(),
                    field = %key,
                    "sync relationship received a related link without data; treating it as empty and stale"
                );
            }
        }

        if changed {
            self.mark_changed(&identifier, &key);
        }
        Ok(())
    }

    /// Marks `identifier.key` for reconciliation on the next flush. Only the
    /// first call per flush enqueues.
    fn flush_canonical_later(&mut self, identifier: &RecordIdentifier, key: &FieldKey) {
        let Some(rel) = self.relationship_mut(identifier, key) else {
            return;
        };
        if rel.flags().will_sync {
            return;
        }
        rel.flags_mut().will_sync = true;
        self.pending_sync.push((identifier.clone(), key.clone()));
        self.schedule();
    }

    fn sync_relationship(
        &mut self,
        identifier: &RecordIdentifier,
        key: &FieldKey,
        lifecycle: &dyn RecordLifecycle,
    ) {
        let Some(rel) = self.relationship_mut(identifier, key) else {
            return;
        };
        if !rel.flags().will_sync {
            return;
        }
        let before = rel.local_members();
        if !rel.flush_canonical(lifecycle) {
            return;
        }
        let after = rel.local_members();
        let inverse_key = rel.definition().inverse_key();
        self.mirror_local(identifier, &inverse_key, &before, &after);
        self.mark_changed(identifier, key);
    }

    fn mark_changed(&mut self, identifier: &RecordIdentifier, key: &FieldKey) {
        if let FieldKey::Named(field) = key {
            self.changed.insert((identifier.clone(), field.clone()));
        }
    }

    fn dispatch_notifications(&mut self) {
        for (identifier, field) in std::mem::take(&mut self.changed) {
            self.notifier
                .notify(&identifier, NotificationBucket::Relationships, Some(&field));
        }
    }
}

/// Pointers in `data`, checked against the field's cardinality.
fn linkage_pointers<'a>(
    definition: &EdgeDefinition,
    data: &'a RelationshipData,
) -> Result<Vec<&'a ResourcePointer>, GraphError> {
    match (definition.kind, data) {
        (_, RelationshipData::Null) => Ok(Vec::new()),
        (EdgeKind::BelongsTo, RelationshipData::ToOne(pointer)) => Ok(vec![pointer]),
        (EdgeKind::HasMany, RelationshipData::ToMany(pointers)) => Ok(pointers.iter().collect()),
        (kind, _) => Err(GraphError::PayloadShape {
            resource_type: definition.owner_type.clone(),
            field: definition.key.clone(),
            expected: if kind == EdgeKind::BelongsTo {
                "a single resource linkage or null"
            } else {
                "an array of resource linkages"
            },
        }),
    }
}

/// A linkage needs a lid or a `type` + `id` pair.
fn check_pointer_key(definition: &EdgeDefinition, pointer: &ResourcePointer) -> Result<(), GraphError> {
    let has_type = pointer
        .resource_type
        .as_deref()
        .is_some_and(|ty| !ty.is_empty());
    if pointer.lid.is_none() && !(has_type && pointer.id.is_some()) {
        return Err(GraphError::MissingResourceKey {
            resource_type: definition.owner_type.clone(),
            field: definition.key.clone(),
        });
    }
    Ok(())
}
