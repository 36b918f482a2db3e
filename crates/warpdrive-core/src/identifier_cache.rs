// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Identifier cache: resolves payloads to stable identifiers.
//!
//! # Indices
//!
//! - `lids`: `lid -> identifier`, the primary index. Every live identifier has
//!   exactly one entry.
//! - `resources`: `type:id -> identifier` for identifiers with a known id.
//! - `aliases`: lids abandoned by a merge, pointing at the survivor. Kept
//!   apart from `lids` so the primary index never holds two entries for one
//!   entity.
//! - `documents`: request cache key -> document identifier, a separate
//!   namespace from records.
//!
//! `lids` and `resources` always agree about which instance is authoritative
//! for a given `type:id`.
use std::fmt;

use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::IdentifierConfig;
use crate::ident::{DocumentIdentifier, IdentifierBucket, RecordIdentifier, ResourceKey};
use crate::resource::{RequestInfo, Resource, ResourcePointer, ResourceView};

/// Errors raised by identifier resolution and lifecycle operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The resource had no (or an empty) `type`.
    #[error("resource is missing a type")]
    MissingType,
    /// A custom generation method produced no lid for a record.
    #[error("generation method produced no lid for a `{resource_type}` record")]
    NoLidGenerated {
        /// Type of the offending resource.
        resource_type: String,
    },
    /// The resource carried a lid but generation returned a different one.
    #[error("resource lid `{provided}` was not echoed by the generation method (got `{generated}`)")]
    LidMismatch {
        /// Lid on the resource.
        provided: String,
        /// Lid produced by generation.
        generated: String,
    },
    /// Attempted to change an id that is already set.
    #[error("identifier `{lid}` already has id `{current}`; cannot change it to `{attempted}`")]
    IdChange {
        /// Identifier lid.
        lid: String,
        /// Current id.
        current: String,
        /// Rejected id.
        attempted: String,
    },
    /// Resource type differs from the identifier's type.
    #[error("identifier `{lid}` has type `{expected}`, resource has type `{found}`")]
    TypeMismatch {
        /// Identifier lid.
        lid: String,
        /// Identifier type.
        expected: String,
        /// Resource type.
        found: String,
    },
    /// A new record was requested for an id that is already known.
    #[error("an identifier for `{key}` already exists")]
    DuplicateId {
        /// The conflicting `type:id`.
        key: String,
    },
    /// A new record was requested but its lid is already live.
    #[error("lid `{lid}` is already in use")]
    LidInUse {
        /// The conflicting lid.
        lid: String,
    },
    /// Two identifiers with different ids cannot be merged.
    #[error("cannot merge `{left}` and `{right}`: ids `{left_id}` and `{right_id}` differ")]
    MergeConflict {
        /// First lid.
        left: String,
        /// First id.
        left_id: String,
        /// Second lid.
        right: String,
        /// Second id.
        right_id: String,
    },
    /// The identifier is not (or no longer) registered in this cache.
    #[error("identifier `{lid}` is not registered with this cache")]
    Unknown {
        /// Identifier lid.
        lid: String,
    },
    /// Error raised by a host-provided generation method.
    #[error("generation method failed: {0}")]
    Generation(String),
}

/// What a generation method is asked to key.
#[derive(Clone, Copy, Debug)]
pub enum GenerationInput<'a> {
    /// A record resource or pointer.
    Record(ResourceView<'a>),
    /// A request.
    Document(&'a RequestInfo),
}

/// Produces a lid (records) or cache key (documents). `Ok(None)` for a
/// document means "not cacheable"; for a record it is an error.
pub type GenerationMethod =
    Box<dyn Fn(GenerationInput<'_>) -> Result<Option<String>, IdentifierError>>;
/// Observes new data for a known identifier.
pub type UpdateMethod = Box<dyn Fn(&RecordIdentifier, ResourceView<'_>, IdentifierBucket)>;
/// Observes an identifier being forgotten.
pub type ForgetMethod = Box<dyn Fn(&RecordIdentifier, IdentifierBucket)>;
/// Observes a cache reset.
pub type ResetMethod = Box<dyn Fn()>;

/// Host-provided lifecycle overrides. Every hook is optional; absent hooks
/// fall back to built-in behavior.
#[derive(Default)]
pub struct IdentifierHooks {
    /// Lid/cache-key generation.
    pub generation: Option<GenerationMethod>,
    /// Update notification.
    pub update: Option<UpdateMethod>,
    /// Forget notification.
    pub forget: Option<ForgetMethod>,
    /// Reset notification.
    pub reset: Option<ResetMethod>,
}

impl IdentifierHooks {
    /// Sets the generation method.
    pub fn with_generation(
        mut self,
        f: impl Fn(GenerationInput<'_>) -> Result<Option<String>, IdentifierError> + 'static,
    ) -> Self {
        self.generation = Some(Box::new(f));
        self
    }

    /// Sets the update method.
    pub fn with_update(
        mut self,
        f: impl Fn(&RecordIdentifier, ResourceView<'_>, IdentifierBucket) + 'static,
    ) -> Self {
        self.update = Some(Box::new(f));
        self
    }

    /// Sets the forget method.
    pub fn with_forget(mut self, f: impl Fn(&RecordIdentifier, IdentifierBucket) + 'static) -> Self {
        self.forget = Some(Box::new(f));
        self
    }

    /// Sets the reset method.
    pub fn with_reset(mut self, f: impl Fn() + 'static) -> Self {
        self.reset = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for IdentifierHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierHooks")
            .field("generation", &self.generation.is_some())
            .field("update", &self.update.is_some())
            .field("forget", &self.forget.is_some())
            .field("reset", &self.reset.is_some())
            .finish()
    }
}

/// Anything that can be resolved to a record identifier.
#[derive(Clone, Copy, Debug)]
pub enum ResourceRef<'a> {
    /// Already an identifier; resolves to itself.
    Identifier(&'a RecordIdentifier),
    /// A key view.
    View(ResourceView<'a>),
}

impl<'a> From<&'a RecordIdentifier> for ResourceRef<'a> {
    fn from(value: &'a RecordIdentifier) -> Self {
        Self::Identifier(value)
    }
}

impl<'a> From<&'a Resource> for ResourceRef<'a> {
    fn from(value: &'a Resource) -> Self {
        Self::View(value.view())
    }
}

impl<'a> From<&'a ResourcePointer> for ResourceRef<'a> {
    fn from(value: &'a ResourcePointer) -> Self {
        Self::View(value.view())
    }
}

impl<'a> From<ResourceView<'a>> for ResourceRef<'a> {
    fn from(value: ResourceView<'a>) -> Self {
        Self::View(value)
    }
}

/// Maps payloads and secondary keys to identifiers.
pub struct IdentifierCache {
    config: IdentifierConfig,
    hooks: IdentifierHooks,
    lids: FxHashMap<String, RecordIdentifier>,
    resources: FxHashMap<ResourceKey, RecordIdentifier>,
    aliases: FxHashMap<String, RecordIdentifier>,
    /// Survivor lid -> alias lids pointing at it.
    alias_owners: FxHashMap<String, Vec<String>>,
    documents: FxHashMap<String, DocumentIdentifier>,
}

impl fmt::Debug for IdentifierCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierCache")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("records", &self.lids.len())
            .field("aliases", &self.aliases.len())
            .field("documents", &self.documents.len())
            .finish()
    }
}

impl Default for IdentifierCache {
    fn default() -> Self {
        Self::new(IdentifierConfig::default(), IdentifierHooks::default())
    }
}

impl IdentifierCache {
    /// Creates an empty cache.
    pub fn new(config: IdentifierConfig, hooks: IdentifierHooks) -> Self {
        Self {
            config,
            hooks,
            lids: FxHashMap::default(),
            resources: FxHashMap::default(),
            aliases: FxHashMap::default(),
            alias_owners: FxHashMap::default(),
            documents: FxHashMap::default(),
        }
    }

    /// Replaces (or clears, with `None`) the generation method.
    pub fn set_generation_method(&mut self, method: Option<GenerationMethod>) {
        self.hooks.generation = method;
    }

    /// Replaces (or clears) the update method.
    pub fn set_update_method(&mut self, method: Option<UpdateMethod>) {
        self.hooks.update = method;
    }

    /// Replaces (or clears) the forget method.
    pub fn set_forget_method(&mut self, method: Option<ForgetMethod>) {
        self.hooks.forget = method;
    }

    /// Replaces (or clears) the reset method.
    pub fn set_reset_method(&mut self, method: Option<ResetMethod>) {
        self.hooks.reset = method;
    }

    /// Number of live record identifiers.
    pub fn len(&self) -> usize {
        self.lids.len()
    }

    /// Returns `true` if no record identifiers are live.
    pub fn is_empty(&self) -> bool {
        self.lids.is_empty()
    }

    /// Returns `true` if `identifier` is the live instance for its lid.
    pub fn contains(&self, identifier: &RecordIdentifier) -> bool {
        self.lids
            .get(identifier.lid())
            .is_some_and(|live| live.ptr_eq(identifier))
    }

    /// Live identifier for `lid`, following merge aliases.
    pub fn peek_lid(&self, lid: &str) -> Option<RecordIdentifier> {
        self.lids
            .get(lid)
            .or_else(|| self.aliases.get(lid))
            .cloned()
    }

    /// Looks up without generating or creating.
    pub fn peek_record_identifier<'a>(
        &self,
        resource: impl Into<ResourceRef<'a>>,
    ) -> Option<RecordIdentifier> {
        match resource.into() {
            ResourceRef::Identifier(identifier) => Some(identifier.clone()),
            ResourceRef::View(view) => self.lookup(view),
        }
    }

    fn lookup(&self, view: ResourceView<'_>) -> Option<RecordIdentifier> {
        if let Some(found) = view.lid.and_then(|lid| self.peek_lid(lid)) {
            return Some(found);
        }
        match view.id {
            Some(id) if !view.resource_type.is_empty() => self
                .resources
                .get(&ResourceKey::new(view.resource_type, id))
                .cloned(),
            _ => None,
        }
    }

    /// Resolves `resource` to its identifier, creating one if needed.
    ///
    /// An identifier input is returned unchanged. Otherwise the lookup order
    /// is lid, `type:id`, then generation; a generated lid that is already
    /// live resolves to that identifier, which is how custom generation
    /// methods connect secondary keys to a known entity.
    pub fn get_or_create_record_identifier<'a>(
        &mut self,
        resource: impl Into<ResourceRef<'a>>,
    ) -> Result<RecordIdentifier, IdentifierError> {
        let view = match resource.into() {
            ResourceRef::Identifier(identifier) => return Ok(identifier.clone()),
            ResourceRef::View(view) => view,
        };
        if let Some(found) = self.lookup(view) {
            return Ok(found);
        }
        let generated = self.generate_record_lid(view)?;
        match view.lid {
            Some(provided) if provided != generated => {
                return Err(IdentifierError::LidMismatch {
                    provided: provided.to_owned(),
                    generated,
                });
            }
            Some(_) => {}
            None => {
                if let Some(found) = self.peek_lid(&generated) {
                    return Ok(found);
                }
            }
        }
        if view.resource_type.is_empty() {
            return Err(IdentifierError::MissingType);
        }
        Ok(self.insert(view.resource_type, view.id, generated))
    }

    /// Always creates a fresh identifier for a client-created record.
    pub fn create_identifier_for_new_record(
        &mut self,
        resource_type: &str,
        id: Option<&str>,
    ) -> Result<RecordIdentifier, IdentifierError> {
        if resource_type.is_empty() {
            return Err(IdentifierError::MissingType);
        }
        if let Some(id) = id {
            let key = ResourceKey::new(resource_type, id);
            if self.resources.contains_key(&key) {
                return Err(IdentifierError::DuplicateId {
                    key: key.to_string(),
                });
            }
        }
        let lid = self.generate_record_lid(ResourceView::new(resource_type, id))?;
        if self.lids.contains_key(&lid) || self.aliases.contains_key(&lid) {
            return Err(IdentifierError::LidInUse { lid });
        }
        Ok(self.insert(resource_type, id, lid))
    }

    fn insert(&mut self, resource_type: &str, id: Option<&str>, lid: String) -> RecordIdentifier {
        let identifier = RecordIdentifier::new(resource_type, id, lid.clone());
        if let Some(key) = identifier.resource_key() {
            self.resources.insert(key, identifier.clone());
        }
        self.lids.insert(lid, identifier.clone());
        identifier
    }

    /// Applies new data for a known identifier and returns the surviving
    /// identifier.
    ///
    /// The survivor differs from `identifier` when the data revealed that
    /// another live identifier denotes the same entity (a matching lid, or a
    /// `type:id` already owned elsewhere); the two are merged first. The
    /// update method then runs with the survivor, and finally a newly learned
    /// id is assigned and indexed. Lids never change.
    pub fn update_record_identifier(
        &mut self,
        identifier: &RecordIdentifier,
        resource: ResourceView<'_>,
    ) -> Result<RecordIdentifier, IdentifierError> {
        self.check_update(identifier, resource)?;

        let mut survivor = identifier.clone();
        if let Some(other) = resource.lid.and_then(|lid| self.peek_lid(lid)) {
            if !other.ptr_eq(&survivor) {
                survivor = self.merge_identifiers(&survivor, &other)?;
            }
        }
        let mut new_id = None;
        if let Some(id) = resource.id {
            match survivor.id() {
                Some(current) if current != id => {
                    return Err(IdentifierError::IdChange {
                        lid: survivor.lid().to_owned(),
                        current: current.to_owned(),
                        attempted: id.to_owned(),
                    });
                }
                Some(_) => {}
                None => {
                    let key = ResourceKey::new(survivor.resource_type(), id);
                    match self.resources.get(&key).cloned() {
                        Some(existing) if !existing.ptr_eq(&survivor) => {
                            survivor = self.merge_identifiers(&survivor, &existing)?;
                        }
                        _ => new_id = Some((key, id)),
                    }
                }
            }
        }

        if let Some(update) = &self.hooks.update {
            update(&survivor, resource, IdentifierBucket::Record);
        }
        if let Some((key, id)) = new_id {
            if survivor.assign_id(id) {
                self.resources.insert(key, survivor.clone());
            }
        }
        Ok(survivor)
    }

    /// Raises the type and id errors [`IdentifierCache::update_record_identifier`]
    /// would raise for `resource`, without changing anything. Both
    /// `identifier` and the live owner of the resource's lid are checked.
    pub fn check_update(
        &self,
        identifier: &RecordIdentifier,
        resource: ResourceView<'_>,
    ) -> Result<(), IdentifierError> {
        if !self.contains(identifier) {
            return Err(IdentifierError::Unknown {
                lid: identifier.lid().to_owned(),
            });
        }
        let lid_owner = resource.lid.and_then(|lid| self.peek_lid(lid));
        for known in std::iter::once(identifier).chain(lid_owner.as_ref()) {
            if !resource.resource_type.is_empty() && resource.resource_type != known.resource_type() {
                return Err(IdentifierError::TypeMismatch {
                    lid: known.lid().to_owned(),
                    expected: known.resource_type().to_owned(),
                    found: resource.resource_type.to_owned(),
                });
            }
            if let (Some(current), Some(attempted)) = (known.id(), resource.id) {
                if current != attempted {
                    return Err(IdentifierError::IdChange {
                        lid: known.lid().to_owned(),
                        current: current.to_owned(),
                        attempted: attempted.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Merges two identifiers that denote one entity and returns the survivor.
    ///
    /// The identifier with an id wins over one without. When neither or both
    /// (equal) ids are set, the current owner of the `type:id` entry wins,
    /// else `b`. The loser is forgotten (the forget method fires once for it)
    /// and its lid becomes an alias of the survivor.
    pub fn merge_identifiers(
        &mut self,
        a: &RecordIdentifier,
        b: &RecordIdentifier,
    ) -> Result<RecordIdentifier, IdentifierError> {
        if a.ptr_eq(b) {
            return Ok(a.clone());
        }
        if a.resource_type() != b.resource_type() {
            return Err(IdentifierError::TypeMismatch {
                lid: b.lid().to_owned(),
                expected: b.resource_type().to_owned(),
                found: a.resource_type().to_owned(),
            });
        }
        let (survivor, loser) = match (a.id(), b.id()) {
            (Some(left), Some(right)) if left != right => {
                return Err(IdentifierError::MergeConflict {
                    left: a.lid().to_owned(),
                    left_id: left.to_owned(),
                    right: b.lid().to_owned(),
                    right_id: right.to_owned(),
                });
            }
            (Some(_), None) => (a, b),
            (None, Some(_)) => (b, a),
            _ => {
                let a_owns = a
                    .resource_key()
                    .and_then(|key| self.resources.get(&key))
                    .is_some_and(|owner| owner.ptr_eq(a));
                if a_owns {
                    (a, b)
                } else {
                    (b, a)
                }
            }
        };
        if !self.contains(loser) {
            return Ok(survivor.clone());
        }
        debug!(survivor = survivor.lid(), loser = loser.lid(), "merging identifiers");

        let inherited = self.evict(loser);
        self.fire_forget(loser);
        let mut aliases = vec![loser.lid().to_owned()];
        aliases.extend(inherited);
        for alias in aliases {
            self.aliases.insert(alias.clone(), survivor.clone());
            self.alias_owners
                .entry(survivor.lid().to_owned())
                .or_default()
                .push(alias);
        }
        if let Some(key) = survivor.resource_key() {
            self.resources.insert(key, survivor.clone());
        }
        Ok(survivor.clone())
    }

    /// Removes every index entry for `identifier` and fires the forget
    /// method. Returns `false` (and fires nothing) if it was not live.
    pub fn forget_record_identifier(&mut self, identifier: &RecordIdentifier) -> bool {
        if !self.contains(identifier) {
            return false;
        }
        let dropped = self.evict(identifier);
        debug!(lid = identifier.lid(), aliases = dropped.len(), "forgetting identifier");
        self.fire_forget(identifier);
        true
    }

    /// Drops primary and resource entries for `identifier` and unlinks its
    /// aliases, which are returned.
    fn evict(&mut self, identifier: &RecordIdentifier) -> Vec<String> {
        if self
            .lids
            .get(identifier.lid())
            .is_some_and(|live| live.ptr_eq(identifier))
        {
            self.lids.remove(identifier.lid());
        }
        if let Some(key) = identifier.resource_key() {
            if self
                .resources
                .get(&key)
                .is_some_and(|owner| owner.ptr_eq(identifier))
            {
                self.resources.remove(&key);
            }
        }
        let aliases = self
            .alias_owners
            .remove(identifier.lid())
            .unwrap_or_default();
        for alias in &aliases {
            self.aliases.remove(alias);
        }
        aliases
    }

    fn fire_forget(&self, identifier: &RecordIdentifier) {
        if let Some(forget) = &self.hooks.forget {
            forget(identifier, IdentifierBucket::Record);
        }
    }

    /// Resolves a request to its document identifier. Returns `Ok(None)` when
    /// the request is not cacheable (no cache key, and not a `GET` with a
    /// URL under the built-in method).
    pub fn get_or_create_document_identifier(
        &mut self,
        request: &RequestInfo,
    ) -> Result<Option<DocumentIdentifier>, IdentifierError> {
        let key = match &request.cache_key {
            Some(key) => Some(key.clone()),
            None => match &self.hooks.generation {
                Some(generate) => generate(GenerationInput::Document(request))?,
                None => default_document_key(request),
            },
        };
        let Some(key) = key else {
            return Ok(None);
        };
        let identifier = self
            .documents
            .entry(key)
            .or_insert_with_key(|key| DocumentIdentifier::new(key));
        Ok(Some(identifier.clone()))
    }

    /// Fires the reset method and clears every index.
    pub fn reset(&mut self) {
        if let Some(reset) = &self.hooks.reset {
            reset();
        }
        debug!(
            records = self.lids.len(),
            documents = self.documents.len(),
            "resetting identifier cache"
        );
        self.lids.clear();
        self.resources.clear();
        self.aliases.clear();
        self.alias_owners.clear();
        self.documents.clear();
    }

    fn generate_record_lid(&self, view: ResourceView<'_>) -> Result<String, IdentifierError> {
        match &self.hooks.generation {
            Some(generate) => generate(GenerationInput::Record(view))?.ok_or_else(|| {
                IdentifierError::NoLidGenerated {
                    resource_type: view.resource_type.to_owned(),
                }
            }),
            None => default_record_lid(&self.config.lid_prefix, view),
        }
    }
}

/// Built-in record generation: the provided lid, else a deterministic
/// `{prefix}:{type}-{id}`, else `{prefix}:{type}-{uuid}`.
fn default_record_lid(prefix: &str, view: ResourceView<'_>) -> Result<String, IdentifierError> {
    if let Some(lid) = view.lid {
        return Ok(lid.to_owned());
    }
    if view.resource_type.is_empty() {
        return Err(IdentifierError::MissingType);
    }
    Ok(match view.id {
        Some(id) => format!("{prefix}:{}-{id}", view.resource_type),
        None => format!("{prefix}:{}-{}", view.resource_type, Uuid::new_v4()),
    })
}

fn default_document_key(request: &RequestInfo) -> Option<String> {
    let is_get = request
        .method
        .as_deref()
        .is_none_or(|method| method.eq_ignore_ascii_case("GET"));
    if is_get {
        request.url.clone()
    } else {
        None
    }
}
