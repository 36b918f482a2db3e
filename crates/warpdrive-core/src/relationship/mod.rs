// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-(identifier, field) relationship state.
//!
//! Every instance tracks a canonical `remote` view and a `local` view that
//! includes uncommitted edits. The three variants share [`RelationshipState`]
//! and are dispatched through the [`Relationship`] enum. Instances only
//! mutate themselves; keeping inverse edges symmetric is the graph's job.
use std::rc::Rc;

use indexmap::IndexSet;
use rustc_hash::FxBuildHasher;
use serde_json::Value;

use crate::edge::{EdgeDefinition, EdgeKind};
use crate::ident::RecordIdentifier;
use crate::resource::Links;

mod belongs_to;
mod collection;
mod implicit;

pub use belongs_to::BelongsToRelationship;
pub use collection::CollectionRelationship;
pub use implicit::ImplicitRelationship;

/// Ordered, deduplicated member list.
pub type MemberSet = IndexSet<RecordIdentifier, FxBuildHasher>;

/// Tells the graph which identifiers are unpersisted (and in flight).
pub trait RecordLifecycle {
    /// Client-created and never persisted.
    fn is_new(&self, identifier: &RecordIdentifier) -> bool;

    /// A save is in flight.
    fn is_in_flight(&self, _identifier: &RecordIdentifier) -> bool {
        false
    }
}

/// Every member of the set counts as new; nothing is in flight.
impl<S: std::hash::BuildHasher> RecordLifecycle for std::collections::HashSet<RecordIdentifier, S> {
    fn is_new(&self, identifier: &RecordIdentifier) -> bool {
        self.contains(identifier)
    }
}

/// State flags shared by all variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelationshipFlags {
    /// Canonical data has been received at least once.
    pub has_received_data: bool,
    /// Last canonical data was `null` or `[]`.
    pub is_empty: bool,
    /// Known to be out of date and in need of a fetch.
    pub is_stale: bool,
    /// A persisted async member was unloaded but kept.
    pub has_dematerialized_inverse: bool,
    /// The request layer asked for a reload.
    pub should_force_reload: bool,
    /// The last load through the request layer failed.
    pub has_failed_load_attempt: bool,
    /// A canonical flush is pending.
    pub will_sync: bool,
}

/// Outcome of adding a member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Membership {
    /// Already present.
    Unchanged,
    /// Newly added.
    Added,
    /// Added, displacing the previous to-one value.
    Replaced(RecordIdentifier),
}

impl Membership {
    /// Returns `true` unless nothing changed.
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Members of a relationship as exposed to readers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationshipMembers {
    /// To-one value.
    One(Option<RecordIdentifier>),
    /// To-many list in local order.
    Many(Vec<RecordIdentifier>),
}

/// Read-side snapshot returned by `get_data`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelationshipSnapshot {
    /// `None` until data was received or set locally.
    pub data: Option<RelationshipMembers>,
    /// Last received links.
    pub links: Option<Links>,
    /// Last received meta.
    pub meta: Option<Value>,
}

/// Shared behavior of relationship variants.
pub trait RelationshipState {
    /// Owning identifier.
    fn identifier(&self) -> &RecordIdentifier;
    /// Resolved edge definition.
    fn definition(&self) -> &Rc<EdgeDefinition>;
    /// State flags.
    fn flags(&self) -> &RelationshipFlags;
    /// Mutable state flags.
    fn flags_mut(&mut self) -> &mut RelationshipFlags;

    /// Canonical members in order.
    fn remote_members(&self) -> Vec<RecordIdentifier>;
    /// Local members in order.
    fn local_members(&self) -> Vec<RecordIdentifier>;
    /// Canonical membership test.
    fn has_remote(&self, member: &RecordIdentifier) -> bool;
    /// Local membership test.
    fn has_local(&self, member: &RecordIdentifier) -> bool;

    /// Adds one canonical member.
    fn add_remote(&mut self, member: &RecordIdentifier) -> Membership;
    /// Removes one canonical member.
    fn remove_remote(&mut self, member: &RecordIdentifier) -> bool;
    /// Replaces canonical state wholesale, deduplicating and keeping the
    /// given order. Returns `true` if anything, including order, changed.
    fn replace_remote(&mut self, members: &[RecordIdentifier]) -> bool;

    /// Adds one local member at `index` (appends when `None`).
    fn add_local(&mut self, member: &RecordIdentifier, index: Option<usize>) -> Membership;
    /// Removes one local member.
    fn remove_local(&mut self, member: &RecordIdentifier) -> bool;
    /// Replaces local state wholesale.
    fn replace_local(&mut self, members: &[RecordIdentifier]) -> bool;

    /// Reconciles local state to canonical state, preserving local-only
    /// members when either end of the edge is unpersisted. Clears
    /// `will_sync`. Returns `true` if local state changed.
    fn flush_canonical(&mut self, lifecycle: &dyn RecordLifecycle) -> bool;

    /// Swaps `from` for `to` in both views, keeping position. Returns `true`
    /// if `from` was present.
    fn replace_member(&mut self, from: &RecordIdentifier, to: &RecordIdentifier) -> bool;
    /// Re-keys the instance to a new owner after an identifier merge.
    fn rebind(&mut self, identifier: RecordIdentifier);

    /// Stores meta. Returns `true` if it changed.
    fn update_meta(&mut self, meta: Value) -> bool;
    /// Stores links. Returns whether anything and whether the `related`
    /// href changed.
    fn update_links(&mut self, links: Links) -> LinksUpdate;

    /// Reader snapshot.
    fn get_data(&self) -> RelationshipSnapshot;
    /// Empties both views.
    fn clear(&mut self);
    /// Empties everything, including links, meta and flags.
    fn destroy(&mut self);
}

/// Result of [`RelationshipState::update_links`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinksUpdate {
    /// The links object differs from the previous one.
    pub changed: bool,
    /// The `related` href is present and differs from the previous one.
    pub related_changed: bool,
}

/// One relationship instance of any variant.
#[derive(Clone, Debug)]
pub enum Relationship {
    /// To-one.
    BelongsTo(BelongsToRelationship),
    /// To-many.
    Collection(CollectionRelationship),
    /// Bookkeeping-only inverse.
    Implicit(ImplicitRelationship),
}

impl Relationship {
    /// Instantiates the variant matching `definition.kind`.
    pub fn new(identifier: RecordIdentifier, definition: Rc<EdgeDefinition>) -> Self {
        match definition.kind {
            EdgeKind::BelongsTo => Self::BelongsTo(BelongsToRelationship::new(identifier, definition)),
            EdgeKind::HasMany => Self::Collection(CollectionRelationship::new(identifier, definition)),
            EdgeKind::Implicit => Self::Implicit(ImplicitRelationship::new(identifier, definition)),
        }
    }

    /// To-one variant, if that is what this is.
    pub fn as_belongs_to(&self) -> Option<&BelongsToRelationship> {
        match self {
            Self::BelongsTo(rel) => Some(rel),
            _ => None,
        }
    }

    /// To-many variant, if that is what this is.
    pub fn as_collection(&self) -> Option<&CollectionRelationship> {
        match self {
            Self::Collection(rel) => Some(rel),
            _ => None,
        }
    }

    /// Returns `true` if neither view has members.
    pub fn is_unreferenced(&self) -> bool {
        self.remote_members().is_empty() && self.local_members().is_empty()
    }

    /// Remote and local members, remote first, without duplicates.
    pub fn all_members(&self) -> Vec<RecordIdentifier> {
        let mut all: MemberSet = self.remote_members().into_iter().collect();
        all.extend(self.local_members());
        all.into_iter().collect()
    }
}

macro_rules! dispatch {
    ($self:ident, $rel:ident => $body:expr) => {
        match $self {
            Relationship::BelongsTo($rel) => $body,
            Relationship::Collection($rel) => $body,
            Relationship::Implicit($rel) => $body,
        }
    };
}

impl RelationshipState for Relationship {
    fn identifier(&self) -> &RecordIdentifier {
        dispatch!(self, rel => rel.identifier())
    }
    fn definition(&self) -> &Rc<EdgeDefinition> {
        dispatch!(self, rel => rel.definition())
    }
    fn flags(&self) -> &RelationshipFlags {
        dispatch!(self, rel => rel.flags())
    }
    fn flags_mut(&mut self) -> &mut RelationshipFlags {
        dispatch!(self, rel => rel.flags_mut())
    }
    fn remote_members(&self) -> Vec<RecordIdentifier> {
        dispatch!(self, rel => rel.remote_members())
    }
    fn local_members(&self) -> Vec<RecordIdentifier> {
        dispatch!(self, rel => rel.local_members())
    }
    fn has_remote(&self, member: &RecordIdentifier) -> bool {
        dispatch!(self, rel => rel.has_remote(member))
    }
    fn has_local(&self, member: &RecordIdentifier) -> bool {
        dispatch!(self, rel => rel.has_local(member))
    }
    fn add_remote(&mut self, member: &RecordIdentifier) -> Membership {
        dispatch!(self, rel => rel.add_remote(member))
    }
    fn remove_remote(&mut self, member: &RecordIdentifier) -> bool {
        dispatch!(self, rel => rel.remove_remote(member))
    }
    fn replace_remote(&mut self, members: &[RecordIdentifier]) -> bool {
        dispatch!(self, rel => rel.replace_remote(members))
    }
    fn add_local(&mut self, member: &RecordIdentifier, index: Option<usize>) -> Membership {
        dispatch!(self, rel => rel.add_local(member, index))
    }
    fn remove_local(&mut self, member: &RecordIdentifier) -> bool {
        dispatch!(self, rel => rel.remove_local(member))
    }
    fn replace_local(&mut self, members: &[RecordIdentifier]) -> bool {
        dispatch!(self, rel => rel.replace_local(members))
    }
    fn flush_canonical(&mut self, lifecycle: &dyn RecordLifecycle) -> bool {
        dispatch!(self, rel => rel.flush_canonical(lifecycle))
    }
    fn replace_member(&mut self, from: &RecordIdentifier, to: &RecordIdentifier) -> bool {
        dispatch!(self, rel => rel.replace_member(from, to))
    }
    fn rebind(&mut self, identifier: RecordIdentifier) {
        dispatch!(self, rel => rel.rebind(identifier));
    }
    fn update_meta(&mut self, meta: Value) -> bool {
        dispatch!(self, rel => rel.update_meta(meta))
    }
    fn update_links(&mut self, links: Links) -> LinksUpdate {
        dispatch!(self, rel => rel.update_links(links))
    }
    fn get_data(&self) -> RelationshipSnapshot {
        dispatch!(self, rel => rel.get_data())
    }
    fn clear(&mut self) {
        dispatch!(self, rel => rel.clear());
    }
    fn destroy(&mut self) {
        dispatch!(self, rel => rel.destroy());
    }
}

/// Shared `update_links` logic.
pub(crate) fn apply_links(slot: &mut Option<Links>, links: Links) -> LinksUpdate {
    let previous_related = slot.as_ref().and_then(Links::related_href);
    let related_changed = links
        .related_href()
        .is_some_and(|href| previous_related != Some(href));
    let changed = slot.as_ref() != Some(&links);
    *slot = Some(links);
    LinksUpdate {
        changed,
        related_changed,
    }
}

/// Shared `update_meta` logic.
pub(crate) fn apply_meta(slot: &mut Option<Value>, meta: Value) -> bool {
    let changed = slot.as_ref() != Some(&meta);
    *slot = Some(meta);
    changed
}

/// Canonical order first, then local-only members that survive because
/// either end of the edge is unpersisted, in their prior local order.
pub(crate) fn reconcile_many(
    owner: &RecordIdentifier,
    remote: &MemberSet,
    local: &MemberSet,
    lifecycle: &dyn RecordLifecycle,
) -> MemberSet {
    let owner_is_new = lifecycle.is_new(owner);
    let mut next = remote.clone();
    for member in local {
        if !remote.contains(member) && (owner_is_new || lifecycle.is_new(member)) {
            next.insert(member.clone());
        }
    }
    next
}

/// Order-sensitive equality.
pub(crate) fn same_order(a: &MemberSet, b: &MemberSet) -> bool {
    a.len() == b.len() && a.iter().eq(b.iter())
}

/// Swaps `from` for `to` keeping position; drops `from` if `to` is already
/// present.
pub(crate) fn swap_member(set: &mut MemberSet, from: &RecordIdentifier, to: &RecordIdentifier) -> bool {
    let Some(index) = set.get_index_of(from) else {
        return false;
    };
    set.shift_remove_index(index);
    if !set.contains(to) {
        set.shift_insert(index.min(set.len()), to.clone());
    }
    true
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::identifier_cache::IdentifierCache;
    use crate::resource::Resource;

    fn idents(cache: &mut IdentifierCache, ty: &str, ids: &[&str]) -> Vec<RecordIdentifier> {
        ids.iter()
            .map(|id| cache.get_or_create_record_identifier(&Resource::new(ty, Some(id))).unwrap())
            .collect()
    }

    #[test]
    fn reconcile_keeps_new_members_after_canonical_order() {
        let mut cache = IdentifierCache::default();
        let owner = idents(&mut cache, "post", &["1"]).remove(0);
        let c = idents(&mut cache, "comment", &["1", "2", "3"]);
        let fresh = cache.create_identifier_for_new_record("comment", None).unwrap();
        let new: HashSet<_> = [fresh.clone()].into_iter().collect();

        let remote: MemberSet = [c[2].clone(), c[0].clone()].into_iter().collect();
        let local: MemberSet = [c[0].clone(), fresh.clone(), c[1].clone()].into_iter().collect();
        let next = reconcile_many(&owner, &remote, &local, &new);
        let order: Vec<_> = next.into_iter().collect();
        assert_eq!(order, vec![c[2].clone(), c[0].clone(), fresh]);
    }

    #[test]
    fn swap_member_keeps_position() {
        let mut cache = IdentifierCache::default();
        let c = idents(&mut cache, "comment", &["1", "2", "3"]);
        let mut set: MemberSet = c.iter().cloned().collect();
        let replacement = cache.create_identifier_for_new_record("comment", None).unwrap();
        assert!(swap_member(&mut set, &c[1], &replacement));
        assert_eq!(set.get_index_of(&replacement), Some(1));
        assert!(swap_member(&mut set, &c[0], &c[2]), "duplicate target collapses");
        assert_eq!(set.len(), 2);
        assert!(!swap_member(&mut set, &c[0], &c[2]));
    }

    #[test]
    fn links_update_reports_related_change() {
        let mut slot = None;
        let first: Links = serde_json::from_value(serde_json::json!({ "related": "/a" })).unwrap();
        let update = apply_links(&mut slot, first.clone());
        assert!(update.changed && update.related_changed);
        let update = apply_links(&mut slot, first);
        assert_eq!(update, LinksUpdate::default());
        let self_only: Links = serde_json::from_value(serde_json::json!({ "self": "/s" })).unwrap();
        let update = apply_links(&mut slot, self_only);
        assert!(update.changed);
        assert!(!update.related_changed);
    }
}
