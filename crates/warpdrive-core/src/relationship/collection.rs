// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::rc::Rc;

use serde_json::Value;

use super::{
    apply_links, apply_meta, reconcile_many, same_order, swap_member, LinksUpdate, MemberSet,
    Membership, RecordLifecycle, RelationshipFlags, RelationshipMembers, RelationshipSnapshot,
    RelationshipState,
};
use crate::edge::EdgeDefinition;
use crate::ident::RecordIdentifier;
use crate::resource::Links;

/// To-many relationship state.
#[derive(Clone, Debug)]
pub struct CollectionRelationship {
    identifier: RecordIdentifier,
    definition: Rc<EdgeDefinition>,
    remote_members: MemberSet,
    local_members: MemberSet,
    links: Option<Links>,
    meta: Option<Value>,
    flags: RelationshipFlags,
}

impl CollectionRelationship {
    /// Empty relationship for `identifier`.
    pub fn new(identifier: RecordIdentifier, definition: Rc<EdgeDefinition>) -> Self {
        Self {
            identifier,
            definition,
            remote_members: MemberSet::default(),
            local_members: MemberSet::default(),
            links: None,
            meta: None,
            flags: RelationshipFlags::default(),
        }
    }

    /// Canonical members.
    pub fn remote_state(&self) -> &MemberSet {
        &self.remote_members
    }

    /// Local members.
    pub fn local_state(&self) -> &MemberSet {
        &self.local_members
    }
}

pub(super) fn insert_at(set: &mut MemberSet, member: &RecordIdentifier, index: Option<usize>) -> Membership {
    if set.contains(member) {
        return Membership::Unchanged;
    }
    match index {
        Some(index) => {
            set.shift_insert(index.min(set.len()), member.clone());
        }
        None => {
            set.insert(member.clone());
        }
    }
    Membership::Added
}

pub(super) fn replace_all(set: &mut MemberSet, members: &[RecordIdentifier]) -> bool {
    let next: MemberSet = members.iter().cloned().collect();
    if same_order(set, &next) {
        return false;
    }
    *set = next;
    true
}

impl RelationshipState for CollectionRelationship {
    fn identifier(&self) -> &RecordIdentifier {
        &self.identifier
    }

    fn definition(&self) -> &Rc<EdgeDefinition> {
        &self.definition
    }

    fn flags(&self) -> &RelationshipFlags {
        &self.flags
    }

    fn flags_mut(&mut self) -> &mut RelationshipFlags {
        &mut self.flags
    }

    fn remote_members(&self) -> Vec<RecordIdentifier> {
        self.remote_members.iter().cloned().collect()
    }

    fn local_members(&self) -> Vec<RecordIdentifier> {
        self.local_members.iter().cloned().collect()
    }

    fn has_remote(&self, member: &RecordIdentifier) -> bool {
        self.remote_members.contains(member)
    }

    fn has_local(&self, member: &RecordIdentifier) -> bool {
        self.local_members.contains(member)
    }

    fn add_remote(&mut self, member: &RecordIdentifier) -> Membership {
        insert_at(&mut self.remote_members, member, None)
    }

    fn remove_remote(&mut self, member: &RecordIdentifier) -> bool {
        self.remote_members.shift_remove(member)
    }

    fn replace_remote(&mut self, members: &[RecordIdentifier]) -> bool {
        replace_all(&mut self.remote_members, members)
    }

    fn add_local(&mut self, member: &RecordIdentifier, index: Option<usize>) -> Membership {
        insert_at(&mut self.local_members, member, index)
    }

    fn remove_local(&mut self, member: &RecordIdentifier) -> bool {
        self.local_members.shift_remove(member)
    }

    fn replace_local(&mut self, members: &[RecordIdentifier]) -> bool {
        replace_all(&mut self.local_members, members)
    }

    fn flush_canonical(&mut self, lifecycle: &dyn RecordLifecycle) -> bool {
        self.flags.will_sync = false;
        let next = reconcile_many(
            &self.identifier,
            &self.remote_members,
            &self.local_members,
            lifecycle,
        );
        if same_order(&next, &self.local_members) {
            return false;
        }
        self.local_members = next;
        true
    }

    fn replace_member(&mut self, from: &RecordIdentifier, to: &RecordIdentifier) -> bool {
        let remote = swap_member(&mut self.remote_members, from, to);
        let local = swap_member(&mut self.local_members, from, to);
        remote || local
    }

    fn rebind(&mut self, identifier: RecordIdentifier) {
        self.identifier = identifier;
    }

    fn update_meta(&mut self, meta: Value) -> bool {
        apply_meta(&mut self.meta, meta)
    }

    fn update_links(&mut self, links: Links) -> LinksUpdate {
        apply_links(&mut self.links, links)
    }

    fn get_data(&self) -> RelationshipSnapshot {
        let data = (self.flags.has_received_data || !self.local_members.is_empty())
            .then(|| RelationshipMembers::Many(self.local_members()));
        RelationshipSnapshot {
            data,
            links: self.links.clone(),
            meta: self.meta.clone(),
        }
    }

    fn clear(&mut self) {
        self.remote_members.clear();
        self.local_members.clear();
    }

    fn destroy(&mut self) {
        self.clear();
        self.links = None;
        self.meta = None;
        self.flags = RelationshipFlags::default();
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::edge::EdgeResolver;
    use crate::identifier_cache::IdentifierCache;
    use crate::resource::Resource;
    use crate::schema::{RelationshipSchema, SchemaRegistry};

    fn fixture() -> (IdentifierCache, CollectionRelationship) {
        let schema = SchemaRegistry::new()
            .with_type("post", [RelationshipSchema::has_many("comments", "comment")])
            .with_type("comment", [RelationshipSchema::belongs_to("post", "post")]);
        let def = EdgeResolver::new(Rc::new(schema)).definition("post", "comments").unwrap();
        let mut cache = IdentifierCache::default();
        let owner = cache
            .get_or_create_record_identifier(&Resource::new("post", Some("1")))
            .unwrap();
        (cache, CollectionRelationship::new(owner, def))
    }

    fn comments(cache: &mut IdentifierCache, ids: &[&str]) -> Vec<RecordIdentifier> {
        ids.iter()
            .map(|id| {
                cache
                    .get_or_create_record_identifier(&Resource::new("comment", Some(id)))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn replace_remote_dedupes_and_keeps_order() {
        let (mut cache, mut rel) = fixture();
        let c = comments(&mut cache, &["1", "2"]);
        assert!(rel.replace_remote(&[c[1].clone(), c[0].clone(), c[1].clone()]));
        assert_eq!(rel.remote_members(), vec![c[1].clone(), c[0].clone()]);
        assert!(!rel.replace_remote(&[c[1].clone(), c[0].clone()]), "same data is a no-op");
        assert!(rel.replace_remote(&[c[0].clone(), c[1].clone()]), "reorder is a change");
    }

    #[test]
    fn local_insert_respects_index() {
        let (mut cache, mut rel) = fixture();
        let c = comments(&mut cache, &["1", "2", "3"]);
        rel.add_local(&c[0], None);
        rel.add_local(&c[1], None);
        assert_eq!(rel.add_local(&c[2], Some(0)), Membership::Added);
        assert_eq!(rel.add_local(&c[2], Some(2)), Membership::Unchanged);
        assert_eq!(rel.local_members(), vec![c[2].clone(), c[0].clone(), c[1].clone()]);
        rel.add_local(&comments(&mut cache, &["4"])[0], Some(99));
        assert_eq!(rel.local_members().len(), 4);
    }

    #[test]
    fn flush_preserves_unpersisted_sibling() {
        let (mut cache, mut rel) = fixture();
        let c = comments(&mut cache, &["1", "2"]);
        let fresh = cache.create_identifier_for_new_record("comment", None).unwrap();
        rel.replace_local(&[c[0].clone(), fresh.clone()]);
        rel.replace_remote(&[c[1].clone()]);
        let new: HashSet<_> = [fresh.clone()].into_iter().collect();
        assert!(rel.flush_canonical(&new));
        assert_eq!(rel.local_members(), vec![c[1].clone(), fresh]);
    }

    #[test]
    fn flush_keeps_everything_for_unpersisted_owner() {
        let (mut cache, mut rel) = fixture();
        let c = comments(&mut cache, &["1", "2"]);
        rel.replace_local(&[c[0].clone()]);
        rel.replace_remote(&[c[1].clone()]);
        let new: HashSet<_> = [rel.identifier().clone()].into_iter().collect();
        rel.flush_canonical(&new);
        assert_eq!(rel.local_members(), vec![c[1].clone(), c[0].clone()]);
    }

    #[test]
    fn snapshot_reflects_local_view() {
        let (mut cache, mut rel) = fixture();
        assert!(rel.get_data().data.is_none());
        let c = comments(&mut cache, &["1"]);
        rel.add_local(&c[0], None);
        assert_eq!(rel.get_data().data, Some(RelationshipMembers::Many(c)));
    }
}
