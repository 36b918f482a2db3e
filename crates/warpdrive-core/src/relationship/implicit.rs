// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::rc::Rc;

use serde_json::Value;

use super::collection::{insert_at, replace_all};
use super::{
    reconcile_many, same_order, swap_member, LinksUpdate, MemberSet, Membership, RecordLifecycle,
    RelationshipFlags, RelationshipMembers, RelationshipSnapshot, RelationshipState,
};
use crate::edge::EdgeDefinition;
use crate::ident::RecordIdentifier;
use crate::resource::Links;

/// Bookkeeping inverse of a one-directional field: which records point at
/// this one. Never exposed to readers as a field, carries no links or meta
/// and never notifies.
#[derive(Clone, Debug)]
pub struct ImplicitRelationship {
    identifier: RecordIdentifier,
    definition: Rc<EdgeDefinition>,
    remote_members: MemberSet,
    local_members: MemberSet,
    flags: RelationshipFlags,
}

impl ImplicitRelationship {
    /// Empty relationship for `identifier`.
    pub fn new(identifier: RecordIdentifier, definition: Rc<EdgeDefinition>) -> Self {
        Self {
            identifier,
            definition,
            remote_members: MemberSet::default(),
            local_members: MemberSet::default(),
            flags: RelationshipFlags::default(),
        }
    }
}

impl RelationshipState for ImplicitRelationship {
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

    fn update_meta(&mut self, _meta: Value) -> bool {
        false
    }

    fn update_links(&mut self, _links: Links) -> LinksUpdate {
        LinksUpdate::default()
    }

    fn get_data(&self) -> RelationshipSnapshot {
        RelationshipSnapshot {
            data: Some(RelationshipMembers::Many(self.local_members())),
            links: None,
            meta: None,
        }
    }

    fn clear(&mut self) {
        self.remote_members.clear();
        self.local_members.clear();
    }

    fn destroy(&mut self) {
        self.clear();
        self.flags = RelationshipFlags::default();
    }
}
