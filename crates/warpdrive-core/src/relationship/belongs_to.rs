// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use std::rc::Rc;

use serde_json::Value;

use super::{
    apply_links, apply_meta, LinksUpdate, Membership, RecordLifecycle, RelationshipFlags,
    RelationshipMembers, RelationshipSnapshot, RelationshipState,
};
use crate::edge::EdgeDefinition;
use crate::ident::RecordIdentifier;
use crate::resource::Links;

/// To-one relationship state.
#[derive(Clone, Debug)]
pub struct BelongsToRelationship {
    identifier: RecordIdentifier,
    definition: Rc<EdgeDefinition>,
    remote_state: Option<RecordIdentifier>,
    local_state: Option<RecordIdentifier>,
    links: Option<Links>,
    meta: Option<Value>,
    flags: RelationshipFlags,
}

impl BelongsToRelationship {
    /// Empty relationship for `identifier`.
    pub fn new(identifier: RecordIdentifier, definition: Rc<EdgeDefinition>) -> Self {
        Self {
            identifier,
            definition,
            remote_state: None,
            local_state: None,
            links: None,
            meta: None,
            flags: RelationshipFlags::default(),
        }
    }

    /// Canonical value.
    pub fn remote_state(&self) -> Option<&RecordIdentifier> {
        self.remote_state.as_ref()
    }

    /// Local value.
    pub fn local_state(&self) -> Option<&RecordIdentifier> {
        self.local_state.as_ref()
    }
}

fn set_slot(slot: &mut Option<RecordIdentifier>, member: &RecordIdentifier) -> Membership {
    match slot.replace(member.clone()) {
        Some(previous) if previous.ptr_eq(member) => Membership::Unchanged,
        Some(previous) => Membership::Replaced(previous),
        None => Membership::Added,
    }
}

fn clear_slot(slot: &mut Option<RecordIdentifier>, member: &RecordIdentifier) -> bool {
    if slot.as_ref().is_some_and(|current| current.ptr_eq(member)) {
        *slot = None;
        true
    } else {
        false
    }
}

fn replace_slot(slot: &mut Option<RecordIdentifier>, members: &[RecordIdentifier]) -> bool {
    let next = members.first().cloned();
    let changed = *slot != next;
    *slot = next;
    changed
}

impl RelationshipState for BelongsToRelationship {
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
        self.remote_state.iter().cloned().collect()
    }

    fn local_members(&self) -> Vec<RecordIdentifier> {
        self.local_state.iter().cloned().collect()
    }

    fn has_remote(&self, member: &RecordIdentifier) -> bool {
        self.remote_state.as_ref() == Some(member)
    }

    fn has_local(&self, member: &RecordIdentifier) -> bool {
        self.local_state.as_ref() == Some(member)
    }

    fn add_remote(&mut self, member: &RecordIdentifier) -> Membership {
        set_slot(&mut self.remote_state, member)
    }

    fn remove_remote(&mut self, member: &RecordIdentifier) -> bool {
        clear_slot(&mut self.remote_state, member)
    }

    fn replace_remote(&mut self, members: &[RecordIdentifier]) -> bool {
        replace_slot(&mut self.remote_state, members)
    }

    fn add_local(&mut self, member: &RecordIdentifier, _index: Option<usize>) -> Membership {
        set_slot(&mut self.local_state, member)
    }

    fn remove_local(&mut self, member: &RecordIdentifier) -> bool {
        clear_slot(&mut self.local_state, member)
    }

    fn replace_local(&mut self, members: &[RecordIdentifier]) -> bool {
        replace_slot(&mut self.local_state, members)
    }

    fn flush_canonical(&mut self, lifecycle: &dyn RecordLifecycle) -> bool {
        self.flags.will_sync = false;
        // An unpersisted local value survives an empty canonical value.
        if self.remote_state.is_none() {
            if let Some(local) = &self.local_state {
                if lifecycle.is_new(local) || lifecycle.is_new(&self.identifier) {
                    return false;
                }
            }
        }
        if self.local_state == self.remote_state {
            return false;
        }
        self.local_state.clone_from(&self.remote_state);
        true
    }

    fn replace_member(&mut self, from: &RecordIdentifier, to: &RecordIdentifier) -> bool {
        let mut found = false;
        for slot in [&mut self.remote_state, &mut self.local_state] {
            if slot.as_ref() == Some(from) {
                *slot = Some(to.clone());
                found = true;
            }
        }
        found
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
        let data = (self.flags.has_received_data || self.local_state.is_some())
            .then(|| RelationshipMembers::One(self.local_state.clone()));
        RelationshipSnapshot {
            data,
            links: self.links.clone(),
            meta: self.meta.clone(),
        }
    }

    fn clear(&mut self) {
        self.remote_state = None;
        self.local_state = None;
    }

    fn destroy(&mut self) {
        self.clear();
        self.links = None;
        self.meta = None;
        self.flags = RelationshipFlags::default();
    }
}
