// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Edge mutations with inverse bookkeeping.
//!
//! Remote (canonical) changes update the inverse's remote state at once and
//! defer local reconciliation to the next flush. Local edits update both
//! sides' local state at once and notify before returning. A to-one inverse
//! that gets displaced releases its previous partner (one level deep).
use tracing::warn;

use super::{Graph, GraphError};
use crate::edge::{EdgeKind, FieldKey};
use crate::ident::RecordIdentifier;
use crate::relationship::{MemberSet, Membership, RelationshipState};

impl Graph {
    /// Replaces `owner.key`'s canonical members and updates every affected
    /// inverse's canonical state. Reconciliation is deferred to the flush.
    pub(super) fn replace_remote_members(
        &mut self,
        owner: &RecordIdentifier,
        key: &FieldKey,
        members: &[RecordIdentifier],
    ) -> Result<(), GraphError> {
        let (previous, inverse_key) = {
            let rel = self.ensure(owner, key)?;
            let previous: MemberSet = rel.remote_members().into_iter().collect();
            (previous, rel.definition().inverse_key())
        };
        let next: MemberSet = members.iter().cloned().collect();
        // Every inverse exists before the owner changes, so a failure leaves
        // both sides as they were.
        for added in next.iter().filter(|m| !previous.contains(*m)) {
            self.ensure(added, &inverse_key)?;
        }
        let replaced = self
            .relationship_mut(owner, key)
            .is_some_and(|rel| rel.replace_remote(members));
        if !replaced {
            return Ok(());
        }
        for removed in previous.iter().filter(|m| !next.contains(*m)) {
            self.remove_remote_member(removed, &inverse_key, owner);
        }
        for added in next.iter().filter(|m| !previous.contains(*m)) {
            self.add_remote_inverse(added, &inverse_key, owner)?;
        }
        self.flush_canonical_later(owner, key);
        Ok(())
    }

    fn add_remote_inverse(
        &mut self,
        member: &RecordIdentifier,
        inverse_key: &FieldKey,
        owner: &RecordIdentifier,
    ) -> Result<(), GraphError> {
        let (outcome, back_key, declared) = {
            let rel = self.ensure(member, inverse_key)?;
            let outcome = rel.add_remote(owner);
            let definition = rel.definition();
            (outcome, definition.inverse_key(), definition.related_type.clone())
        };
        match outcome {
            Membership::Unchanged => return Ok(()),
            Membership::Added => {}
            Membership::Replaced(previous) => self.remove_remote_member(&previous, &back_key, member),
        }
        if owner.resource_type() != declared && !matches!(inverse_key, FieldKey::Implicit(_)) {
            self.register_polymorphic_type(&declared, owner.resource_type());
        }
        self.flush_canonical_later(member, inverse_key);
        Ok(())
    }

    pub(super) fn remove_remote_member(
        &mut self,
        owner: &RecordIdentifier,
        key: &FieldKey,
        member: &RecordIdentifier,
    ) {
        let removed = self
            .relationship_mut(owner, key)
            .is_some_and(|rel| rel.remove_remote(member));
        if removed {
            self.flush_canonical_later(owner, key);
        }
    }

    /// Applies a local diff of `owner`'s members to each inverse's local
    /// state.
    pub(super) fn mirror_local(
        &mut self,
        owner: &RecordIdentifier,
        inverse_key: &FieldKey,
        before: &[RecordIdentifier],
        after: &[RecordIdentifier],
    ) {
        let before: MemberSet = before.iter().cloned().collect();
        let after: MemberSet = after.iter().cloned().collect();
        for removed in before.iter().filter(|m| !after.contains(*m)) {
            self.remove_local_inverse(removed, inverse_key, owner);
        }
        for added in after.iter().filter(|m| !before.contains(*m)) {
            self.add_local_inverse(added, inverse_key, owner);
        }
    }

    fn add_local_inverse(
        &mut self,
        member: &RecordIdentifier,
        inverse_key: &FieldKey,
        owner: &RecordIdentifier,
    ) {
        let (outcome, back_key) = match self.ensure(member, inverse_key) {
            Ok(rel) => (rel.add_local(owner, None), rel.definition().inverse_key()),
            Err(err) => {
                warn!(%err, lid = member.lid(), "cannot mirror local edge onto inverse");
                return;
            }
        };
        match outcome {
            Membership::Unchanged => return,
            Membership::Added => {}
            Membership::Replaced(previous) => {
                let released = self
                    .relationship_mut(&previous, &back_key)
                    .is_some_and(|rel| rel.remove_local(member));
                if released {
                    self.mark_changed(&previous, &back_key);
                }
            }
        }
        self.mark_changed(member, inverse_key);
    }

    fn remove_local_inverse(
        &mut self,
        member: &RecordIdentifier,
        inverse_key: &FieldKey,
        owner: &RecordIdentifier,
    ) {
        let removed = self
            .relationship_mut(member, inverse_key)
            .is_some_and(|rel| rel.remove_local(owner));
        if removed {
            self.mark_changed(member, inverse_key);
        }
    }

    /// Adds `members` to the local state of the to-many `owner.field`,
    /// starting at `index` (appending when `None`). Applies and notifies
    /// immediately.
    pub fn add_to_relationship(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        members: &[RecordIdentifier],
        index: Option<usize>,
    ) -> Result<(), GraphError> {
        self.edit_local(owner, field, members, Some((EdgeKind::HasMany, "add")), |current| {
            let mut next: MemberSet = current.into_iter().collect();
            let mut at = index;
            for member in members {
                if next.contains(member) {
                    continue;
                }
                match at {
                    Some(i) => {
                        let position = i.min(next.len());
                        next.shift_insert(position, member.clone());
                        at = Some(position + 1);
                    }
                    None => {
                        next.insert(member.clone());
                    }
                }
            }
            next.into_iter().collect()
        })
    }

    /// Removes `members` from the local state of the to-many `owner.field`.
    pub fn remove_from_relationship(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        members: &[RecordIdentifier],
    ) -> Result<(), GraphError> {
        self.edit_local(owner, field, &[], Some((EdgeKind::HasMany, "remove")), |current| {
            current
                .into_iter()
                .filter(|m| !members.contains(m))
                .collect()
        })
    }

    /// Replaces the local state of `owner.field` (either kind; a to-one
    /// field takes the first member).
    pub fn replace_relationship(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        members: &[RecordIdentifier],
    ) -> Result<(), GraphError> {
        self.edit_local(owner, field, members, None, |_| members.to_vec())
    }

    /// Sets (or clears) the local value of the to-one `owner.field`.
    pub fn set_belongs_to(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        member: Option<&RecordIdentifier>,
    ) -> Result<(), GraphError> {
        let members: Vec<RecordIdentifier> = member.into_iter().cloned().collect();
        self.edit_local(
            owner,
            field,
            &members,
            Some((EdgeKind::BelongsTo, "set")),
            |_| members.clone(),
        )
    }

    fn edit_local(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        incoming: &[RecordIdentifier],
        expect: Option<(EdgeKind, &'static str)>,
        edit: impl FnOnce(Vec<RecordIdentifier>) -> Vec<RecordIdentifier>,
    ) -> Result<(), GraphError> {
        self.ensure_live()?;
        let definition = self.edges.definition(owner.resource_type(), field)?;
        if let Some((kind, operation)) = expect {
            if definition.kind != kind {
                return Err(GraphError::WrongKind {
                    resource_type: definition.owner_type.clone(),
                    field: field.to_owned(),
                    operation,
                });
            }
        }
        for member in incoming {
            self.check_member_type(&definition, member)?;
        }
        let key = FieldKey::Named(field.to_owned());
        let (previous, next) = {
            let rel = self.ensure(owner, &key)?;
            let previous = rel.local_members();
            let next = edit(previous.clone());
            if !rel.replace_local(&next) {
                return Ok(());
            }
            (previous, rel.local_members())
        };
        self.mirror_local(owner, &definition.inverse_key(), &previous, &next);
        self.mark_changed(owner, &key);
        self.dispatch_notifications();
        Ok(())
    }

    /// Adds one canonical member to `owner.field` (a to-one field is
    /// replaced). The inverse is updated and reconciliation is scheduled.
    pub fn add_canonical(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        member: &RecordIdentifier,
    ) -> Result<(), GraphError> {
        self.edit_remote(owner, field, Some(member), |kind, mut current| {
            if kind == EdgeKind::BelongsTo {
                return vec![member.clone()];
            }
            if !current.contains(member) {
                current.push(member.clone());
            }
            current
        })
    }

    /// Removes one canonical member from `owner.field`.
    pub fn remove_canonical(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        member: &RecordIdentifier,
    ) -> Result<(), GraphError> {
        self.edit_remote(owner, field, None, |_, current| {
            current.into_iter().filter(|m| m != member).collect()
        })
    }

    fn edit_remote(
        &mut self,
        owner: &RecordIdentifier,
        field: &str,
        incoming: Option<&RecordIdentifier>,
        edit: impl FnOnce(EdgeKind, Vec<RecordIdentifier>) -> Vec<RecordIdentifier>,
    ) -> Result<(), GraphError> {
        self.ensure_live()?;
        let definition = self.edges.definition(owner.resource_type(), field)?;
        if let Some(member) = incoming {
            self.check_member_type(&definition, member)?;
        }
        let key = FieldKey::Named(field.to_owned());
        let current = self.ensure(owner, &key)?.remote_members();
        let next = edit(definition.kind, current);
        self.replace_remote_members(owner, &key, &next)
    }
}
