// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Unload, release and identifier merge.
use tracing::debug;

use super::{ExplicitBag, Graph, GraphError, ImplicitBag};
use crate::edge::{EdgeKind, FieldKey};
use crate::ident::RecordIdentifier;
use crate::relationship::{RecordLifecycle, Relationship, RelationshipState};

impl Graph {
    /// Dematerializes `identifier` from every edge it takes part in.
    ///
    /// Each partner decides what the departure means for its side: a sync
    /// edge, or an edge to a record that was never persisted, loses the
    /// member in both views; an async edge to a persisted record keeps the
    /// member and is flagged `has_dematerialized_inverse`. Implicit inverses
    /// always lose it. Partners that dropped the member are dropped from
    /// this record's own views too.
    ///
    /// Returns `true` when no edge still references `identifier`, in which
    /// case its relationships have been released and the identifier may be
    /// forgotten. A record with a save in flight is refused before any
    /// mutation.
    pub fn unload(
        &mut self,
        identifier: &RecordIdentifier,
        lifecycle: &dyn RecordLifecycle,
    ) -> Result<bool, GraphError> {
        self.ensure_live()?;
        if lifecycle.is_in_flight(identifier) {
            return Err(GraphError::UnloadInFlight {
                lid: identifier.lid().to_owned(),
            });
        }
        let departing_is_new = lifecycle.is_new(identifier);
        for key in self.keys_of(identifier) {
            let Some((inverse_key, members)) = self
                .relationship_mut(identifier, &key)
                .map(|rel| (rel.definition().inverse_key(), rel.all_members()))
            else {
                continue;
            };
            let mut purged = Vec::new();
            for member in members {
                if self.inverse_dematerialized(&member, &inverse_key, identifier, departing_is_new) {
                    purged.push(member);
                }
            }
            if purged.is_empty() {
                continue;
            }
            if let Some(rel) = self.relationship_mut(identifier, &key) {
                for member in &purged {
                    rel.remove_remote(member);
                    rel.remove_local(member);
                }
            }
            self.mark_changed(identifier, &key);
        }
        let releasable = self.is_releasable(identifier);
        if releasable {
            self.remove(identifier);
        }
        debug!(lid = identifier.lid(), releasable, "unloaded identifier from graph");
        self.dispatch_notifications();
        Ok(releasable)
    }

    /// Handles `departing` leaving `owner.key`. Returns `true` when the
    /// edge was removed.
    fn inverse_dematerialized(
        &mut self,
        owner: &RecordIdentifier,
        key: &FieldKey,
        departing: &RecordIdentifier,
        departing_is_new: bool,
    ) -> bool {
        let Some(rel) = self.relationship_mut(owner, key) else {
            return true;
        };
        let definition = rel.definition().clone();
        if definition.kind == EdgeKind::Implicit {
            rel.remove_remote(departing);
            rel.remove_local(departing);
            return true;
        }
        // A to-one field that was locally pointed elsewhere is no longer
        // about the departing record.
        if definition.kind == EdgeKind::BelongsTo {
            let local = rel.local_members();
            if local.first().is_some_and(|current| current != departing) {
                rel.remove_remote(departing);
                return true;
            }
        }
        if !definition.is_async || departing_is_new {
            let remote = rel.remove_remote(departing);
            let local = rel.remove_local(departing);
            if remote || local {
                self.mark_changed(owner, key);
            }
            return true;
        }
        let flags = rel.flags_mut();
        if !flags.has_dematerialized_inverse {
            flags.has_dematerialized_inverse = true;
            self.mark_changed(owner, key);
        }
        false
    }

    /// Returns `true` when none of `identifier`'s relationships hold a
    /// member.
    pub fn is_releasable(&self, identifier: &RecordIdentifier) -> bool {
        let explicit = self
            .identifiers
            .get(identifier)
            .is_none_or(|bag| bag.values().all(Relationship::is_unreferenced));
        let implicit = self
            .implicit
            .get(identifier)
            .is_none_or(|bag| bag.values().all(Relationship::is_unreferenced));
        explicit && implicit
    }

    /// Drops every relationship instance owned by `identifier`. Partners are
    /// not touched.
    pub fn remove(&mut self, identifier: &RecordIdentifier) {
        for mut rel in self
            .identifiers
            .remove(identifier)
            .into_iter()
            .flat_map(ExplicitBag::into_values)
            .chain(
                self.implicit
                    .remove(identifier)
                    .into_iter()
                    .flat_map(ImplicitBag::into_values),
            )
        {
            rel.destroy();
        }
        self.pending_sync.retain(|(owner, _)| owner != identifier);
    }

    /// Re-keys `loser`'s relationships onto `survivor` after the identifier
    /// cache merged them.
    ///
    /// Every partner swaps `loser` for `survivor` in place. Fields the
    /// survivor has not instantiated move across whole; on fields it has,
    /// the loser's members join the survivor's (a to-one value the survivor
    /// already holds wins, and the displaced partner lets go of it).
    pub fn merge_identifiers(&mut self, loser: &RecordIdentifier, survivor: &RecordIdentifier) {
        if loser.ptr_eq(survivor) || self.destroyed {
            return;
        }
        let explicit = self.identifiers.remove(loser).unwrap_or_default();
        let implicit = self.implicit.remove(loser).unwrap_or_default();
        let moved = explicit
            .into_iter()
            .map(|(field, rel)| (FieldKey::Named(field), rel))
            .chain(
                implicit
                    .into_iter()
                    .map(|(key, rel)| (FieldKey::Implicit(key), rel)),
            );
        for (key, mut rel) in moved.collect::<Vec<_>>() {
            let inverse_key = rel.definition().inverse_key();
            let members = rel.all_members();
            if self.peek(survivor, &key).is_some() {
                for member in &members {
                    if let Some(partner) = self.relationship_mut(member, &inverse_key) {
                        partner.replace_member(loser, survivor);
                    }
                    self.mark_changed(member, &inverse_key);
                }
                rel.replace_member(loser, survivor);
                self.absorb_members(survivor, &key, &inverse_key, &rel);
                rel.destroy();
                continue;
            }
            for member in &members {
                if let Some(partner) = self.relationship_mut(member, &inverse_key) {
                    partner.replace_member(loser, survivor);
                }
                self.mark_changed(member, &inverse_key);
            }
            rel.replace_member(loser, survivor);
            rel.rebind(survivor.clone());
            match &key {
                FieldKey::Named(field) => {
                    self.identifiers
                        .entry(survivor.clone())
                        .or_default()
                        .insert(field.clone(), rel);
                }
                FieldKey::Implicit(implicit) => {
                    self.implicit
                        .entry(survivor.clone())
                        .or_default()
                        .insert(implicit.clone(), rel);
                }
            }
            self.mark_changed(survivor, &key);
        }
        // Pending reconciliation follows the relationship to its new owner.
        for (owner, _) in &mut self.pending_sync {
            if owner == loser {
                *owner = survivor.clone();
            }
        }
        debug!(loser = loser.lid(), survivor = survivor.lid(), "merged identifier relationships");
        self.dispatch_notifications();
    }

    /// Adds `absorbed`'s members to `survivor.key`, view by view.
    fn absorb_members(
        &mut self,
        survivor: &RecordIdentifier,
        key: &FieldKey,
        inverse_key: &FieldKey,
        absorbed: &Relationship,
    ) {
        let Some(rel) = self.relationship_mut(survivor, key) else {
            return;
        };
        let to_one = rel.definition().kind == EdgeKind::BelongsTo;
        let mut displaced_remote = Vec::new();
        let mut remote_changed = false;
        for member in absorbed.remote_members() {
            if to_one && !rel.remote_members().is_empty() && !rel.has_remote(&member) {
                displaced_remote.push(member);
            } else {
                remote_changed |= rel.add_remote(&member).changed();
            }
        }
        let mut displaced_local = Vec::new();
        for member in absorbed.local_members() {
            if to_one && !rel.local_members().is_empty() && !rel.has_local(&member) {
                displaced_local.push(member);
            } else {
                rel.add_local(&member, None);
            }
        }
        for member in &displaced_remote {
            self.remove_remote_member(member, inverse_key, survivor);
        }
        for member in &displaced_local {
            let released = self
                .relationship_mut(member, inverse_key)
                .is_some_and(|partner| partner.remove_local(survivor));
            if released {
                self.mark_changed(member, inverse_key);
            }
        }
        // Local-only edges stay as they are until canonical data moves.
        if remote_changed {
            self.flush_canonical_later(survivor, key);
        }
        self.mark_changed(survivor, key);
    }

    fn keys_of(&self, identifier: &RecordIdentifier) -> Vec<FieldKey> {
        let named = self
            .identifiers
            .get(identifier)
            .into_iter()
            .flat_map(|bag| bag.keys().cloned().map(FieldKey::Named));
        let implicit = self
            .implicit
            .get(identifier)
            .into_iter()
            .flat_map(|bag| bag.keys().cloned().map(FieldKey::Implicit));
        named.chain(implicit).collect()
    }
}
