// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-record lifecycle state and attribute values.
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};

use crate::ident::RecordIdentifier;
use crate::relationship::RecordLifecycle;

/// Where a record is in its save lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordState {
    /// Created on the client and never persisted.
    New,
    /// Known to the server.
    Loaded,
    /// A save is in flight.
    InFlight {
        /// The record was [`RecordState::New`] when the save started.
        was_new: bool,
    },
}

/// One cached record.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordEntry {
    /// Lifecycle state.
    pub state: RecordState,
    /// Attribute values by name.
    pub attributes: Map<String, Value>,
}

impl RecordEntry {
    fn new(state: RecordState) -> Self {
        Self {
            state,
            attributes: Map::new(),
        }
    }
}

/// Records currently materialized, keyed by identifier.
#[derive(Clone, Debug, Default)]
pub struct RecordCache {
    records: FxHashMap<RecordIdentifier, RecordEntry>,
}

impl RecordCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no record is cached.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns `true` if `identifier` has a record.
    pub fn contains(&self, identifier: &RecordIdentifier) -> bool {
        self.records.contains_key(identifier)
    }

    /// Entry for `identifier`.
    pub fn get(&self, identifier: &RecordIdentifier) -> Option<&RecordEntry> {
        self.records.get(identifier)
    }

    /// Lifecycle state for `identifier`.
    pub fn state(&self, identifier: &RecordIdentifier) -> Option<RecordState> {
        self.records.get(identifier).map(|entry| entry.state)
    }

    /// Inserts a client-created record.
    pub fn insert_new(&mut self, identifier: &RecordIdentifier, attributes: Map<String, Value>) {
        self.records.insert(
            identifier.clone(),
            RecordEntry {
                state: RecordState::New,
                attributes,
            },
        );
    }

    /// Entry for server data about `identifier`, created as
    /// [`RecordState::Loaded`] if absent. The flag reports creation.
    ///
    /// An existing `New` record becomes `Loaded`; an in-flight record keeps
    /// its state until the save settles.
    pub fn upsert_loaded(&mut self, identifier: &RecordIdentifier) -> (&mut RecordEntry, bool) {
        let mut created = false;
        let entry = self.records.entry(identifier.clone()).or_insert_with(|| {
            created = true;
            RecordEntry::new(RecordState::Loaded)
        });
        if entry.state == RecordState::New {
            entry.state = RecordState::Loaded;
        }
        (entry, created)
    }

    /// Writes `attributes`, returning the names whose value changed.
    pub fn apply_attributes(
        &mut self,
        identifier: &RecordIdentifier,
        attributes: &Map<String, Value>,
    ) -> Vec<String> {
        let Some(entry) = self.records.get_mut(identifier) else {
            return Vec::new();
        };
        let mut changed = Vec::new();
        for (name, value) in attributes {
            if entry.attributes.get(name) != Some(value) {
                entry.attributes.insert(name.clone(), value.clone());
                changed.push(name.clone());
            }
        }
        changed
    }

    /// Moves to [`RecordState::InFlight`]. Returns `false` if there is no
    /// record or it is already in flight.
    pub fn will_commit(&mut self, identifier: &RecordIdentifier) -> bool {
        let Some(entry) = self.records.get_mut(identifier) else {
            return false;
        };
        entry.state = match entry.state {
            RecordState::New => RecordState::InFlight { was_new: true },
            RecordState::Loaded => RecordState::InFlight { was_new: false },
            RecordState::InFlight { .. } => return false,
        };
        true
    }

    /// Settles an in-flight save. Accepted saves end `Loaded`; rejected
    /// saves return to the state they started from. Returns `false` if the
    /// record was not in flight.
    pub fn settle(&mut self, identifier: &RecordIdentifier, accepted: bool) -> bool {
        let Some(entry) = self.records.get_mut(identifier) else {
            return false;
        };
        let RecordState::InFlight { was_new } = entry.state else {
            return false;
        };
        entry.state = if was_new && !accepted {
            RecordState::New
        } else {
            RecordState::Loaded
        };
        true
    }

    /// Moves `loser`'s record to `survivor` unless the survivor already has
    /// one, in which case the loser's record is dropped.
    pub fn rekey(&mut self, loser: &RecordIdentifier, survivor: &RecordIdentifier) {
        if let Some(entry) = self.records.remove(loser) {
            self.records.entry(survivor.clone()).or_insert(entry);
        }
    }

    /// Drops the record for `identifier`.
    pub fn remove(&mut self, identifier: &RecordIdentifier) -> Option<RecordEntry> {
        self.records.remove(identifier)
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl RecordLifecycle for RecordCache {
    fn is_new(&self, identifier: &RecordIdentifier) -> bool {
        matches!(
            self.state(identifier),
            Some(RecordState::New | RecordState::InFlight { was_new: true })
        )
    }

    fn is_in_flight(&self, identifier: &RecordIdentifier) -> bool {
        matches!(self.state(identifier), Some(RecordState::InFlight { .. }))
    }
}
