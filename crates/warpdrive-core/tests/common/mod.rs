// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use warpdrive_core::{RecordIdentifier, Resource};
use warpdrive_dry_tests::{document, ResourceBuilder, StoreHarness};

/// Pushes one resource and returns its identifier.
pub fn push_one(harness: &mut StoreHarness, resource: ResourceBuilder) -> RecordIdentifier {
    let mut ids = harness
        .store
        .push(document(resource))
        .expect("push document");
    assert_eq!(ids.len(), 1, "single-resource document yields one identifier");
    ids.remove(0)
}

/// Identifier for `type:id` without pushing data for it.
pub fn identifier(harness: &mut StoreHarness, resource_type: &str, id: &str) -> RecordIdentifier {
    harness
        .store
        .identifier_for(&Resource::new(resource_type, Some(id)))
        .expect("identifier")
}

/// Local to-one value of `owner.field`.
pub fn local_one(
    harness: &mut StoreHarness,
    owner: &RecordIdentifier,
    field: &str,
) -> Option<RecordIdentifier> {
    harness
        .local(owner, field)
        .expect("relationship")
        .into_iter()
        .next()
}

/// Lids, for readable assertions.
pub fn lids(identifiers: &[RecordIdentifier]) -> Vec<String> {
    identifiers.iter().map(|id| id.lid().to_owned()).collect()
}

