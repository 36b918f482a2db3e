// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};

use warpdrive_core::{
    IdentifierCache, NotificationBucket, RecordIdentifier, Resource, ResourcePointer,
};
use warpdrive_dry_tests::{document, ResourceBuilder, SecondaryKeyHooks, StoreTestBuilder};

use common::push_one;

#[test]
fn identical_pushes_yield_one_identifier_and_one_notification_cycle() {
    let mut harness = StoreTestBuilder::new().build();
    let user = || ResourceBuilder::new("user", "1").attr("name", "Chris");

    let first = push_one(&mut harness, user());
    let cycle = harness.notifier.take();
    assert_eq!(
        cycle.iter().map(|n| n.bucket).collect::<Vec<_>>(),
        vec![NotificationBucket::Added, NotificationBucket::Attributes]
    );

    let second = push_one(&mut harness, user());
    assert!(first.ptr_eq(&second));
    assert!(harness.notifier.is_empty(), "nothing changed on the second push");
    assert_eq!(harness.store.records().len(), 1);
    assert_eq!(harness.store.identifier_cache().len(), 1);
}

fn secondary_harness() -> (warpdrive_dry_tests::StoreHarness, SecondaryKeyHooks) {
    let hooks = SecondaryKeyHooks::new("username");
    let harness = StoreTestBuilder::new().with_hooks(hooks.hooks()).build();
    (harness, hooks)
}

fn lookup_by_username(username: &str) -> Resource {
    ResourceBuilder::without_id("user")
        .attr("username", username)
        .build()
}

fn payload() -> ResourceBuilder {
    ResourceBuilder::new("user", "1")
        .attr("username", "@runspired")
        .attr("name", "Chris")
}

#[test]
fn racing_lookups_settle_on_one_identifier_when_secondary_resolves_last() {
    let (mut harness, hooks) = secondary_harness();
    let by_secondary = harness.store.identifier_for(&lookup_by_username("@runspired")).unwrap();
    let by_primary = harness.store.identifier_for(&Resource::new("user", Some("1"))).unwrap();
    assert!(!by_secondary.ptr_eq(&by_primary), "two lookups in flight, two identifiers");

    let primary = harness.store.fulfill(&by_primary, document(payload())).unwrap();
    let secondary = harness.store.fulfill(&by_secondary, document(payload())).unwrap();

    assert!(primary.ptr_eq(&secondary));
    assert!(primary.ptr_eq(&by_primary));
    assert_eq!(hooks.counters().forgotten(), vec![by_secondary.lid().to_owned()]);
    assert_eq!(harness.store.identifier_cache().len(), 1);
    assert_eq!(harness.store.records().len(), 1);
    assert_eq!(hooks.resolved("@runspired").as_deref(), Some("user:1"));
}

#[test]
fn racing_lookups_settle_on_one_identifier_when_secondary_resolves_first() {
    let (mut harness, hooks) = secondary_harness();
    let by_secondary = harness.store.identifier_for(&lookup_by_username("@runspired")).unwrap();
    let by_primary = harness.store.identifier_for(&Resource::new("user", Some("1"))).unwrap();

    let secondary = harness.store.fulfill(&by_secondary, document(payload())).unwrap();
    let primary = harness.store.fulfill(&by_primary, document(payload())).unwrap();

    assert!(primary.ptr_eq(&secondary));
    assert_eq!(hooks.counters().forgotten().len(), 1);
    assert_eq!(harness.store.identifier_cache().len(), 1);
    assert_eq!(harness.store.records().len(), 1);

    let later = harness.store.identifier_for(&lookup_by_username("@runspired")).unwrap();
    assert!(later.ptr_eq(&primary), "learned secondary key resolves to the survivor");
    assert!(
        harness
            .store
            .identifier_cache()
            .peek_lid(by_secondary.lid())
            .is_some_and(|live| live.ptr_eq(&primary)),
        "abandoned lid aliases the survivor"
    );
}

#[test]
fn secondary_lookup_alone_gains_the_id_without_merging() {
    let (mut harness, hooks) = secondary_harness();
    let by_secondary = harness.store.identifier_for(&lookup_by_username("@runspired")).unwrap();
    let settled = harness.store.fulfill(&by_secondary, document(payload())).unwrap();
    assert!(settled.ptr_eq(&by_secondary));
    assert_eq!(settled.id(), Some("1"));
    assert!(hooks.counters().forgotten().is_empty());

    let by_primary = harness.store.identifier_for(&Resource::new("user", Some("1"))).unwrap();
    assert!(by_primary.ptr_eq(&settled));
}

#[test]
fn merge_carries_relationships_to_the_survivor() {
    let (mut harness, _) = secondary_harness();
    let by_secondary = harness.store.identifier_for(&lookup_by_username("@runspired")).unwrap();
    let post = push_one(
        &mut harness,
        ResourceBuilder::new("post", "1").relationship(
            "author",
            warpdrive_core::RelationshipPayload::with_data(warpdrive_core::RelationshipData::ToOne(
                ResourcePointer {
                    resource_type: Some("user".into()),
                    id: None,
                    lid: Some(by_secondary.lid().to_owned()),
                },
            )),
        ),
    );
    harness.flush().unwrap();
    let by_primary = harness.store.identifier_for(&Resource::new("user", Some("1"))).unwrap();
    harness.store.fulfill(&by_primary, document(payload())).unwrap();
    let survivor = harness.store.fulfill(&by_secondary, document(payload())).unwrap();
    harness.flush().unwrap();

    assert!(survivor.ptr_eq(&by_primary));
    assert_eq!(common::local_one(&mut harness, &post, "author"), Some(survivor.clone()));
    assert_eq!(harness.local(&survivor, "posts").unwrap(), vec![post]);
}

#[test]
fn merge_keeps_canonical_edges_learned_through_both_lookups() {
    let (mut harness, _) = secondary_harness();
    let by_secondary = harness.store.identifier_for(&lookup_by_username("@runspired")).unwrap();
    let by_primary = harness.store.identifier_for(&Resource::new("user", Some("1"))).unwrap();
    let written_by_secondary = push_one(
        &mut harness,
        ResourceBuilder::new("post", "1").relationship(
            "author",
            warpdrive_core::RelationshipPayload::with_data(warpdrive_core::RelationshipData::ToOne(
                ResourcePointer {
                    resource_type: Some("user".into()),
                    id: None,
                    lid: Some(by_secondary.lid().to_owned()),
                },
            )),
        ),
    );
    let written_by_primary = push_one(
        &mut harness,
        ResourceBuilder::new("post", "2").to_one("author", Some("1")),
    );
    harness.flush().unwrap();

    harness.store.fulfill(&by_primary, document(payload())).unwrap();
    let survivor = harness.store.fulfill(&by_secondary, document(payload())).unwrap();
    harness.flush().unwrap();

    assert!(survivor.ptr_eq(&by_primary));
    for post in [&written_by_secondary, &written_by_primary] {
        assert_eq!(common::local_one(&mut harness, post, "author"), Some(survivor.clone()));
        assert_eq!(
            harness.remote(post, "author").unwrap(),
            vec![survivor.clone()],
            "server-confirmed author survives the merge"
        );
    }
    assert_eq!(
        harness.remote(&survivor, "posts").unwrap(),
        vec![written_by_primary.clone(), written_by_secondary.clone()]
    );
    assert_eq!(
        harness.local(&survivor, "posts").unwrap(),
        vec![written_by_primary, written_by_secondary]
    );
}

#[test]
fn forgetting_then_rederiving_yields_a_distinct_instance() {
    let mut cache = IdentifierCache::default();
    let resource = Resource::new("user", Some("1"));
    let first = cache.get_or_create_record_identifier(&resource).unwrap();
    assert!(cache
        .get_or_create_record_identifier(&first)
        .unwrap()
        .ptr_eq(&first));
    assert!(cache.forget_record_identifier(&first));
    let second = cache.get_or_create_record_identifier(&resource).unwrap();
    assert!(!second.ptr_eq(&first));
    assert_eq!(second.lid(), first.lid());
}

#[derive(Clone, Debug)]
enum Shape {
    Resource,
    Pointer,
    TypedLid,
    LidAndId,
}

fn lookup(cache: &mut IdentifierCache, shape: &Shape, n: u8) -> RecordIdentifier {
    let id = n.to_string();
    let lid = format!("@lid:user-{n}");
    match shape {
        Shape::Resource => cache.get_or_create_record_identifier(&Resource::new("user", Some(&id))),
        Shape::Pointer => cache.get_or_create_record_identifier(&ResourcePointer::new("user", &id)),
        Shape::TypedLid => cache.get_or_create_record_identifier(&ResourcePointer {
            resource_type: Some("user".into()),
            id: None,
            lid: Some(lid),
        }),
        Shape::LidAndId => {
            let mut resource = Resource::new("user", Some(&id));
            resource.lid = Some(lid);
            cache.get_or_create_record_identifier(&resource)
        }
    }
    .unwrap()
}

#[test]
fn payloads_mapping_to_one_lid_resolve_to_one_instance_in_any_order() {
    const SEED_BYTES: [u8; 32] = [
        0x1d, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0,
    ];
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    let mut runner = TestRunner::new_with_rng(PropConfig::default(), rng);

    let shapes = [Shape::Resource, Shape::Pointer, Shape::TypedLid, Shape::LidAndId];
    let lookups: Vec<(Shape, u8)> = (0..3u8)
        .flat_map(|n| shapes.iter().cloned().map(move |shape| (shape, n)))
        .collect();
    let strategy = Just(lookups).prop_shuffle();

    runner
        .run(&strategy, |order| {
            let mut cache = IdentifierCache::default();
            let mut seen: Vec<Option<RecordIdentifier>> = vec![None; 3];
            for (shape, n) in &order {
                let found = lookup(&mut cache, shape, *n);
                let slot = &mut seen[usize::from(*n)];
                match slot {
                    Some(first) => prop_assert!(first.ptr_eq(&found), "{shape:?} for {n} diverged"),
                    None => *slot = Some(found),
                }
            }
            prop_assert_eq!(cache.len(), 3);
            Ok(())
        })
        .unwrap();
}
