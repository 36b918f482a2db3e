// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use warpdrive_core::{NotificationBucket, RecordState, RelationshipState, StoreError};
use warpdrive_dry_tests::{ResourceBuilder, StoreTestBuilder};

use common::{local_one, push_one};

#[test]
fn unloading_a_sync_belongs_to_target_clears_the_owner_at_once() {
    let mut harness = StoreTestBuilder::new().build();
    let post = push_one(&mut harness, ResourceBuilder::new("post", "1").to_many("comments", &["1"]));
    harness.flush().unwrap();
    let comment = common::identifier(&mut harness, "comment", "1");
    assert_eq!(local_one(&mut harness, &comment, "post"), Some(post.clone()));
    harness.notifier.take();

    harness.store.unload_record(&post).unwrap();

    assert_eq!(local_one(&mut harness, &comment, "post"), None);
    assert!(harness.remote(&comment, "post").unwrap().is_empty());
    assert!(!harness.store.identifier_cache().contains(&post), "nothing references the post");
    assert_eq!(harness.notifier.count_field(&comment, "post"), 1);
    assert_eq!(harness.notifier.count_for(&post, NotificationBucket::Removed), 1);
}

#[test]
fn unloading_an_async_member_keeps_it_until_refetched() {
    let mut harness = StoreTestBuilder::new().build();
    let user = push_one(&mut harness, ResourceBuilder::new("user", "1").to_many("posts", &["1"]));
    let post = push_one(&mut harness, ResourceBuilder::new("post", "1").to_one("author", Some("1")));
    harness.flush().unwrap();
    assert_eq!(harness.local(&user, "posts").unwrap(), vec![post.clone()]);

    harness.store.unload_record(&post).unwrap();

    assert_eq!(harness.local(&user, "posts").unwrap(), vec![post.clone()]);
    let flags = *harness.store.graph_mut().get(&user, "posts").unwrap().flags();
    assert!(flags.has_dematerialized_inverse);
    assert!(harness.store.is_dematerialized(&post));
    assert!(harness.store.identifier_cache().contains(&post), "still referenced");
    assert!(!harness.store.records().contains(&post));

    push_one(&mut harness, ResourceBuilder::new("user", "1").to_many("posts", &[]));
    harness.flush().unwrap();

    assert!(harness.local(&user, "posts").unwrap().is_empty());
    let flags = *harness.store.graph_mut().get(&user, "posts").unwrap().flags();
    assert!(!flags.has_dematerialized_inverse);
    assert!(!harness.store.is_dematerialized(&post));
    assert!(!harness.store.identifier_cache().contains(&post), "released once unreferenced");
}

#[test]
fn repushing_a_dematerialized_record_rematerializes_it() {
    let mut harness = StoreTestBuilder::new().build();
    let user = push_one(&mut harness, ResourceBuilder::new("user", "1").to_many("posts", &["1"]));
    let post = push_one(&mut harness, ResourceBuilder::new("post", "1").attr("title", "A"));
    harness.flush().unwrap();
    harness.store.unload_record(&post).unwrap();

    let again = push_one(&mut harness, ResourceBuilder::new("post", "1").attr("title", "A"));
    harness.flush().unwrap();

    assert!(again.ptr_eq(&post), "the referenced identifier is reused");
    assert!(!harness.store.is_dematerialized(&post));
    assert!(harness.store.identifier_cache().contains(&post));
    assert_eq!(harness.local(&user, "posts").unwrap(), vec![post]);
}

#[test]
fn unloading_a_new_async_member_removes_it() {
    let mut harness = StoreTestBuilder::new().build();
    let user = push_one(&mut harness, ResourceBuilder::new("user", "1").to_many("posts", &[]));
    harness.flush().unwrap();
    let draft = harness
        .store
        .create_record("post", None, serde_json::Map::new())
        .unwrap();
    harness.store.add_to_relationship(&user, "posts", &[draft.clone()], None).unwrap();
    assert_eq!(local_one(&mut harness, &draft, "author"), Some(user.clone()));

    harness.store.unload_record(&draft).unwrap();

    assert!(harness.local(&user, "posts").unwrap().is_empty());
    assert!(!harness.store.identifier_cache().contains(&draft));
}

#[test]
fn unload_with_save_in_flight_is_refused_without_mutation() {
    let mut harness = StoreTestBuilder::new().build();
    let post = push_one(&mut harness, ResourceBuilder::new("post", "1").to_many("comments", &["1", "2"]));
    harness.flush().unwrap();
    let before = harness.local(&post, "comments").unwrap();
    harness.store.will_commit(&post).unwrap();
    harness.notifier.take();

    let err = harness.store.unload_record(&post).unwrap_err();

    assert!(matches!(err, StoreError::UnloadInFlight { .. }));
    assert_eq!(harness.local(&post, "comments").unwrap(), before);
    for comment in &before {
        assert_eq!(local_one(&mut harness, comment, "post"), Some(post.clone()));
    }
    assert!(harness.notifier.is_empty());
    assert_eq!(
        harness.store.records().state(&post),
        Some(RecordState::InFlight { was_new: false })
    );

    harness.store.did_commit(&post, None).unwrap();
    harness.store.unload_record(&post).unwrap();
    assert!(!harness.store.records().contains(&post));
}
