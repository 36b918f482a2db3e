// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};

use warpdrive_core::{RecordIdentifier, RelationshipState};
use warpdrive_dry_tests::{document, ResourceBuilder, StoreHarness, StoreTestBuilder};

const POSTS: u8 = 3;
const COMMENTS: u8 = 4;

#[derive(Clone, Debug)]
enum Op {
    PushComments { post: u8, comments: Vec<u8> },
    PushPost { comment: u8, post: Option<u8> },
    AddLocal { post: u8, comment: u8 },
    RemoveLocal { post: u8, comment: u8 },
    SetLocal { comment: u8, post: Option<u8> },
    Flush,
}

fn op() -> impl Strategy<Value = Op> {
    let post = 0..POSTS;
    let comment = 0..COMMENTS;
    prop_oneof![
        (post.clone(), prop::collection::vec(comment.clone(), 0..4))
            .prop_map(|(post, comments)| Op::PushComments { post, comments }),
        (comment.clone(), prop::option::of(post.clone()))
            .prop_map(|(comment, post)| Op::PushPost { comment, post }),
        (post.clone(), comment.clone()).prop_map(|(post, comment)| Op::AddLocal { post, comment }),
        (post.clone(), comment.clone())
            .prop_map(|(post, comment)| Op::RemoveLocal { post, comment }),
        (comment, prop::option::of(post)).prop_map(|(comment, post)| Op::SetLocal { comment, post }),
        Just(Op::Flush),
    ]
}

struct World {
    harness: StoreHarness,
    posts: Vec<RecordIdentifier>,
    comments: Vec<RecordIdentifier>,
}

impl World {
    fn new() -> Self {
        let mut harness = StoreTestBuilder::new().build();
        let posts = (1..=POSTS)
            .map(|n| common::identifier(&mut harness, "post", &n.to_string()))
            .collect();
        let comments = (1..=COMMENTS)
            .map(|n| common::identifier(&mut harness, "comment", &n.to_string()))
            .collect();
        Self {
            harness,
            posts,
            comments,
        }
    }

    fn apply(&mut self, op: &Op) {
        let store = &mut self.harness.store;
        let post = |n: u8| self.posts[usize::from(n)].clone();
        let comment = |n: u8| self.comments[usize::from(n)].clone();
        match op {
            Op::PushComments { post: p, comments } => {
                let ids: Vec<String> = comments.iter().map(|c| (c + 1).to_string()).collect();
                let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                store
                    .push(document(
                        ResourceBuilder::new("post", &(p + 1).to_string()).to_many("comments", &ids),
                    ))
                    .unwrap();
            }
            Op::PushPost { comment: c, post: p } => {
                let id = p.map(|p| (p + 1).to_string());
                store
                    .push(document(
                        ResourceBuilder::new("comment", &(c + 1).to_string())
                            .to_one("post", id.as_deref()),
                    ))
                    .unwrap();
            }
            Op::AddLocal { post: p, comment: c } => store
                .add_to_relationship(&post(*p), "comments", &[comment(*c)], None)
                .unwrap(),
            Op::RemoveLocal { post: p, comment: c } => store
                .remove_from_relationship(&post(*p), "comments", &[comment(*c)])
                .unwrap(),
            Op::SetLocal { comment: c, post: p } => {
                let target = p.map(post);
                store
                    .set_belongs_to(&comment(*c), "post", target.as_ref())
                    .unwrap();
            }
            Op::Flush => store.flush().unwrap(),
        }
    }

    fn check_symmetry(&mut self) -> Result<(), TestCaseError> {
        prop_assert!(!self.harness.store.has_pending_flush());
        for post in self.posts.clone() {
            let local = self.harness.local(&post, "comments").unwrap();
            let remote = self.harness.remote(&post, "comments").unwrap();
            let flags = *self.harness.store.graph_mut().get(&post, "comments").unwrap().flags();
            prop_assert!(!flags.will_sync);
            for comment in self.comments.clone() {
                let back_local = self.harness.local(&comment, "post").unwrap();
                let back_remote = self.harness.remote(&comment, "post").unwrap();
                prop_assert_eq!(
                    local.contains(&comment),
                    back_local.first() == Some(&post),
                    "local {} <-> {}",
                    post.lid(),
                    comment.lid()
                );
                prop_assert_eq!(
                    remote.contains(&comment),
                    back_remote.first() == Some(&post),
                    "remote {} <-> {}",
                    post.lid(),
                    comment.lid()
                );
            }
        }
        for comment in self.comments.clone() {
            let flags = *self.harness.store.graph_mut().get(&comment, "post").unwrap().flags();
            prop_assert!(!flags.will_sync);
        }
        Ok(())
    }
}

#[test]
fn inverse_edges_stay_symmetric_at_quiescence() {
    const SEED_BYTES: [u8; 32] = [
        0x5e, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0,
    ];
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    let mut runner = TestRunner::new_with_rng(PropConfig::default(), rng);

    runner
        .run(&prop::collection::vec(op(), 1..24), |ops| {
            let mut world = World::new();
            for op in &ops {
                world.apply(op);
            }
            world.harness.flush().unwrap();
            world.check_symmetry()
        })
        .unwrap();
}

#[test]
fn local_edits_are_symmetric_without_a_flush() {
    let mut world = World::new();
    world.apply(&Op::PushComments { post: 0, comments: vec![0, 1] });
    world.apply(&Op::Flush);
    world.apply(&Op::AddLocal { post: 1, comment: 0 });
    world.apply(&Op::SetLocal { comment: 1, post: Some(2) });
    world.apply(&Op::RemoveLocal { post: 2, comment: 3 });

    let (p0, p1, p2) = (world.posts[0].clone(), world.posts[1].clone(), world.posts[2].clone());
    let (c0, c1) = (world.comments[0].clone(), world.comments[1].clone());
    assert!(world.harness.local(&p0, "comments").unwrap().is_empty());
    assert_eq!(world.harness.local(&p1, "comments").unwrap(), vec![c0.clone()]);
    assert_eq!(world.harness.local(&p2, "comments").unwrap(), vec![c1.clone()]);
    assert_eq!(common::local_one(&mut world.harness, &c0, "post"), Some(p1));
    assert_eq!(common::local_one(&mut world.harness, &c1, "post"), Some(p2));
    assert_eq!(world.harness.remote(&p0, "comments").unwrap(), vec![c0, c1], "canonical untouched");
}
