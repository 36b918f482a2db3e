// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical fixture schemas.

use warpdrive_core::{RelationshipSchema, SchemaRegistry};

/// A small blog exercising every edge shape the graph supports.
///
/// | owner | field | kind | related | notes |
/// |-------|-------|------|---------|-------|
/// | `post` | `comments` | has-many | `comment` | sync, inverse inferred as `comment.post` |
/// | `post` | `author` | belongs-to | `user` | sync, inverse `user.posts` |
/// | `post` | `tags` | has-many | `tag` | no inverse (implicit) |
/// | `post` | `reactions` | has-many | `reaction` | sync, inverse `target`, as `reactable` |
/// | `comment` | `post` | belongs-to | `post` | sync |
/// | `user` | `posts` | has-many | `post` | async |
/// | `user` | `best_friend` | belongs-to | `user` | sync, reflexive |
/// | `reaction` | `target` | belongs-to | `reactable` | polymorphic |
pub fn blog_schema() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_type(
            "post",
            [
                RelationshipSchema::has_many("comments", "comment").with_async(false),
                RelationshipSchema::belongs_to("author", "user")
                    .with_async(false)
                    .with_inverse("posts"),
                RelationshipSchema::has_many("tags", "tag").with_no_inverse(),
                RelationshipSchema::has_many("reactions", "reaction")
                    .with_async(false)
                    .with_inverse("target")
                    .with_as("reactable"),
            ],
        )
        .with_type(
            "comment",
            [RelationshipSchema::belongs_to("post", "post").with_async(false)],
        )
        .with_type(
            "user",
            [
                RelationshipSchema::has_many("posts", "post")
                    .with_async(true)
                    .with_inverse("author"),
                RelationshipSchema::belongs_to("best_friend", "user")
                    .with_async(false)
                    .with_inverse("best_friend"),
            ],
        )
        .with_type("tag", [])
        .with_type(
            "reaction",
            [RelationshipSchema::belongs_to("target", "reactable")
                .with_async(false)
                .with_polymorphic(true)
                .with_inverse("reactions")],
        )
}
