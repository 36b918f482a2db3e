// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Resource and document builders.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use warpdrive_core::{
    Document, Link, Links, PrimaryData, RelationshipData, RelationshipPayload, Resource,
    ResourcePointer,
};

/// Pointer to `type:id`.
pub fn pointer(resource_type: &str, id: &str) -> ResourcePointer {
    ResourcePointer::new(resource_type, id)
}

/// Single-resource document.
pub fn document(resource: ResourceBuilder) -> Document {
    Document::single(resource.build())
}

/// Collection document.
pub fn documents(resources: impl IntoIterator<Item = ResourceBuilder>) -> Document {
    Document {
        data: Some(PrimaryData::Many(
            resources.into_iter().map(ResourceBuilder::build).collect(),
        )),
        ..Document::default()
    }
}

/// Builder for [`Resource`] payloads.
///
/// # Example
///
/// ```
/// use warpdrive_dry_tests::ResourceBuilder;
///
/// let post = ResourceBuilder::new("post", "1")
///     .attr("title", "Hello")
///     .to_many("comments", &["c1", "c2"])
///     .build();
/// assert_eq!(post.relationships.map(|r| r.len()), Some(1));
/// ```
#[derive(Clone, Debug)]
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    /// Resource `type:id`.
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            resource: Resource::new(resource_type, Some(id)),
        }
    }

    /// Resource of `resource_type` with no id.
    pub fn without_id(resource_type: &str) -> Self {
        Self {
            resource: Resource::new(resource_type, None),
        }
    }

    /// Sets the lid.
    pub fn lid(mut self, lid: &str) -> Self {
        self.resource.lid = Some(lid.to_owned());
        self
    }

    /// Sets one attribute.
    pub fn attr(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.resource
            .attributes
            .get_or_insert_with(Map::new)
            .insert(name.to_owned(), value.into());
        self
    }

    /// To-many linkage to ids of the field's default related type.
    pub fn to_many(self, field: &str, ids: &[&str]) -> Self {
        let related = related_type(field);
        let pointers = ids.iter().map(|id| pointer(&related, id)).collect();
        self.relationship(field, RelationshipPayload::with_data(RelationshipData::ToMany(pointers)))
    }

    /// To-one linkage to an id of the field's default related type, or
    /// `null`.
    pub fn to_one(self, field: &str, id: Option<&str>) -> Self {
        let related = related_type(field);
        let data = id.map_or(RelationshipData::Null, |id| {
            RelationshipData::ToOne(pointer(&related, id))
        });
        self.relationship(field, RelationshipPayload::with_data(data))
    }

    /// Relationship carrying only a `related` link.
    pub fn related_link(self, field: &str, href: &str) -> Self {
        let payload = RelationshipPayload {
            links: Some(Links {
                related: Some(Link::Href(href.to_owned())),
                ..Links::default()
            }),
            ..RelationshipPayload::default()
        };
        self.relationship(field, payload)
    }

    /// Sets a raw relationship payload.
    pub fn relationship(mut self, field: &str, payload: RelationshipPayload) -> Self {
        self.resource
            .relationships
            .get_or_insert_with(BTreeMap::new)
            .insert(field.to_owned(), payload);
        self
    }

    /// Finished resource.
    pub fn build(self) -> Resource {
        self.resource
    }
}

/// Related type of a [`blog_schema`](crate::blog_schema) field: the
/// field name, singularized, unless the field is known to point elsewhere.
fn related_type(field: &str) -> String {
    match field {
        "author" | "best_friend" => "user".to_owned(),
        other => other.trim_end_matches('s').to_owned(),
    }
}
