// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Schema port: the relationship metadata the graph needs from the host.
//!
//! The graph reads schema synchronously and never mutates it. Field options
//! are kept as declared (`Option<bool>` for "not declared"); defaults are
//! applied by the edge resolver, which also reconciles the two sides of an
//! inverse pair.
use rustc_hash::FxHashMap;

/// Relationship cardinality as declared in schema.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RelationshipKind {
    /// To-one.
    BelongsTo,
    /// To-many.
    HasMany,
}

/// Declared `inverse` option.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum InverseOption {
    /// Not declared: the resolver infers it.
    #[default]
    Unspecified,
    /// Declared `null`: one-directional edge.
    None,
    /// Declared field name on the related type.
    Field(String),
}

/// Declared field options.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct RelationshipOptions {
    /// `async` as declared.
    pub is_async: Option<bool>,
    /// `polymorphic` as declared.
    pub polymorphic: Option<bool>,
    /// `inverse` as declared.
    pub inverse: InverseOption,
    /// Abstract type this field's owner satisfies when it is the concrete
    /// side of a polymorphic pair (`as`).
    pub as_type: Option<String>,
}

/// One declared relationship field.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RelationshipSchema {
    /// Field name.
    pub name: String,
    /// Cardinality.
    pub kind: RelationshipKind,
    /// Declared related type (may be abstract for polymorphic fields).
    pub related_type: String,
    /// Declared options.
    pub options: RelationshipOptions,
}

impl RelationshipSchema {
    /// A `belongsTo` field with no options declared.
    pub fn belongs_to(name: &str, related_type: &str) -> Self {
        Self::new(name, RelationshipKind::BelongsTo, related_type)
    }

    /// A `hasMany` field with no options declared.
    pub fn has_many(name: &str, related_type: &str) -> Self {
        Self::new(name, RelationshipKind::HasMany, related_type)
    }

    fn new(name: &str, kind: RelationshipKind, related_type: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            related_type: related_type.to_owned(),
            options: RelationshipOptions::default(),
        }
    }

    /// Declares `async`.
    pub fn with_async(mut self, is_async: bool) -> Self {
        self.options.is_async = Some(is_async);
        self
    }

    /// Declares `polymorphic`.
    pub fn with_polymorphic(mut self, polymorphic: bool) -> Self {
        self.options.polymorphic = Some(polymorphic);
        self
    }

    /// Declares `inverse: <field>`.
    pub fn with_inverse(mut self, field: &str) -> Self {
        self.options.inverse = InverseOption::Field(field.to_owned());
        self
    }

    /// Declares `inverse: null`.
    pub fn with_no_inverse(mut self) -> Self {
        self.options.inverse = InverseOption::None;
        self
    }

    /// Declares `as: <abstract type>`.
    pub fn with_as(mut self, abstract_type: &str) -> Self {
        self.options.as_type = Some(abstract_type.to_owned());
        self
    }
}

/// Schema provider consumed by the edge resolver.
///
/// Implementations must be synchronous and side-effect free.
pub trait SchemaPort {
    /// Returns `true` if `resource_type` is a concrete, known resource type.
    fn has_type(&self, resource_type: &str) -> bool;

    /// Declared relationship `field` on `resource_type`.
    fn relationship(&self, resource_type: &str, field: &str) -> Option<RelationshipSchema>;

    /// All declared relationships of `resource_type`, in declaration order.
    fn relationships(&self, resource_type: &str) -> Vec<RelationshipSchema>;
}

/// In-memory [`SchemaPort`] built up by registration.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    types: FxHashMap<String, Vec<RelationshipSchema>>,
}

impl SchemaRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource_type` with its relationship fields, replacing any
    /// previous registration for the type.
    pub fn register(
        &mut self,
        resource_type: &str,
        fields: impl IntoIterator<Item = RelationshipSchema>,
    ) -> &mut Self {
        self.types
            .insert(resource_type.to_owned(), fields.into_iter().collect());
        self
    }

    /// Builder form of [`SchemaRegistry::register`].
    pub fn with_type(
        mut self,
        resource_type: &str,
        fields: impl IntoIterator<Item = RelationshipSchema>,
    ) -> Self {
        self.register(resource_type, fields);
        self
    }
}

impl SchemaPort for SchemaRegistry {
    fn has_type(&self, resource_type: &str) -> bool {
        self.types.contains_key(resource_type)
    }

    fn relationship(&self, resource_type: &str, field: &str) -> Option<RelationshipSchema> {
        self.types
            .get(resource_type)?
            .iter()
            .find(|rel| rel.name == field)
            .cloned()
    }

    fn relationships(&self, resource_type: &str) -> Vec<RelationshipSchema> {
        self.types.get(resource_type).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn registry_answers_lookups() {
        let schema = SchemaRegistry::new().with_type(
            "post",
            [
                RelationshipSchema::belongs_to("author", "user").with_async(false),
                RelationshipSchema::has_many("comments", "comment").with_inverse("post"),
            ],
        );
        assert!(schema.has_type("post"));
        assert!(!schema.has_type("user"));
        let author = schema.relationship("post", "author").unwrap();
        assert_eq!(author.kind, RelationshipKind::BelongsTo);
        assert_eq!(author.options.is_async, Some(false));
        assert_eq!(author.options.inverse, InverseOption::Unspecified);
        assert_eq!(schema.relationships("post").len(), 2);
        assert!(schema.relationship("post", "missing").is_none());
        assert!(schema.relationships("nope").is_empty());
    }
}
