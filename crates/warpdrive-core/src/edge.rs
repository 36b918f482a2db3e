// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Edge definitions: direction-normalized relationship metadata.
//!
//! [`EdgeResolver`] turns declared schema into [`EdgeDefinition`]s and
//! memoizes them per `(type, field)`. Two declarations naming each other
//! resolve to a symmetric pair. A field without a resolvable inverse gets an
//! implicit partner keyed by [`ImplicitKey`] that exists only for
//! bookkeeping.
//!
//! # Async and polymorphic flags
//!
//! Each side of a pair uses its own declaration when present, otherwise the
//! partner's declaration, otherwise the default (`async: true`,
//! `polymorphic: false`). Conflicting declarations are tolerated: each side
//! keeps what it declared.
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::schema::{InverseOption, RelationshipKind, RelationshipSchema, SchemaPort};

/// `async` when neither side declares it.
pub const DEFAULT_ASYNC: bool = true;
/// `polymorphic` when neither side declares it.
pub const DEFAULT_POLYMORPHIC: bool = false;

/// Schema errors surfaced at resolution time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EdgeError {
    /// The field is not declared on the type.
    #[error("`{resource_type}` declares no relationship `{field}`")]
    UnknownField {
        /// Owner type.
        resource_type: String,
        /// Field name.
        field: String,
    },
    /// An explicit inverse was named on a type the schema does not know,
    /// and the field is not polymorphic.
    #[error("`{resource_type}.{field}` relates to unknown type `{related_type}`")]
    UnknownRelatedType {
        /// Owner type.
        resource_type: String,
        /// Field name.
        field: String,
        /// Declared related type.
        related_type: String,
    },
    /// The named inverse field does not exist.
    #[error("`{resource_type}.{field}` names inverse `{related_type}.{inverse}`, which is not declared")]
    InverseNotFound {
        /// Owner type.
        resource_type: String,
        /// Field name.
        field: String,
        /// Related type.
        related_type: String,
        /// Named inverse.
        inverse: String,
    },
    /// The named inverse does not point back.
    #[error("`{resource_type}.{field}` and `{related_type}.{inverse}` are not inverses: {reason}")]
    InverseMismatch {
        /// Owner type.
        resource_type: String,
        /// Field name.
        field: String,
        /// Related type.
        related_type: String,
        /// Named inverse.
        inverse: String,
        /// What disagreed.
        reason: String,
    },
}

/// Structured key of an implicit relationship: the explicit field
/// `owner_type.owner_field` whose targets carry it.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ImplicitKey {
    /// Type declaring the one-directional field.
    pub owner_type: String,
    /// The one-directional field.
    pub owner_field: String,
}

impl ImplicitKey {
    /// Builds a key.
    pub fn new(owner_type: &str, owner_field: &str) -> Self {
        Self {
            owner_type: owner_type.to_owned(),
            owner_field: owner_field.to_owned(),
        }
    }
}

impl fmt::Display for ImplicitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "implicit({}.{})", self.owner_type, self.owner_field)
    }
}

/// Field key of a relationship instance within an identifier's bags.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldKey {
    /// Schema-declared field.
    Named(String),
    /// Synthesized implicit inverse.
    Implicit(ImplicitKey),
}

impl FieldKey {
    /// Declared field name, if this is a named key.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Implicit(_) => None,
        }
    }
}

impl From<&str> for FieldKey {
    fn from(value: &str) -> Self {
        Self::Named(value.to_owned())
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Implicit(key) => key.fmt(f),
        }
    }
}

/// Edge cardinality, including the synthesized implicit kind.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EdgeKind {
    /// To-one.
    BelongsTo,
    /// To-many.
    HasMany,
    /// Bookkeeping-only inverse of a one-directional field.
    Implicit,
}

impl From<RelationshipKind> for EdgeKind {
    fn from(value: RelationshipKind) -> Self {
        match value {
            RelationshipKind::BelongsTo => Self::BelongsTo,
            RelationshipKind::HasMany => Self::HasMany,
        }
    }
}

/// Inverse side of an edge.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Inverse {
    /// A declared field on the related type. `kind`, `is_async` and
    /// `is_polymorphic` are `None` when the related type is abstract; the
    /// concrete member's own definition then decides.
    Explicit {
        /// Inverse field name.
        key: String,
        /// Inverse cardinality.
        kind: Option<EdgeKind>,
        /// Inverse async-ness.
        is_async: Option<bool>,
        /// Inverse polymorphism.
        is_polymorphic: Option<bool>,
    },
    /// Synthesized implicit relationship on the related record.
    Implicit(ImplicitKey),
}

/// Resolved, memoized metadata for one `(type, field)`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EdgeDefinition {
    /// Cardinality.
    pub kind: EdgeKind,
    /// Type owning this field (declared, possibly abstract for implicit
    /// definitions).
    pub owner_type: String,
    /// Field name, or the implicit key label.
    pub key: String,
    /// Related type as declared.
    pub related_type: String,
    /// Resolved async flag.
    pub is_async: bool,
    /// Resolved polymorphic flag.
    pub is_polymorphic: bool,
    /// Inverse side.
    pub inverse: Inverse,
}

impl EdgeDefinition {
    /// Returns `true` for synthesized implicit relationships.
    pub fn is_implicit(&self) -> bool {
        self.kind == EdgeKind::Implicit
    }

    /// Returns `true` when the inverse side is synthesized.
    pub fn inverse_is_implicit(&self) -> bool {
        matches!(self.inverse, Inverse::Implicit(_))
    }

    /// Key of the inverse relationship on a related record.
    pub fn inverse_key(&self) -> FieldKey {
        match &self.inverse {
            Inverse::Explicit { key, .. } => FieldKey::Named(key.clone()),
            Inverse::Implicit(key) => FieldKey::Implicit(key.clone()),
        }
    }

    /// Inverse field name when explicit.
    pub fn inverse_field(&self) -> Option<&str> {
        match &self.inverse {
            Inverse::Explicit { key, .. } => Some(key),
            Inverse::Implicit(_) => None,
        }
    }
}

enum Partner {
    None,
    Abstract(String),
    Declared(RelationshipSchema),
}

/// Memoizing resolver over a [`SchemaPort`].
pub struct EdgeResolver {
    schema: Rc<dyn SchemaPort>,
    explicit: FxHashMap<String, FxHashMap<String, Rc<EdgeDefinition>>>,
    implicit: FxHashMap<ImplicitKey, Rc<EdgeDefinition>>,
}

impl fmt::Debug for EdgeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeResolver")
            .field("explicit", &self.explicit.values().map(FxHashMap::len).sum::<usize>())
            .field("implicit", &self.implicit.len())
            .finish_non_exhaustive()
    }
}

impl EdgeResolver {
    /// Creates a resolver over `schema`.
    pub fn new(schema: Rc<dyn SchemaPort>) -> Self {
        Self {
            schema,
            explicit: FxHashMap::default(),
            implicit: FxHashMap::default(),
        }
    }

    /// The schema this resolver reads.
    pub fn schema(&self) -> &dyn SchemaPort {
        self.schema.as_ref()
    }

    /// Definition for the declared `resource_type.field`.
    pub fn definition(
        &mut self,
        resource_type: &str,
        field: &str,
    ) -> Result<Rc<EdgeDefinition>, EdgeError> {
        if let Some(def) = self
            .explicit
            .get(resource_type)
            .and_then(|fields| fields.get(field))
        {
            return Ok(Rc::clone(def));
        }
        let own = self
            .schema
            .relationship(resource_type, field)
            .ok_or_else(|| EdgeError::UnknownField {
                resource_type: resource_type.to_owned(),
                field: field.to_owned(),
            })?;
        let def = Rc::new(self.resolve(resource_type, &own)?);
        self.explicit
            .entry(resource_type.to_owned())
            .or_default()
            .insert(field.to_owned(), Rc::clone(&def));
        Ok(def)
    }

    /// Definition for the implicit inverse of `key`.
    pub fn implicit_definition(&mut self, key: &ImplicitKey) -> Result<Rc<EdgeDefinition>, EdgeError> {
        if let Some(def) = self.implicit.get(key) {
            return Ok(Rc::clone(def));
        }
        let explicit = self.definition(&key.owner_type, &key.owner_field)?;
        let def = Rc::new(EdgeDefinition {
            kind: EdgeKind::Implicit,
            owner_type: explicit.related_type.clone(),
            key: key.to_string(),
            related_type: key.owner_type.clone(),
            is_async: explicit.is_async,
            is_polymorphic: DEFAULT_POLYMORPHIC,
            inverse: Inverse::Explicit {
                key: key.owner_field.clone(),
                kind: Some(explicit.kind),
                is_async: Some(explicit.is_async),
                is_polymorphic: Some(explicit.is_polymorphic),
            },
        });
        self.implicit.insert(key.clone(), Rc::clone(&def));
        Ok(def)
    }

    /// Definition for either kind of field key.
    pub fn definition_for(
        &mut self,
        resource_type: &str,
        key: &FieldKey,
    ) -> Result<Rc<EdgeDefinition>, EdgeError> {
        match key {
            FieldKey::Named(field) => self.definition(resource_type, field),
            FieldKey::Implicit(key) => self.implicit_definition(key),
        }
    }

    fn resolve(&self, owner_type: &str, own: &RelationshipSchema) -> Result<EdgeDefinition, EdgeError> {
        let partner = match &own.options.inverse {
            InverseOption::None => Partner::None,
            InverseOption::Field(name) => {
                if self.schema.has_type(&own.related_type) {
                    let partner = self
                        .schema
                        .relationship(&own.related_type, name)
                        .ok_or_else(|| EdgeError::InverseNotFound {
                            resource_type: owner_type.to_owned(),
                            field: own.name.clone(),
                            related_type: own.related_type.clone(),
                            inverse: name.clone(),
                        })?;
                    check_partner(owner_type, own, &partner)?;
                    Partner::Declared(partner)
                } else if own.options.polymorphic == Some(true) {
                    Partner::Abstract(name.clone())
                } else {
                    return Err(EdgeError::UnknownRelatedType {
                        resource_type: owner_type.to_owned(),
                        field: own.name.clone(),
                        related_type: own.related_type.clone(),
                    });
                }
            }
            InverseOption::Unspecified => self
                .infer(owner_type, own)
                .map_or(Partner::None, Partner::Declared),
        };

        let declared_async = own.options.is_async;
        let declared_poly = own.options.polymorphic;
        let (is_async, is_polymorphic, inverse) = match partner {
            Partner::None => (
                declared_async.unwrap_or(DEFAULT_ASYNC),
                declared_poly.unwrap_or(DEFAULT_POLYMORPHIC),
                Inverse::Implicit(ImplicitKey::new(owner_type, &own.name)),
            ),
            Partner::Abstract(key) => (
                declared_async.unwrap_or(DEFAULT_ASYNC),
                declared_poly.unwrap_or(DEFAULT_POLYMORPHIC),
                Inverse::Explicit {
                    key,
                    kind: None,
                    is_async: None,
                    is_polymorphic: None,
                },
            ),
            Partner::Declared(partner) => {
                let theirs = &partner.options;
                (
                    pick(declared_async, theirs.is_async, DEFAULT_ASYNC),
                    pick(declared_poly, theirs.polymorphic, DEFAULT_POLYMORPHIC),
                    Inverse::Explicit {
                        key: partner.name.clone(),
                        kind: Some(partner.kind.into()),
                        is_async: Some(pick(theirs.is_async, declared_async, DEFAULT_ASYNC)),
                        is_polymorphic: Some(pick(
                            theirs.polymorphic,
                            declared_poly,
                            DEFAULT_POLYMORPHIC,
                        )),
                    },
                )
            }
        };

        Ok(EdgeDefinition {
            kind: own.kind.into(),
            owner_type: owner_type.to_owned(),
            key: own.name.clone(),
            related_type: own.related_type.clone(),
            is_async,
            is_polymorphic,
            inverse,
        })
    }

    /// Infers the inverse of `own`: exactly one field on the related type
    /// that targets `owner_type`, and whose own inference lands back on
    /// `own`.
    fn infer(&self, owner_type: &str, own: &RelationshipSchema) -> Option<RelationshipSchema> {
        if !self.schema.has_type(&own.related_type) {
            return None;
        }
        let candidates = self.candidates(&own.related_type, owner_type, &own.name);
        let [candidate] = candidates.as_slice() else {
            return None;
        };
        let symmetric = match &candidate.options.inverse {
            InverseOption::Field(back) => *back == own.name,
            InverseOption::Unspecified => {
                let back = self.candidates(owner_type, &own.related_type, &candidate.name);
                matches!(back.as_slice(), [only] if only.name == own.name)
            }
            InverseOption::None => false,
        };
        symmetric.then(|| candidate.clone())
    }

    fn candidates(&self, scan_type: &str, target_type: &str, origin_field: &str) -> Vec<RelationshipSchema> {
        self.schema
            .relationships(scan_type)
            .into_iter()
            .filter(|field| field.related_type == target_type)
            .filter(|field| match &field.options.inverse {
                InverseOption::Unspecified => true,
                InverseOption::Field(name) => name == origin_field,
                InverseOption::None => false,
            })
            .collect()
    }
}

fn pick(own: Option<bool>, partner: Option<bool>, default: bool) -> bool {
    own.or(partner).unwrap_or(default)
}

fn check_partner(
    owner_type: &str,
    own: &RelationshipSchema,
    partner: &RelationshipSchema,
) -> Result<(), EdgeError> {
    let mismatch = |reason: String| EdgeError::InverseMismatch {
        resource_type: owner_type.to_owned(),
        field: own.name.clone(),
        related_type: own.related_type.clone(),
        inverse: partner.name.clone(),
        reason,
    };
    match &partner.options.inverse {
        InverseOption::None => {
            return Err(mismatch("the inverse declares `inverse: null`".to_owned()));
        }
        InverseOption::Field(back) if *back != own.name => {
            return Err(mismatch(format!("the inverse points back at `{back}`")));
        }
        _ => {}
    }
    if partner.related_type == owner_type {
        return Ok(());
    }
    let polymorphic = pick(partner.options.polymorphic, own.options.polymorphic, false);
    let as_matches = own
        .options
        .as_type
        .as_ref()
        .is_none_or(|abstract_type| *abstract_type == partner.related_type);
    if polymorphic && as_matches {
        Ok(())
    } else {
        Err(mismatch(format!(
            "the inverse relates to `{}`, not `{owner_type}`",
            partner.related_type
        )))
    }
}
