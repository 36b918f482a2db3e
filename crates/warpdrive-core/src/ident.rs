// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Record and document identifiers.
//!
//! A [`RecordIdentifier`] is the public handle for one logical entity. Handles
//! are cheap to clone and compare by referential identity: two handles are
//! equal only when they were produced by the same creation inside an
//! [`IdentifierCache`](crate::IdentifierCache). Field-wise equality is never
//! used, so a forgotten identifier and its re-derived replacement are distinct
//! even when `type`, `id` and `lid` coincide.
use std::cell::OnceCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Namespace an identifier lookup belongs to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum IdentifierBucket {
    /// Record identifiers (`{type, id, lid}`).
    Record,
    /// Request/document identifiers keyed by cache key.
    Document,
}

impl IdentifierBucket {
    /// Stable lowercase label, matching the payload vocabulary.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Document => "document",
        }
    }
}

#[derive(Debug)]
struct IdentifierInner {
    lid: String,
    resource_type: String,
    id: OnceCell<String>,
}

/// Stable, referentially-unique handle `{type, id, lid}` for one record.
///
/// `lid` and `type` are immutable. `id` starts out empty for client-created
/// records and can be assigned exactly once by the identifier cache.
#[derive(Clone)]
pub struct RecordIdentifier(Rc<IdentifierInner>);

impl RecordIdentifier {
    pub(crate) fn new(resource_type: &str, id: Option<&str>, lid: String) -> Self {
        Self(Rc::new(IdentifierInner {
            lid,
            resource_type: resource_type.to_owned(),
            id: id.map_or_else(OnceCell::new, |id| OnceCell::from(id.to_owned())),
        }))
    }

    /// Process-unique local id.
    pub fn lid(&self) -> &str {
        &self.0.lid
    }

    /// Resource type.
    pub fn resource_type(&self) -> &str {
        &self.0.resource_type
    }

    /// Server-assigned id, if known.
    pub fn id(&self) -> Option<&str> {
        self.0.id.get().map(String::as_str)
    }

    /// Returns `true` when both handles denote the same identifier instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Assigns the id. Returns `false` if an id was already present.
    pub(crate) fn assign_id(&self, id: &str) -> bool {
        self.0.id.set(id.to_owned()).is_ok()
    }

    /// `type:id` key when the id is known.
    pub fn resource_key(&self) -> Option<ResourceKey> {
        self.id().map(|id| ResourceKey::new(self.resource_type(), id))
    }
}

impl PartialEq for RecordIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for RecordIdentifier {}

impl Hash for RecordIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Consistent with `eq`: equal instances share the lid.
        self.0.lid.hash(state);
    }
}

impl fmt::Debug for RecordIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordIdentifier")
            .field("type", &self.resource_type())
            .field("id", &self.id())
            .field("lid", &self.lid())
            .finish()
    }
}

impl fmt::Display for RecordIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lid())
    }
}

/// Handle for a request/document cache entry.
///
/// Lives in its own namespace: a document key never resolves to a record
/// identifier even when the strings coincide.
#[derive(Clone)]
pub struct DocumentIdentifier(Rc<str>);

impl DocumentIdentifier {
    pub(crate) fn new(lid: &str) -> Self {
        Self(Rc::from(lid))
    }

    /// The request cache key.
    pub fn lid(&self) -> &str {
        &self.0
    }

    /// Returns `true` when both handles denote the same document identifier.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for DocumentIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for DocumentIdentifier {}

impl Hash for DocumentIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for DocumentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DocumentIdentifier").field(&self.lid()).finish()
    }
}

/// `type:id` index key.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ResourceKey {
    resource_type: String,
    id: String,
}

impl ResourceKey {
    /// Builds a key from a type and id.
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            resource_type: resource_type.to_owned(),
            id: id.to_owned(),
        }
    }

    /// Resource type half of the key.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Id half of the key.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.id)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_referential_not_structural() {
        let a = RecordIdentifier::new("user", Some("1"), "user:1".to_owned());
        let b = RecordIdentifier::new("user", Some("1"), "user:1".to_owned());
        assert_eq!(a, a.clone());
        assert_ne!(a, b, "field-equal identifiers from separate creations differ");
    }

    #[test]
    fn id_is_set_once() {
        let ident = RecordIdentifier::new("post", None, "@lid:post-x".to_owned());
        assert_eq!(ident.id(), None);
        assert!(ident.assign_id("7"));
        assert!(!ident.assign_id("8"));
        assert_eq!(ident.id(), Some("7"));
        assert_eq!(ident.resource_key(), Some(ResourceKey::new("post", "7")));
    }

    #[test]
    fn resource_key_display_joins_type_and_id() {
        assert_eq!(ResourceKey::new("user", "1").to_string(), "user:1");
    }
}
