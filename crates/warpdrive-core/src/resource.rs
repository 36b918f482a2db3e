// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! JSON:API-shaped payload fragments consumed by the cache.
//!
//! These types only describe structure. Transport, serializers and adapters
//! live outside this crate and hand over already-normalized documents.
use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A resource object: `{ type, id?, lid?, attributes?, relationships?, meta? }`.
///
/// A missing `type` deserializes to the empty string so that the identifier
/// cache, not the parser, reports the malformed input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource type.
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// Server id. Numbers are coerced to strings, empty strings to `None`.
    #[serde(default, deserialize_with = "deserialize_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Client local id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
    /// Attribute values by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    /// Relationship fragments by field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationships: Option<BTreeMap<String, RelationshipPayload>>,
    /// Resource-level meta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Resource {
    /// Minimal resource with just a type and optional id.
    pub fn new(resource_type: impl Into<String>, id: Option<&str>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.map(str::to_owned),
            ..Self::default()
        }
    }

    /// Borrowed key view used by identifier hooks.
    pub fn view(&self) -> ResourceView<'_> {
        ResourceView {
            resource_type: &self.resource_type,
            id: self.id.as_deref(),
            lid: self.lid.as_deref(),
            attributes: self.attributes.as_ref(),
        }
    }
}

/// A resource linkage inside relationship `data`: `{ type?, id?, lid? }`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePointer {
    /// Related resource type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    /// Related resource id.
    #[serde(default, deserialize_with = "deserialize_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Related resource lid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lid: Option<String>,
}

impl ResourcePointer {
    /// Pointer by `type` and `id`.
    pub fn new(resource_type: &str, id: &str) -> Self {
        Self {
            resource_type: Some(resource_type.to_owned()),
            id: Some(id.to_owned()),
            lid: None,
        }
    }

    /// Pointer by `lid` only.
    pub fn by_lid(lid: &str) -> Self {
        Self {
            lid: Some(lid.to_owned()),
            ..Self::default()
        }
    }

    /// Borrowed key view used by identifier hooks.
    pub fn view(&self) -> ResourceView<'_> {
        ResourceView {
            resource_type: self.resource_type.as_deref().unwrap_or_default(),
            id: self.id.as_deref(),
            lid: self.lid.as_deref(),
            attributes: None,
        }
    }
}

/// Borrowed `{type, id, lid, attributes}` view shared by resources and
/// pointers. This is what generation and update hooks receive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResourceView<'a> {
    /// Resource type (empty when the payload omitted it).
    pub resource_type: &'a str,
    /// Server id.
    pub id: Option<&'a str>,
    /// Client local id.
    pub lid: Option<&'a str>,
    /// Attributes, when the source was a full resource.
    pub attributes: Option<&'a Map<String, Value>>,
}

impl<'a> ResourceView<'a> {
    /// View with only a type and optional id.
    pub fn new(resource_type: &'a str, id: Option<&'a str>) -> Self {
        Self {
            resource_type,
            id,
            lid: None,
            attributes: None,
        }
    }

    /// Looks up a single attribute.
    pub fn attribute(&self, name: &str) -> Option<&'a Value> {
        self.attributes.and_then(|attrs| attrs.get(name))
    }
}

/// Relationship fragment `{ data?, links?, meta? }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipPayload {
    /// `None` when the key is absent. An explicit `null` is
    /// `Some(RelationshipData::Null)`.
    #[serde(default, deserialize_with = "deserialize_present", skip_serializing_if = "Option::is_none")]
    pub data: Option<RelationshipData>,
    /// Relationship links.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    /// Relationship meta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl RelationshipPayload {
    /// Fragment carrying only data.
    pub fn with_data(data: RelationshipData) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }
}

/// Relationship linkage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    /// To-many linkage.
    ToMany(Vec<ResourcePointer>),
    /// To-one linkage.
    ToOne(ResourcePointer),
    /// Explicit `null`.
    Null,
}

/// Relationship links object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    /// `related` link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<Link>,
    /// `self` link.
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<Link>,
    /// Any other links (pagination etc.).
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl Links {
    /// Href of the `related` link, if any.
    pub fn related_href(&self) -> Option<&str> {
        self.related.as_ref().map(Link::href)
    }
}

/// A link: either a bare href or `{ href, meta }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Link {
    /// Bare href.
    Href(String),
    /// Link object.
    Object {
        /// Target URL.
        href: String,
        /// Link meta.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meta: Option<Value>,
    },
}

impl Link {
    /// Target URL.
    pub fn href(&self) -> &str {
        match self {
            Self::Href(href) | Self::Object { href, .. } => href,
        }
    }
}

/// Top-level document `{ data?, included? }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Primary data.
    #[serde(default, deserialize_with = "deserialize_present", skip_serializing_if = "Option::is_none")]
    pub data: Option<PrimaryData>,
    /// Side-loaded resources.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<Resource>,
    /// Document meta.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl Document {
    /// Document with a single primary resource.
    pub fn single(resource: Resource) -> Self {
        Self {
            data: Some(PrimaryData::One(Box::new(resource))),
            ..Self::default()
        }
    }

    /// Primary resources followed by included resources.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        let primary: &[Resource] = match &self.data {
            Some(PrimaryData::Many(list)) => list,
            Some(PrimaryData::One(one)) => std::slice::from_ref(one.as_ref()),
            Some(PrimaryData::Null) | None => &[],
        };
        primary.iter().chain(self.included.iter())
    }
}

/// Primary data of a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryData {
    /// Collection response.
    Many(Vec<Resource>),
    /// Single resource response.
    One(Box<Resource>),
    /// Explicit `null`.
    Null,
}

/// Request description used to derive a document cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// Request URL.
    pub url: Option<String>,
    /// HTTP method; `None` means `GET`.
    pub method: Option<String>,
    /// Explicit cache key; takes precedence over the URL.
    pub cache_key: Option<String>,
}

impl RequestInfo {
    /// `GET` request for `url`.
    pub fn get(url: &str) -> Self {
        Self {
            url: Some(url.to_owned()),
            ..Self::default()
        }
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "resource id must be a string or number, got {other}"
        ))),
    }
}

// Absent keys never reach this function (`#[serde(default)]` yields `None`),
// so any value seen here, including `null`, is present.
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
