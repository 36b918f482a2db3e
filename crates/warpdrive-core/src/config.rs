// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Store configuration.
//!
//! Plain serde data. Identifier lifecycle hooks are closures and live on
//! [`IdentifierHooks`](crate::IdentifierHooks) instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default prefix for lids minted by the built-in generation method.
pub const DEFAULT_LID_PREFIX: &str = "@lid";

/// Error type for config loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// A value parsed but is unusable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level store configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Graph behavior.
    pub graph: GraphConfig,
    /// Identifier cache behavior.
    pub identifiers: IdentifierConfig,
}

impl StoreConfig {
    /// Parses a JSON config document. Missing sections take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::from_slice(json.as_bytes())
    }

    /// Parses a JSON config document from bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.identifiers.lid_prefix;
        if prefix.is_empty() || prefix.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "identifiers.lid_prefix must be non-empty and contain no ':' (got {prefix:?})"
            )));
        }
        Ok(())
    }
}

/// Graph behavior switches. Both default to on in debug builds only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Reject members whose type neither matches the declared related type
    /// nor has been registered as a polymorphic pairing.
    pub assert_polymorphic_types: bool,
    /// Emit a warning for sync relationships that carry a `related` link
    /// but no data.
    pub payload_diagnostics: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            assert_polymorphic_types: cfg!(debug_assertions),
            payload_diagnostics: cfg!(debug_assertions),
        }
    }
}

/// Identifier cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierConfig {
    /// Prefix used by the built-in generation method.
    pub lid_prefix: String,
}

impl Default for IdentifierConfig {
    fn default() -> Self {
        Self {
            lid_prefix: DEFAULT_LID_PREFIX.to_owned(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = StoreConfig::from_json("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.identifiers.lid_prefix, "@lid");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config =
            StoreConfig::from_json(r#"{ "graph": { "assert_polymorphic_types": false } }"#).unwrap();
        assert!(!config.graph.assert_polymorphic_types);
        assert_eq!(config.graph.payload_diagnostics, cfg!(debug_assertions));
    }

    #[test]
    fn rejects_bad_prefix_and_bad_json() {
        let err = StoreConfig::from_json(r#"{ "identifiers": { "lid_prefix": "a:b" } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(matches!(StoreConfig::from_json("{"), Err(ConfigError::Serde(_))));
    }

    #[test]
    fn json_roundtrip_preserves_values() {
        let mut config = StoreConfig::default();
        config.identifiers.lid_prefix = "tmp".into();
        let back = StoreConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }
}
