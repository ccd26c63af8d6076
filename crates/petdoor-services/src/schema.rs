//! Data model for service definitions
//!
//! A service definition is display metadata plus an ordered mapping of
//! typed fields. Each field carries a selector describing the accepted
//! value shape, used both for UI rendering and pre-dispatch validation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A host-invocable action exposed by the integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    /// Display label
    pub name: String,
    /// Human-readable summary
    pub description: String,
    /// Ordered mapping from field key to its definition
    pub fields: IndexMap<String, FieldDefinition>,
}

/// One typed input field of a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Display label
    pub name: String,
    /// Human-readable summary
    pub description: String,
    /// Whether the host must reject invocations missing this field
    pub required: bool,
    /// Accepted value shape
    ///
    /// Historical documents misspell this key as `selctor`; the alias
    /// keeps them loading while output always uses the corrected spelling.
    #[serde(alias = "selctor")]
    pub selector: Selector,
}

/// Accepted value shape of a field
///
/// Serializes as a mapping with exactly one recognized key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selector {
    /// An entity id constrained to an integration domain
    Entity(EntitySelector),
    /// A string constrained to a fixed set of literals
    Text(TextSelector),
}

/// Entity selector: the value must name an entity in `domain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySelector {
    pub domain: String,
}

/// Text selector: the value must be one of `values`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSelector {
    pub values: Vec<String>,
}

impl Selector {
    /// The entity domain, when this is an entity selector
    #[must_use]
    pub fn entity_domain(&self) -> Option<&str> {
        match self {
            Selector::Entity(selector) => Some(&selector.domain),
            Selector::Text(_) => None,
        }
    }

    /// The literal set, when this is a text selector
    #[must_use]
    pub fn literal_values(&self) -> Option<&[String]> {
        match self {
            Selector::Text(selector) => Some(&selector.values),
            Selector::Entity(_) => None,
        }
    }
}
