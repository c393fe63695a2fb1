//! # Element Model
//!
//! Typed graph records: entities (one vertex) and edges (source, destination,
//! directedness). Every element carries a group name and an ordered,
//! unique-key property map.
//!
//! Elements handed out by a store are treated as immutable. View evaluation
//! works on copies; see `view::GroupView::apply`.

use crate::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered, unique-key property map.
pub type Properties = BTreeMap<String, Value>;

/// A graph element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "camelCase")]
pub enum Element {
    Entity {
        group: String,
        vertex: String,
        #[serde(default)]
        properties: Properties,
    },
    #[serde(rename_all = "camelCase")]
    Edge {
        group: String,
        source: String,
        destination: String,
        #[serde(default = "default_directed")]
        directed: bool,
        #[serde(default)]
        properties: Properties,
    },
}

const fn default_directed() -> bool {
    true
}

/// Element kind, as declared by a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Entity,
    Edge,
}

impl Element {
    /// Create an entity with no properties.
    #[must_use]
    pub fn entity(group: impl Into<String>, vertex: impl Into<String>) -> Self {
        Self::Entity {
            group: group.into(),
            vertex: vertex.into(),
            properties: Properties::new(),
        }
    }

    /// Create a directed edge with no properties.
    #[must_use]
    pub fn edge(
        group: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
    ) -> Self {
        Self::Edge {
            group: group.into(),
            source: source.into(),
            destination: destination.into(),
            directed: true,
            properties: Properties::new(),
        }
    }

    /// Builder-style property setter.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties_mut().insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn group(&self) -> &str {
        match self {
            Self::Entity { group, .. } | Self::Edge { group, .. } => group,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Entity { .. } => ElementKind::Entity,
            Self::Edge { .. } => ElementKind::Edge,
        }
    }

    #[must_use]
    pub fn properties(&self) -> &Properties {
        match self {
            Self::Entity { properties, .. } | Self::Edge { properties, .. } => properties,
        }
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        match self {
            Self::Entity { properties, .. } | Self::Edge { properties, .. } => properties,
        }
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().get(name)
    }

    /// Whether this element touches the given vertex id.
    ///
    /// Entities match on their vertex, edges on either end.
    #[must_use]
    pub fn matches_seed(&self, seed: &str) -> bool {
        match self {
            Self::Entity { vertex, .. } => vertex == seed,
            Self::Edge {
                source,
                destination,
                ..
            } => source == seed || destination == seed,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
