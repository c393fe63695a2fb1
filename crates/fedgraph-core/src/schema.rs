//! # Schema
//!
//! Declares the groups a graph stores, the properties of each group and the
//! type of each property.
//!
//! A property references a type name; a type name resolves to a class
//! (`"long"`, `"string"`, ...). Type names that are not declared in `types`
//! resolve to themselves, so `("count", "long")` is valid without a `types`
//! entry as long as a serialiser handles the class.
//!
//! Schemas are also the unit of federation compatibility: two members may
//! coexist only if every shared type name and every shared
//! `(group, property)` pair resolves to the same class.

use crate::element::ElementKind;
use crate::serialiser::SerialiserRegistry;
use crate::{Element, GraphError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Definition of one group.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ElementDefinition {
    /// Property name → type name.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A named property type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub class: String,
    /// Serialiser to use, by class name. `None` picks any that can handle `class`.
    #[serde(default)]
    pub serialiser: Option<String>,
}

/// A graph schema.
///
/// Field order is fixed and no field is skipped on output: schemas are
/// stored by the graph library in a non-self-describing binary encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub id: Option<String>,
    /// Schema generation. Members at different generations get per-member
    /// view rewriting during federated dispatch.
    #[serde(default)]
    pub generation: u32,
    #[serde(default)]
    pub entities: BTreeMap<String, ElementDefinition>,
    #[serde(default)]
    pub edges: BTreeMap<String, ElementDefinition>,
    #[serde(default)]
    pub types: BTreeMap<String, TypeDefinition>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }

    /// Declare an entity group with `(property, type)` pairs.
    #[must_use]
    pub fn entity<'a>(
        mut self,
        group: impl Into<String>,
        properties: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        self.entities.insert(group.into(), definition(properties));
        self
    }

    /// Declare an edge group with `(property, type)` pairs.
    #[must_use]
    pub fn edge<'a>(
        mut self,
        group: impl Into<String>,
        properties: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        self.edges.insert(group.into(), definition(properties));
        self
    }

    /// Declare a named type.
    #[must_use]
    pub fn type_def(mut self, name: impl Into<String>, class: impl Into<String>) -> Self {
        self.types.insert(
            name.into(),
            TypeDefinition {
                class: class.into(),
                serialiser: None,
            },
        );
        self
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Kind and definition of a group.
    #[must_use]
    pub fn group(&self, group: &str) -> Option<(ElementKind, &ElementDefinition)> {
        self.entities
            .get(group)
            .map(|d| (ElementKind::Entity, d))
            .or_else(|| self.edges.get(group).map(|d| (ElementKind::Edge, d)))
    }

    /// Every group name, entities first.
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().chain(self.edges.keys()).map(String::as_str)
    }

    /// Resolve a type name to its class.
    #[must_use]
    pub fn resolve_class<'a>(&'a self, type_name: &'a str) -> &'a str {
        self.types
            .get(type_name)
            .map(|t| t.class.as_str())
            .unwrap_or(type_name)
    }

    /// Class of `group.property`, if declared.
    #[must_use]
    pub fn property_class(&self, group: &str, property: &str) -> Option<&str> {
        self.group(group)
            .and_then(|(_, d)| d.properties.get(property))
            .map(|type_name| self.resolve_class(type_name))
    }

    /// Check the schema is internally consistent and every class can be
    /// serialised.
    pub fn validate(&self, serialisers: &SerialiserRegistry) -> Result<(), GraphError> {
        if let Some(group) = self.entities.keys().find(|g| self.edges.contains_key(*g)) {
            return Err(GraphError::Configuration(format!(
                "group '{}' is declared as both an entity and an edge",
                group
            )));
        }
        for (name, definition) in &self.types {
            let handled = match &definition.serialiser {
                Some(serialiser) => serialisers
                    .get(serialiser)
                    .is_some_and(|s| s.can_handle(&definition.class)),
                None => serialisers.find(&definition.class).is_some(),
            };
            if !handled {
                return Err(GraphError::Configuration(format!(
                    "no serialiser can handle type '{}' (class '{}')",
                    name, definition.class
                )));
            }
        }
        for group in self.groups() {
            let Some((_, definition)) = self.group(group) else {
                continue;
            };
            for (property, type_name) in &definition.properties {
                if !self.types.contains_key(type_name) && serialisers.find(type_name).is_none() {
                    return Err(GraphError::Configuration(format!(
                        "property '{}.{}' references unknown type '{}'",
                        group, property, type_name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Check an element fits this schema.
    pub fn validate_element(&self, element: &Element) -> Result<(), GraphError> {
        let group = element.group();
        let Some((kind, definition)) = self.group(group) else {
            return Err(GraphError::Validation(format!("unknown group '{}'", group)));
        };
        if kind != element.kind() {
            return Err(GraphError::Validation(format!(
                "group '{}' is declared as {:?} but the element is {:?}",
                group,
                kind,
                element.kind()
            )));
        }
        for (name, value) in element.properties() {
            let Some(type_name) = definition.properties.get(name) else {
                return Err(GraphError::Validation(format!(
                    "property '{}' is not declared for group '{}'",
                    name, group
                )));
            };
            let class = self.resolve_class(type_name);
            if class != value.class() {
                return Err(GraphError::Validation(format!(
                    "property '{}.{}' expects '{}' but got '{}'",
                    group,
                    name,
                    class,
                    value.class()
                )));
            }
        }
        Ok(())
    }

    /// Check `incoming` can coexist with `self` in one federation.
    pub fn check_compatible(&self, incoming: &Self) -> Result<(), GraphError> {
        for (name, existing) in &self.types {
            if let Some(other) = incoming.types.get(name) {
                if existing.class != other.class {
                    return Err(GraphError::SchemaConflict {
                        group: "<types>".to_string(),
                        property: name.clone(),
                        existing: existing.class.clone(),
                        incoming: other.class.clone(),
                    });
                }
            }
        }
        for group in self.groups() {
            let (Some((kind, existing)), Some((other_kind, other))) =
                (self.group(group), incoming.group(group))
            else {
                continue;
            };
            if kind != other_kind {
                return Err(GraphError::SchemaConflict {
                    group: group.to_string(),
                    property: "*".to_string(),
                    existing: format!("{:?}", kind),
                    incoming: format!("{:?}", other_kind),
                });
            }
            for (property, type_name) in &existing.properties {
                let Some(other_type) = other.properties.get(property) else {
                    continue;
                };
                let existing_class = self.resolve_class(type_name);
                let incoming_class = incoming.resolve_class(other_type);
                if existing_class != incoming_class {
                    return Err(GraphError::SchemaConflict {
                        group: group.to_string(),
                        property: property.clone(),
                        existing: existing_class.to_string(),
                        incoming: incoming_class.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Union of two compatible schemas.
    ///
    /// The merged schema has no id and carries the newer generation.
    pub fn merge(&self, other: &Self) -> Result<Self, GraphError> {
        self.check_compatible(other)?;
        let mut merged = self.clone();
        merged.id = None;
        merged.generation = self.generation.max(other.generation);
        for (name, definition) in &other.types {
            merged
                .types
                .entry(name.clone())
                .or_insert_with(|| definition.clone());
        }
        merge_groups(&mut merged.entities, &other.entities);
        merge_groups(&mut merged.edges, &other.edges);
        Ok(merged)
    }
}

fn definition<'a>(properties: impl IntoIterator<Item = (&'a str, &'a str)>) -> ElementDefinition {
    ElementDefinition {
        properties: properties
            .into_iter()
            .map(|(name, type_name)| (name.to_string(), type_name.to_string()))
            .collect(),
        description: None,
    }
}

fn merge_groups(
    target: &mut BTreeMap<String, ElementDefinition>,
    source: &BTreeMap<String, ElementDefinition>,
) {
    for (group, definition) in source {
        let entry = target.entry(group.clone()).or_default();
        for (property, type_name) in &definition.properties {
            entry
                .properties
                .entry(property.clone())
                .or_insert_with(|| type_name.clone());
        }
        if entry.description.is_none() {
            entry.description.clone_from(&definition.description);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
