//! # Graph Library
//!
//! A registry of graph definitions (`graph id → schema + store properties`)
//! and of standalone schemas (`schema id → schema`).
//!
//! The federation consults the library when a member is added with only an
//! id, and persists every accepted member back into it.
//!
//! ## Concurrency
//!
//! Implementations allow many concurrent readers and one writer. A reader
//! never observes a partially written entry.

use crate::primitives::{MAX_ID_LENGTH, MEMORY_STORE_CLASS, STORE_CLASS_KEY, STORE_ID_KEY};
use crate::schema::Schema;
use crate::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

// =============================================================================
// STORE PROPERTIES
// =============================================================================

/// Ordered string → string backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreProperties(BTreeMap<String, String>);

impl StoreProperties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Properties for the built-in in-memory backend.
    #[must_use]
    pub fn memory() -> Self {
        Self::new().with(STORE_CLASS_KEY, MEMORY_STORE_CLASS)
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value of `fedgraph.store.class`.
    #[must_use]
    pub fn store_class(&self) -> Option<&str> {
        self.get(STORE_CLASS_KEY)
    }

    /// Value of `fedgraph.store.id`.
    #[must_use]
    pub fn store_id(&self) -> Option<&str> {
        self.get(STORE_ID_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for StoreProperties {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// One stored graph definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecord {
    pub schema: Schema,
    pub properties: StoreProperties,
}

/// Check a graph or schema id is usable as a key.
pub fn validate_id(id: &str) -> Result<(), GraphError> {
    if id.trim().is_empty() {
        return Err(GraphError::Validation("id must not be empty".to_string()));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(GraphError::Validation(format!(
            "id exceeds {} bytes",
            MAX_ID_LENGTH
        )));
    }
    Ok(())
}

// =============================================================================
// LIBRARY TRAIT
// =============================================================================

/// Registry of graph definitions and schemas.
pub trait GraphLibrary: Send + Sync {
    /// Register a graph. Fails with `DuplicateId` if the id is taken.
    fn add(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
    ) -> Result<(), GraphError>;

    /// Register a graph, overwriting any existing definition.
    fn add_or_replace(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
    ) -> Result<(), GraphError>;

    /// Look up a graph. Fails with `NotFound` if absent.
    fn get(&self, graph_id: &str) -> Result<GraphRecord, GraphError>;

    /// Every registered graph id, sorted.
    fn list(&self) -> Result<Vec<String>, GraphError>;

    /// Store a standalone schema under its id.
    ///
    /// Re-adding an identical schema is a no-op; a different schema with the
    /// same id is `DuplicateId`.
    fn add_schema(&self, schema: &Schema) -> Result<(), GraphError>;

    /// Look up a standalone schema. Fails with `NotFound` if absent.
    fn get_schema(&self, schema_id: &str) -> Result<Schema, GraphError>;

    /// Delete a graph definition. Fails with `NotFound` if absent.
    fn remove(&self, graph_id: &str) -> Result<(), GraphError>;
}

pub(crate) fn schema_key(schema: &Schema) -> Result<&str, GraphError> {
    let id = schema
        .id
        .as_deref()
        .ok_or_else(|| GraphError::Validation("schema must carry an id".to_string()))?;
    validate_id(id)?;
    Ok(id)
}

// =============================================================================
// IN-MEMORY LIBRARY
// =============================================================================

/// Library held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryGraphLibrary {
    graphs: RwLock<BTreeMap<String, GraphRecord>>,
    schemas: RwLock<BTreeMap<String, Schema>>,
}

fn poisoned<T>(_: T) -> GraphError {
    GraphError::Configuration("graph library lock poisoned".to_string())
}

impl MemoryGraphLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphLibrary for MemoryGraphLibrary {
    fn add(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
    ) -> Result<(), GraphError> {
        validate_id(graph_id)?;
        let mut graphs = self.graphs.write().map_err(poisoned)?;
        if graphs.contains_key(graph_id) {
            return Err(GraphError::DuplicateId(graph_id.to_string()));
        }
        graphs.insert(
            graph_id.to_string(),
            GraphRecord {
                schema: schema.clone(),
                properties: properties.clone(),
            },
        );
        Ok(())
    }

    fn add_or_replace(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
    ) -> Result<(), GraphError> {
        validate_id(graph_id)?;
        self.graphs.write().map_err(poisoned)?.insert(
            graph_id.to_string(),
            GraphRecord {
                schema: schema.clone(),
                properties: properties.clone(),
            },
        );
        Ok(())
    }

    fn get(&self, graph_id: &str) -> Result<GraphRecord, GraphError> {
        self.graphs
            .read()
            .map_err(poisoned)?
            .get(graph_id)
            .cloned()
            .ok_or_else(|| GraphError::NotFound(format!("graph '{}'", graph_id)))
    }

    fn list(&self) -> Result<Vec<String>, GraphError> {
        Ok(self.graphs.read().map_err(poisoned)?.keys().cloned().collect())
    }

    fn add_schema(&self, schema: &Schema) -> Result<(), GraphError> {
        let id = schema_key(schema)?;
        let mut schemas = self.schemas.write().map_err(poisoned)?;
        match schemas.get(id) {
            Some(existing) if existing == schema => Ok(()),
            Some(_) => Err(GraphError::DuplicateId(id.to_string())),
            None => {
                schemas.insert(id.to_string(), schema.clone());
                Ok(())
            }
        }
    }

    fn get_schema(&self, schema_id: &str) -> Result<Schema, GraphError> {
        self.schemas
            .read()
            .map_err(poisoned)?
            .get(schema_id)
            .cloned()
            .ok_or_else(|| GraphError::NotFound(format!("schema '{}'", schema_id)))
    }

    fn remove(&self, graph_id: &str) -> Result<(), GraphError> {
        self.graphs
            .write()
            .map_err(poisoned)?
            .remove(graph_id)
            .map(|_| ())
            .ok_or_else(|| GraphError::NotFound(format!("graph '{}'", graph_id)))
    }
}

// =============================================================================
// TESTS
// =============================================================================
