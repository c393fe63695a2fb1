//! # redb-backed Graph Library
//!
//! A durable graph library using the redb embedded database.
//!
//! - ACID transactions: every `add` is one write transaction
//! - MVCC: concurrent readers never see a half-written record
//! - Records are postcard-encoded `GraphRecord`s and `Schema`s

use crate::GraphError;
use crate::library::{GraphLibrary, GraphRecord, StoreProperties, schema_key, validate_id};
use crate::schema::Schema;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Table for graphs: graph id -> postcard `GraphRecord`
const GRAPHS: TableDefinition<&str, &[u8]> = TableDefinition::new("graphs");

/// Table for schemas: schema id -> postcard `Schema`
const SCHEMAS: TableDefinition<&str, &[u8]> = TableDefinition::new("schemas");

fn io(e: impl std::fmt::Display) -> GraphError {
    GraphError::Io(e.to_string())
}

/// A disk-backed graph library.
pub struct RedbGraphLibrary {
    db: Database,
}

impl std::fmt::Debug for RedbGraphLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraphLibrary").finish_non_exhaustive()
    }
}

impl RedbGraphLibrary {
    /// Open or create a library database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        // Initialize tables so readers never hit a missing table
        {
            let write_txn = db.begin_write().map_err(io)?;
            let _ = write_txn.open_table(GRAPHS).map_err(io)?;
            let _ = write_txn.open_table(SCHEMAS).map_err(io)?;
            write_txn.commit().map_err(io)?;
        }

        tracing::debug!(path = %path.as_ref().display(), "opened redb graph library");
        Ok(Self { db })
    }

    fn write_graph(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
        replace: bool,
    ) -> Result<(), GraphError> {
        validate_id(graph_id)?;
        let record = GraphRecord {
            schema: schema.clone(),
            properties: properties.clone(),
        };
        let bytes = postcard::to_allocvec(&record)?;

        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = write_txn.open_table(GRAPHS).map_err(io)?;
            if !replace && table.get(graph_id).map_err(io)?.is_some() {
                return Err(GraphError::DuplicateId(graph_id.to_string()));
            }
            table.insert(graph_id, bytes.as_slice()).map_err(io)?;
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }
}

impl GraphLibrary for RedbGraphLibrary {
    fn add(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
    ) -> Result<(), GraphError> {
        self.write_graph(graph_id, schema, properties, false)
    }

    fn add_or_replace(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
    ) -> Result<(), GraphError> {
        self.write_graph(graph_id, schema, properties, true)
    }

    fn get(&self, graph_id: &str) -> Result<GraphRecord, GraphError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(GRAPHS).map_err(io)?;
        match table.get(graph_id).map_err(io)? {
            Some(data) => Ok(postcard::from_bytes(data.value())?),
            None => Err(GraphError::NotFound(format!("graph '{}'", graph_id))),
        }
    }

    fn list(&self) -> Result<Vec<String>, GraphError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(GRAPHS).map_err(io)?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(io)? {
            let (key, _) = entry.map_err(io)?;
            ids.push(key.value().to_string());
        }
        Ok(ids)
    }

    fn add_schema(&self, schema: &Schema) -> Result<(), GraphError> {
        let id = schema_key(schema)?;
        let bytes = postcard::to_allocvec(schema)?;

        let write_txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = write_txn.open_table(SCHEMAS).map_err(io)?;
            let existing: Option<Schema> = match table.get(id).map_err(io)? {
                Some(data) => Some(postcard::from_bytes(data.value())?),
                None => None,
            };
            match existing {
                Some(existing) if &existing == schema => return Ok(()),
                Some(_) => return Err(GraphError::DuplicateId(id.to_string())),
                None => {
                    table.insert(id, bytes.as_slice()).map_err(io)?;
                }
            }
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }

    fn get_schema(&self, schema_id: &str) -> Result<Schema, GraphError> {
        let read_txn = self.db.begin_read().map_err(io)?;
        let table = read_txn.open_table(SCHEMAS).map_err(io)?;
        match table.get(schema_id).map_err(io)? {
            Some(data) => Ok(postcard::from_bytes(data.value())?),
            None => Err(GraphError::NotFound(format!("schema '{}'", schema_id))),
        }
    }

    fn remove(&self, graph_id: &str) -> Result<(), GraphError> {
        let write_txn = self.db.begin_write().map_err(io)?;
        let removed = {
            let mut table = write_txn.open_table(GRAPHS).map_err(io)?;
            let removed = table.remove(graph_id).map_err(io)?.is_some();
            removed
        };
        if !removed {
            return Err(GraphError::NotFound(format!("graph '{}'", graph_id)));
        }
        write_txn.commit().map_err(io)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
