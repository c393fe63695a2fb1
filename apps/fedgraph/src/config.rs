//! # Configuration
//!
//! TOML configuration for a fedgraph server.
//!
//! ```toml
//! migration = "migration.json"
//!
//! [federation]
//! timeout_ms = 30000
//! buffer_capacity = 256
//! current_generation = 2
//! max_chain_length = 100
//!
//! [library]
//! backend = "redb"          # "none" | "memory" | "redb"
//! path = "fedgraph.db"
//!
//! [[graphs]]
//! id = "people"
//! schema = "schemas/people.json"
//! [graphs.properties]
//! "fedgraph.store.class" = "memory"
//! ```
//!
//! Relative paths are resolved against the directory of the config file.

use crate::federation::{FederatedStore, FederationConfig};
use fedgraph_core::primitives::DEFAULT_MAX_CHAIN_LENGTH;
use fedgraph_core::{
    AuditLog, ChainLengthLimiter, GraphError, GraphLibrary, MemoryGraphLibrary, RedbGraphLibrary,
    Schema, SchemaMigration, StoreProperties,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// SECTIONS
// =============================================================================

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FedgraphConfig {
    pub federation: FederationSection,
    pub library: LibrarySection,
    /// Path to a JSON migration mapping.
    pub migration: Option<PathBuf>,
    pub graphs: Vec<GraphSection>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// `[federation]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FederationSection {
    pub timeout_ms: u64,
    pub buffer_capacity: usize,
    pub current_generation: u32,
    pub max_chain_length: usize,
}

impl Default for FederationSection {
    fn default() -> Self {
        let defaults = FederationConfig::default();
        Self {
            timeout_ms: defaults.timeout.as_millis() as u64,
            buffer_capacity: defaults.buffer_capacity,
            current_generation: defaults.current_generation,
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
        }
    }
}

/// Graph library backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryBackend {
    #[default]
    None,
    Memory,
    Redb,
}

/// `[library]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LibrarySection {
    pub backend: LibraryBackend,
    pub path: Option<PathBuf>,
}

/// One `[[graphs]]` entry. Missing parts come from the graph library.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphSection {
    pub id: String,
    pub schema: Option<PathBuf>,
    pub properties: Option<BTreeMap<String, String>>,
}

// =============================================================================
// LOADING
// =============================================================================

impl FedgraphConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, GraphError> {
        toml::from_str(text).map_err(|e| GraphError::Configuration(format!("invalid config: {}", e)))
    }

    /// Read and parse a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GraphError::Configuration(format!("cannot read config '{}': {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&text)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn federation_config(&self) -> FederationConfig {
        FederationConfig {
            timeout: Duration::from_millis(self.federation.timeout_ms),
            buffer_capacity: self.federation.buffer_capacity.max(1),
            current_generation: self.federation.current_generation,
        }
    }

    /// Open the configured graph library, if any.
    pub fn open_library(&self) -> Result<Option<Arc<dyn GraphLibrary>>, GraphError> {
        match self.library.backend {
            LibraryBackend::None => Ok(None),
            LibraryBackend::Memory => Ok(Some(Arc::new(MemoryGraphLibrary::new()))),
            LibraryBackend::Redb => {
                let path = self.library.path.as_deref().ok_or_else(|| {
                    GraphError::Configuration("library backend 'redb' needs a path".to_string())
                })?;
                let library = RedbGraphLibrary::open(self.resolve_path(path))?;
                Ok(Some(Arc::new(library)))
            }
        }
    }

    /// Load the migration mapping, if one is configured.
    pub fn load_migration(&self) -> Result<Option<SchemaMigration>, GraphError> {
        self.migration
            .as_deref()
            .map(|path| SchemaMigration::from_file(self.resolve_path(path)))
            .transpose()
    }

    /// Build a federated store and register every configured graph.
    pub async fn build(&self) -> Result<FederatedStore, GraphError> {
        let mut builder = FederatedStore::builder()
            .config(self.federation_config())
            .hook(Arc::new(ChainLengthLimiter::new(
                self.federation.max_chain_length,
            )))
            .hook(Arc::new(AuditLog));
        if let Some(library) = self.open_library()? {
            builder = builder.library(library);
        }
        if let Some(migration) = self.load_migration()? {
            builder = builder.migration(Arc::new(migration));
        }
        let store = builder.build();

        for graph in &self.graphs {
            let schema = graph
                .schema
                .as_deref()
                .map(|path| self.read_schema(path))
                .transpose()?;
            let properties = graph.properties.clone().map(StoreProperties::from);
            store.add_graph(&graph.id, schema, properties).await?;
        }
        tracing::info!(graphs = self.graphs.len(), "federation configured");
        Ok(store)
    }

    fn read_schema(&self, path: &Path) -> Result<Schema, GraphError> {
        let path = self.resolve_path(path);
        let json = std::fs::read_to_string(&path).map_err(|e| {
            GraphError::Configuration(format!("cannot read schema '{}': {}", path.display(), e))
        })?;
        Schema::from_json(&json)
    }
}

// =============================================================================
// TESTS
// =============================================================================
