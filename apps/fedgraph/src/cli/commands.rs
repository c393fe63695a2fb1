//! # CLI Command Implementations

use crate::api;
use crate::api::ExecuteResponse;
use crate::config::FedgraphConfig;
use crate::federation::ExecuteOptions;
use fedgraph_core::{
    Context, GraphError, OperationChain, Schema, SchemaMigration, StoreProperties, View,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Maximum size of a JSON input file (64 MB).
const MAX_INPUT_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Principal recorded for CLI callers.
const CLI_PRINCIPAL: &str = "cli";

/// Read a JSON input file, refusing anything oversized.
fn read_input(path: &Path) -> Result<String, GraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| GraphError::Io(format!("Cannot read '{}': {}", path.display(), e)))?;
    if !metadata.is_file() {
        return Err(GraphError::Io(format!(
            "'{}' is not a regular file",
            path.display()
        )));
    }
    if metadata.len() > MAX_INPUT_FILE_SIZE {
        return Err(GraphError::Validation(format!(
            "'{}' is {} bytes, the limit is {} bytes",
            path.display(),
            metadata.len(),
            MAX_INPUT_FILE_SIZE
        )));
    }
    std::fs::read_to_string(path)
        .map_err(|e| GraphError::Io(format!("Cannot read '{}': {}", path.display(), e)))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), GraphError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Load the config file, or fall back to an empty configuration.
pub fn load_config(path: Option<&Path>) -> Result<FedgraphConfig, GraphError> {
    match path {
        Some(path) => FedgraphConfig::load(path),
        None => {
            tracing::debug!("no config file given, using defaults");
            Ok(FedgraphConfig::default())
        }
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &FedgraphConfig, host: &str, port: u16) -> Result<(), GraphError> {
    let store = config.build().await?;
    let graphs = store.graph_ids().await;

    println!("fedgraph server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:       {}", host);
    println!("  Port:       {}", port);
    println!("  Members:    {}", graphs.len());
    println!("  Library:    {}", store.library().is_some());
    println!(
        "  Migration:  {}",
        store
            .migration()
            .map_or_else(|| "none".to_string(), |m| format!("generation {}", m.generation()))
    );
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, Arc::new(store)).await
}

// =============================================================================
// GRAPH COMMANDS
// =============================================================================

/// List member graphs.
pub async fn cmd_graphs(config: &FedgraphConfig) -> Result<(), GraphError> {
    let store = config.build().await?;
    let graph_ids = store.graph_ids().await;
    if graph_ids.is_empty() {
        println!("No member graphs configured.");
        return Ok(());
    }
    for graph_id in graph_ids {
        println!("{}", graph_id);
    }
    Ok(())
}

/// Register a graph through the federation, recording it in the library.
pub async fn cmd_add_graph(
    config: &FedgraphConfig,
    graph_id: &str,
    schema: Option<&Path>,
    properties: Vec<(String, String)>,
) -> Result<(), GraphError> {
    let store = config.build().await?;
    if store.library().is_none() {
        return Err(GraphError::LibraryMissing(format!(
            "Error adding graph '{}'",
            graph_id
        )));
    }
    let schema = schema
        .map(|path| Schema::from_json(&read_input(path)?))
        .transpose()?;
    let properties = (!properties.is_empty()).then(|| {
        StoreProperties::from(properties.into_iter().collect::<BTreeMap<_, _>>())
    });

    store.add_graph(graph_id, schema, properties).await?;
    println!("Graph '{}' added.", graph_id);
    Ok(())
}

// =============================================================================
// MIGRATION COMMANDS
// =============================================================================

/// Load a migration mapping and check it against a schema.
pub fn cmd_validate_migration(file: &Path, schema: Option<&Path>) -> Result<(), GraphError> {
    let migration = SchemaMigration::from_file(file)?;
    if let Some(path) = schema {
        let schema = Schema::from_json(&read_input(path)?)?;
        migration.validate_against(&schema)?;
    }
    println!(
        "Migration mapping OK: {} group migration(s), target generation {}.",
        migration.migrations().len(),
        migration.generation()
    );
    for entry in migration.migrations() {
        println!("  {} -> {}", entry.from_group, entry.to_groups.join(", "));
    }
    Ok(())
}

/// Print a view rewritten by the given (or configured) migration mapping.
pub fn cmd_rewrite(
    config: &FedgraphConfig,
    view: &Path,
    migration: Option<&Path>,
) -> Result<(), GraphError> {
    let migration = match migration {
        Some(path) => SchemaMigration::from_file(path)?,
        None => config.load_migration()?.ok_or_else(|| {
            GraphError::Configuration("no migration mapping given or configured".to_string())
        })?,
    };
    let view = View::from_json(&read_input(view)?)?;
    let rewritten = migration.rewrite(&view);
    println!("{}", rewritten.to_json()?);
    Ok(())
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

/// Run a chain file and print the JSON result.
pub async fn cmd_query(
    config: &FedgraphConfig,
    chain: &Path,
    graphs: Vec<String>,
    timeout_ms: Option<u64>,
) -> Result<(), GraphError> {
    let store = config.build().await?;
    let chain = OperationChain::from_json(&read_input(chain)?)?;

    let mut options = ExecuteOptions::new();
    if !graphs.is_empty() {
        options = options.only(graphs);
    }
    if let Some(ms) = timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }

    let output = store.execute(chain, &Context::new(CLI_PRINCIPAL), options).await?;
    print_json(&ExecuteResponse::from_output(output).await)
}
