//! # fedgraph CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `graphs` - List the configured member graphs
//! - `add-graph` - Register a graph (recorded in the graph library)
//! - `validate-migration` - Load and check a migration mapping
//! - `rewrite` - Print a view rewritten by a migration mapping
//! - `query` - Run an operation chain against the configured federation

mod commands;

use clap::{Parser, Subcommand};
use fedgraph_core::GraphError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// fedgraph - a federated graph query layer
///
/// Serves one logical graph over several independently versioned stores.
#[derive(Parser, Debug)]
#[command(name = "fedgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// List the member graphs of the configured federation
    Graphs,

    /// Register a graph and record it in the graph library
    AddGraph {
        /// Graph id
        #[arg(long)]
        id: String,

        /// JSON schema file (taken from the library when omitted)
        #[arg(short, long)]
        schema: Option<PathBuf>,

        /// Store property, repeatable (KEY=VALUE)
        #[arg(short = 'P', long = "property", value_parser = parse_property)]
        properties: Vec<(String, String)>,
    },

    /// Load a migration mapping and report problems
    ValidateMigration {
        /// JSON migration mapping
        #[arg(short, long)]
        file: PathBuf,

        /// Current schema the targets must exist in
        #[arg(short, long)]
        schema: Option<PathBuf>,
    },

    /// Print a view rewritten for the current schema generation
    Rewrite {
        /// JSON view file
        #[arg(long)]
        view: PathBuf,

        /// Migration mapping (defaults to the configured one)
        #[arg(short, long)]
        migration: Option<PathBuf>,
    },

    /// Run an operation chain against the configured federation
    Query {
        /// JSON operation chain file
        #[arg(long)]
        chain: PathBuf,

        /// Restrict dispatch to these members (repeatable)
        #[arg(short, long = "graph")]
        graphs: Vec<String>,

        /// Deadline in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), GraphError> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Server { host, port }) => cmd_server(&config, &host, port).await,
        Some(Commands::Graphs) | None => cmd_graphs(&config).await,
        Some(Commands::AddGraph {
            id,
            schema,
            properties,
        }) => cmd_add_graph(&config, &id, schema.as_deref(), properties).await,
        Some(Commands::ValidateMigration { file, schema }) => {
            cmd_validate_migration(&file, schema.as_deref())
        }
        Some(Commands::Rewrite { view, migration }) => {
            cmd_rewrite(&config, &view, migration.as_deref())
        }
        Some(Commands::Query {
            chain,
            graphs,
            timeout_ms,
        }) => cmd_query(&config, &chain, graphs, timeout_ms).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_parse_as_key_value_pairs() {
        assert_eq!(
            parse_property("fedgraph.store.class = memory"),
            Ok(("fedgraph.store.class".to_string(), "memory".to_string()))
        );
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=x").is_err());
    }

    #[test]
    fn query_accepts_repeated_graphs() {
        let cli = Cli::parse_from([
            "fedgraph", "query", "--chain", "c.json", "-g", "a", "-g", "b",
        ]);
        match cli.command {
            Some(Commands::Query { graphs, .. }) => assert_eq!(graphs, vec!["a", "b"]),
            other => unreachable!("parsed {:?}", other),
        }
    }
}
