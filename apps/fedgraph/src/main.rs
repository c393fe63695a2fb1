//! # fedgraph - Federated Graph Server
//!
//! The main binary: one logical graph served over several member stores.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   apps/fedgraph (THE BINARY)                 │
//! │                                                              │
//! │   ┌───────────┐   ┌───────────┐   ┌──────────────────────┐   │
//! │   │   CLI     │   │ HTTP API  │   │   Ingestion sink     │   │
//! │   │  (clap)   │   │  (axum)   │   │  (batched writes)    │   │
//! │   └─────┬─────┘   └─────┬─────┘   └──────────┬───────────┘   │
//! │         └───────────────┼────────────────────┘               │
//! │                         ▼                                    │
//! │              ┌──────────────────────┐                        │
//! │              │   FederatedStore     │  fan-out / merge       │
//! │              └──────────┬───────────┘                        │
//! │                         ▼                                    │
//! │              ┌──────────────────────┐                        │
//! │              │    fedgraph-core     │  views, migration,     │
//! │              │     (THE LOGIC)      │  hooks, stores         │
//! │              └──────────────────────┘                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! fedgraph -c fedgraph.toml server --host 0.0.0.0 --port 8080
//! fedgraph -c fedgraph.toml graphs
//! fedgraph validate-migration -f migration.json -s schema.json
//! fedgraph -c fedgraph.toml query --chain chain.json -g people
//! ```

use clap::Parser;
use fedgraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // FEDGRAPH_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("FEDGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "fedgraph=debug,fedgraph_core=debug,tower_http=debug"
    } else {
        "fedgraph=info,fedgraph_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!(kind = ?e.kind(), "Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
   __          _                       _
  / _| ___  __| | __ _ _ __ __ _ _ __ | |__
 | |_ / _ \/ _` |/ _` | '__/ _` | '_ \| '_ \
 |  _|  __/ (_| | (_| | | | (_| | |_) | | | |
 |_|  \___|\__,_|\__, |_|  \__,_| .__/|_| |_|
                 |___/          |_|

  Federated graph server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
