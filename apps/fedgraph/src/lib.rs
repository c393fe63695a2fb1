//! # fedgraph
//!
//! The async application layer on top of `fedgraph-core` - THE BINARY.
//!
//! ## Contents
//!
//! - `federation` - the federated execution engine (member fan-out, merge,
//!   per-member schema reconciliation)
//! - `sink` - batched ingestion into a federated store
//! - `config` - TOML configuration
//! - `api` - HTTP surface (axum)
//! - `cli` - command-line surface (clap)

pub mod api;
pub mod cli;
pub mod config;
pub mod federation;
pub mod sink;

pub use config::FedgraphConfig;
pub use federation::{
    CancelToken, ExecuteOptions, FederatedOutput, FederatedStore, FederatedStoreBuilder,
    FederationConfig, MemberSelector, MergedElements, PartialResult, WriteReport,
};
pub use sink::{ElementSink, SinkStatus};
