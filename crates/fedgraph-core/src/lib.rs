//! # fedgraph-core
//!
//! The synchronous query-shaping engine for fedgraph - THE LOGIC.
//!
//! This crate knows how to describe, validate and rewrite reads and writes
//! against graph stores. It does not know about networks, runtimes or
//! other federation members; that lives in the `fedgraph` application.
//!
//! ## Contents
//!
//! - Element model, typed values, views, filter and transform pipelines
//! - Schemas and property serialisers
//! - Graph library (in-memory and redb-backed)
//! - Operation chains, the store capability and an in-memory store
//! - Hook pipeline and the schema migration engine
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - Every map that reaches a caller is ordered (`BTreeMap`)
//! - Registries are passed explicitly; there is no global mutable state

// =============================================================================
// MODULES
// =============================================================================

pub mod context;
pub mod element;
pub mod function;
pub mod hook;
pub mod library;
pub mod migration;
pub mod operation;
pub mod pipeline;
pub mod primitives;
pub mod schema;
pub mod serialiser;
pub mod storage;
pub mod store;
pub mod types;
pub mod view;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{ErrorKind, FailureKind, GraphError, MemberFailure, Value};

// =============================================================================
// RE-EXPORTS: Model
// =============================================================================

pub use context::Context;
pub use element::{Element, ElementKind, Properties};
pub use function::{Function, Predicate, Selector};
pub use operation::{ChainShape, Operation, OperationChain};
pub use pipeline::{ElementFilter, ElementTransformer, FilterStep, TransformStep};
pub use schema::{ElementDefinition, Schema, TypeDefinition};
pub use view::{GroupView, View};

// =============================================================================
// RE-EXPORTS: Engines
// =============================================================================

pub use hook::{AuditLog, ChainLengthLimiter, GraphHook, HookPipeline};
pub use library::{GraphLibrary, GraphRecord, MemoryGraphLibrary, StoreProperties};
pub use migration::{GroupMigration, MigrationConfig, RepairScope, SchemaMigration};
pub use serialiser::{PropertySerialiser, SerialiserRegistry};
pub use storage::RedbGraphLibrary;
pub use store::{DefaultStoreFactory, ElementIter, GraphStore, MemoryStore, StoreFactory};
