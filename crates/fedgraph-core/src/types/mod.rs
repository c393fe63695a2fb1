//! # Core Type Definitions
//!
//! This module contains the leaf types shared by every other module:
//! - Typed property values (`Value`)
//! - Error types (`GraphError`, `ErrorKind`)
//! - Per-member failure records (`MemberFailure`, `FailureKind`)
//!
//! ## Ordering Guarantees
//!
//! `Value` comparisons are explicit (`Value::compare`): numeric variants
//! compare numerically across widths, strings compare lexically, and any
//! other pairing is incomparable.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// VALUE
// =============================================================================

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
}

impl Value {
    /// The type-class name used by schemas and serialisers.
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::Bool(_) => CLASS_BOOLEAN,
            Self::Int(_) => CLASS_INTEGER,
            Self::Long(_) => CLASS_LONG,
            Self::Double(_) => CLASS_DOUBLE,
            Self::String(_) => CLASS_STRING,
        }
    }

    /// Compare two values.
    ///
    /// Returns `None` for incomparable pairs (e.g. a string and a long),
    /// which predicates treat as "does not match".
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b),
            (Self::Double(a), b) => b.as_i64().and_then(|b| a.partial_cmp(&(b as f64))),
            (a, Self::Double(b)) => a.as_i64().and_then(|a| (a as f64).partial_cmp(b)),
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => Some(a.cmp(&b)),
                _ => None,
            },
        }
    }

    /// Integral view of `Int` and `Long`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of `String` values.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Class name for boolean values.
pub const CLASS_BOOLEAN: &str = "boolean";
/// Class name for 32-bit integers.
pub const CLASS_INTEGER: &str = "integer";
/// Class name for 64-bit integers.
pub const CLASS_LONG: &str = "long";
/// Class name for 64-bit floats.
pub const CLASS_DOUBLE: &str = "double";
/// Class name for UTF-8 strings.
pub const CLASS_STRING: &str = "string";

// =============================================================================
// MEMBER FAILURES
// =============================================================================

/// Why a single federation member did not produce a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The member's store reported an error.
    Execution,
    /// The member did not answer before the deadline.
    Timeout,
    /// The caller cancelled before the member finished.
    Cancelled,
}

/// A per-member failure record, reported alongside any partial data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFailure {
    pub graph_id: String,
    pub kind: FailureKind,
    pub message: String,
}

impl MemberFailure {
    #[must_use]
    pub fn new(graph_id: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            kind,
            message: message.into(),
        }
    }

    /// Build a failure record from a member's error.
    #[must_use]
    pub fn from_error(graph_id: impl Into<String>, error: &GraphError) -> Self {
        let kind = match error {
            GraphError::Timeout(_) => FailureKind::Timeout,
            GraphError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Execution,
        };
        Self::new(graph_id, kind, error.to_string())
    }
}

impl fmt::Display for MemberFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.graph_id, self.kind, self.message)
    }
}

fn list_failures(failures: &[MemberFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse error classification used by callers (and the HTTP layer) to
/// distinguish "backend said no" from "we gave up waiting".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Validation,
    NotFound,
    Rejected,
    MemberExecution,
    AggregateExecution,
    Timeout,
    Cancelled,
    Internal,
}

/// Errors that can occur anywhere in fedgraph.
///
/// - No silent failures
/// - Use `Result<T, GraphError>` for fallible operations
/// - Library code never panics; every failure is a value
#[derive(Debug, Error)]
pub enum GraphError {
    /// Malformed configuration (migration mapping, store properties, schema types).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An operation needs a graph library but none is configured.
    #[error("Configuration error: {0}: the store does not have a graph library")]
    LibraryMissing(String),

    /// The request is well-formed but not acceptable.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A graph or schema id is already registered.
    #[error("Validation error: id already exists: {0}")]
    DuplicateId(String),

    /// Two schemas disagree on the type of a shared definition.
    #[error(
        "Validation error: schema conflict on {group}.{property}: existing type '{existing}', incoming type '{incoming}'"
    )]
    SchemaConflict {
        group: String,
        property: String,
        existing: String,
        incoming: String,
    },

    /// The requested graph, schema or member does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A hook refused the operation chain before any store was touched.
    #[error("Operation chain rejected: {0}")]
    Rejected(String),

    /// A single member's dispatch failed.
    #[error("Member '{graph_id}' failed: {message}")]
    MemberExecution { graph_id: String, message: String },

    /// Every selected member failed.
    #[error("All {} selected members failed: {}", .0.len(), list_failures(.0))]
    AggregateExecution(Vec<MemberFailure>),

    /// The operation exceeded its deadline.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O or storage error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl GraphError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::LibraryMissing(_) => ErrorKind::Configuration,
            Self::Validation(_) | Self::DuplicateId(_) | Self::SchemaConflict { .. } => {
                ErrorKind::Validation
            }
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Rejected(_) => ErrorKind::Rejected,
            Self::MemberExecution { .. } => ErrorKind::MemberExecution,
            Self::AggregateExecution(_) => ErrorKind::AggregateExecution,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Serialization(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<postcard::Error> for GraphError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
