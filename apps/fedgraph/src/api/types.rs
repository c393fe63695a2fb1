//! # API Request/Response Types
//!
//! JSON bodies of the HTTP API, and the mapping from `GraphError` to HTTP
//! status codes.

use crate::federation::{FederatedOutput, MemberSelector, PartialResult, WriteReport};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use fedgraph_core::{
    Element, ErrorKind, GraphError, MemberFailure, OperationChain, Schema, StoreProperties,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// GRAPHS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphIdsResponse {
    pub graph_ids: Vec<String>,
}

/// Body of `POST /graphs`. Omitted parts are taken from the graph library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddGraphRequest {
    pub graph_id: String,
    #[serde(default)]
    pub schema: Option<Schema>,
    #[serde(default)]
    pub properties: Option<StoreProperties>,
}

// =============================================================================
// EXECUTE
// =============================================================================

/// Body of `POST /execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub chain: OperationChain,
    /// Members to dispatch to; all when omitted.
    #[serde(default)]
    pub graph_ids: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ExecuteRequest {
    #[must_use]
    pub fn selector(&self) -> MemberSelector {
        MemberSelector::from_ids(self.graph_ids.clone())
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Result of `POST /execute`, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecuteResponse {
    Elements {
        elements: Vec<Element>,
        failures: Vec<MemberFailure>,
        cancelled: bool,
    },
    Written {
        succeeded: Vec<String>,
        failures: Vec<MemberFailure>,
        cancelled: bool,
    },
    GraphIds {
        graph_ids: Vec<String>,
    },
    Schema {
        schema: Schema,
    },
    Done,
}

impl ExecuteResponse {
    /// The JSON form of an output. Merged reads are drained first.
    pub async fn from_output(output: FederatedOutput) -> Self {
        match output {
            FederatedOutput::Elements(merged) => merged.collect().await.into(),
            FederatedOutput::Written(report) => report.into(),
            FederatedOutput::GraphIds(graph_ids) => Self::GraphIds { graph_ids },
            FederatedOutput::Schema(schema) => Self::Schema { schema },
            FederatedOutput::Done => Self::Done,
        }
    }
}

impl From<PartialResult> for ExecuteResponse {
    fn from(result: PartialResult) -> Self {
        Self::Elements {
            elements: result.elements,
            failures: result.failures,
            cancelled: result.cancelled,
        }
    }
}

impl From<WriteReport> for ExecuteResponse {
    fn from(report: WriteReport) -> Self {
        Self::Written {
            succeeded: report.succeeded,
            failures: report.failures,
            cancelled: report.cancelled,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Error body returned by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub error: String,
    /// Per-member failures when every member failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<MemberFailure>,
}

/// A `GraphError` on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GraphError);

impl From<GraphError> for ApiError {
    fn from(e: GraphError) -> Self {
        Self(e)
    }
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            GraphError::DuplicateId(_) | GraphError::SchemaConflict { .. } => StatusCode::CONFLICT,
            other => match other.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::MemberExecution | ErrorKind::AggregateExecution => {
                    StatusCode::BAD_GATEWAY
                }
                ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Configuration | ErrorKind::Internal => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let failures = match &self.0 {
            GraphError::AggregateExecution(failures) => failures.clone(),
            _ => Vec::new(),
        };
        let body = ErrorResponse {
            kind: self.0.kind(),
            error: self.0.to_string(),
            failures,
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use fedgraph_core::FailureKind;

    #[test]
    fn error_kinds_map_to_statuses() {
        let cases = [
            (GraphError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (GraphError::DuplicateId("g".into()), StatusCode::CONFLICT),
            (GraphError::NotFound("g".into()), StatusCode::NOT_FOUND),
            (GraphError::Rejected("long".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (GraphError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
            (
                GraphError::LibraryMissing("Error adding schema".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GraphError::AggregateExecution(vec![MemberFailure::new(
                    "g",
                    FailureKind::Execution,
                    "down",
                )]),
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).status(), status);
        }
    }

    #[test]
    fn execute_request_defaults_to_every_member() {
        let request: ExecuteRequest = serde_json::from_str(
            r#"{"chain": {"operations": [{"class": "GetAllElements"}]}}"#,
        )
        .expect("parse");
        assert_eq!(request.selector(), MemberSelector::All);
        assert_eq!(request.timeout(), None);
    }
}
