//! # API Endpoint Handlers

use super::{
    AppState,
    types::{
        AddGraphRequest, ApiError, ExecuteRequest, ExecuteResponse, GraphIdsResponse,
        HealthResponse,
    },
};
use crate::federation::{ExecuteOptions, FederatedOutput};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use fedgraph_core::{Context, GraphError, Operation, OperationChain, Schema};

/// Header carrying a caller-supplied correlation id.
pub(super) const CORRELATION_HEADER: &str = "x-correlation-id";

/// Principal recorded for HTTP callers.
const HTTP_PRINCIPAL: &str = "http";

fn context(headers: &HeaderMap) -> Context {
    let context = Context::new(HTTP_PRINCIPAL);
    match headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        Some(id) => context.with_correlation_id(id),
        None => context,
    }
}

/// Run a single administrative operation through the store's hooks.
async fn admin(
    state: &AppState,
    headers: &HeaderMap,
    operation: Operation,
) -> Result<FederatedOutput, ApiError> {
    Ok(state
        .store
        .execute(
            OperationChain::single(operation),
            &context(headers),
            ExecuteOptions::default(),
        )
        .await?)
}

fn unexpected(output: &FederatedOutput) -> ApiError {
    ApiError(GraphError::Validation(format!(
        "unexpected {} output",
        output.kind()
    )))
}

// =============================================================================
// HEALTH
// =============================================================================

pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// GRAPHS
// =============================================================================

pub async fn list_graphs_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<GraphIdsResponse>, ApiError> {
    match admin(&state, &headers, Operation::GetAllGraphIds).await? {
        FederatedOutput::GraphIds(graph_ids) => Ok(Json(GraphIdsResponse { graph_ids })),
        other => Err(unexpected(&other)),
    }
}

pub async fn add_graph_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AddGraphRequest>,
) -> Result<StatusCode, ApiError> {
    admin(
        &state,
        &headers,
        Operation::AddGraph {
            graph_id: request.graph_id,
            schema: request.schema,
            store_properties: request.properties,
        },
    )
    .await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_graph_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(graph_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    admin(&state, &headers, Operation::RemoveGraph { graph_id }).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// SCHEMAS
// =============================================================================

pub async fn add_schema_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(schema): Json<Schema>,
) -> Result<StatusCode, ApiError> {
    admin(&state, &headers, Operation::AddSchema { schema }).await?;
    Ok(StatusCode::CREATED)
}

pub async fn get_schema_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(schema_id): Path<String>,
) -> Result<Json<Schema>, ApiError> {
    schema(&state, &headers, Some(schema_id)).await
}

pub async fn merged_schema_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Schema>, ApiError> {
    schema(&state, &headers, None).await
}

async fn schema(
    state: &AppState,
    headers: &HeaderMap,
    schema_id: Option<String>,
) -> Result<Json<Schema>, ApiError> {
    match admin(state, headers, Operation::GetSchema { schema_id }).await? {
        FederatedOutput::Schema(schema) => Ok(Json(schema)),
        other => Err(unexpected(&other)),
    }
}

// =============================================================================
// EXECUTE
// =============================================================================

pub async fn execute_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let mut options = ExecuteOptions::new().selector(request.selector());
    if let Some(timeout) = request.timeout() {
        options = options.timeout(timeout);
    }
    let output = state
        .store
        .execute(request.chain, &context(&headers), options)
        .await?;
    Ok(Json(ExecuteResponse::from_output(output).await))
}
