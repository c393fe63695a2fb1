//! Integration tests for the fedgraph HTTP API.
//!
//! Uses axum-test to test the API handlers without starting a real server.

// Tests hold the env mutex across awaits on purpose: FEDGRAPH_API_KEY is
// process-wide, so every server is built and exercised under the lock.
#![allow(clippy::unwrap_used, clippy::panic, clippy::await_holding_lock)]

use axum::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
use axum_test::TestServer;
use fedgraph::FederatedStore;
use fedgraph::api::{
    AppState, ErrorResponse, ExecuteRequest, ExecuteResponse, GraphIdsResponse, HealthResponse,
    create_router,
};
use fedgraph_core::{
    Element, ErrorKind, MemoryGraphLibrary, Operation, OperationChain, Schema, StoreProperties,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

/// Serializes tests, since the auth middleware reads the environment.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const API_KEY_ENV: &str = "FEDGRAPH_API_KEY";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Holds the env mutex and clears the API key on drop.
struct TestGuard {
    _guard: std::sync::MutexGuard<'static, ()>,
}

impl Drop for TestGuard {
    fn drop(&mut self) {
        // SAFETY: Tests run sequentially under ENV_MUTEX, so no concurrent env access.
        unsafe { std::env::remove_var(API_KEY_ENV) };
    }
}

fn server_for(store: FederatedStore, api_key: Option<&str>) -> (TestServer, TestGuard) {
    let guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    // SAFETY: Tests run sequentially under ENV_MUTEX, so no concurrent env access.
    unsafe {
        match api_key {
            Some(key) => std::env::set_var(API_KEY_ENV, key),
            None => std::env::remove_var(API_KEY_ENV),
        }
    }
    let router = create_router(AppState::new(Arc::new(store)));
    (TestServer::new(router).unwrap(), TestGuard { _guard: guard })
}

fn create_test_server() -> (TestServer, TestGuard) {
    server_for(FederatedStore::builder().build(), None)
}

fn create_library_test_server() -> (TestServer, TestGuard) {
    let store = FederatedStore::builder()
        .library(Arc::new(MemoryGraphLibrary::new()))
        .build();
    server_for(store, None)
}

fn people() -> Schema {
    Schema::new().entity("Person", [("name", "string")])
}

async fn add_people_graph(server: &TestServer, graph_id: &str) {
    server
        .post("/graphs")
        .json(&json!({
            "graph_id": graph_id,
            "schema": people(),
            "properties": StoreProperties::memory(),
        }))
        .await
        .assert_status(StatusCode::CREATED);
}

fn execute_request(operation: Operation) -> ExecuteRequest {
    ExecuteRequest {
        chain: OperationChain::single(operation),
        graph_ids: None,
        timeout_ms: None,
    }
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _guard) = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// GRAPH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_graphs_start_empty() {
    let (server, _guard) = create_test_server();

    let response = server.get("/graphs").await;

    response.assert_status_ok();
    let ids: GraphIdsResponse = response.json();
    assert!(ids.graph_ids.is_empty());
}

#[tokio::test]
async fn test_add_list_and_remove_graph() {
    let (server, _guard) = create_test_server();
    add_people_graph(&server, "people").await;

    let ids: GraphIdsResponse = server.get("/graphs").await.json();
    assert_eq!(ids.graph_ids, vec!["people".to_string()]);

    server
        .delete("/graphs/people")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let ids: GraphIdsResponse = server.get("/graphs").await.json();
    assert!(ids.graph_ids.is_empty());
}

#[tokio::test]
async fn test_duplicate_graph_is_conflict() {
    let (server, _guard) = create_test_server();
    add_people_graph(&server, "people").await;

    let response = server
        .post("/graphs")
        .json(&json!({
            "graph_id": "people",
            "schema": people(),
            "properties": StoreProperties::memory(),
        }))
        .await;

    response.assert_status(StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_removing_unknown_graph_is_not_found() {
    let (server, _guard) = create_test_server();

    let response = server.delete("/graphs/ghost").await;

    response.assert_status(StatusCode::NOT_FOUND);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, ErrorKind::NotFound);
}

// =============================================================================
// SCHEMA ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_add_schema_without_library_is_configuration_error() {
    let (server, _guard) = create_test_server();

    let response = server.post("/schemas").json(&people().id("people")).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, ErrorKind::Configuration);
    assert!(error.error.contains("graph library"), "{}", error.error);
}

#[tokio::test]
async fn test_add_then_get_schema() {
    let (server, _guard) = create_library_test_server();
    let schema = people().id("people").generation(2);

    server
        .post("/schemas")
        .json(&schema)
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.get("/schemas/people").await;
    response.assert_status_ok();
    let fetched: Schema = response.json();
    assert_eq!(fetched, schema);

    server
        .get("/schemas/missing")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_merged_schema_covers_members() {
    let (server, _guard) = create_test_server();
    add_people_graph(&server, "people").await;

    let merged: Schema = server.get("/schema").await.json();
    assert!(merged.group("Person").is_some());
}

// =============================================================================
// EXECUTE ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_execute_write_then_read() {
    let (server, _guard) = create_test_server();
    add_people_graph(&server, "a").await;
    add_people_graph(&server, "b").await;

    let write = execute_request(Operation::AddElements {
        elements: vec![Element::entity("Person", "ann").with_property("name", "Ann")],
        validate: true,
        skip_invalid_elements: false,
    });
    let response = server
        .post("/execute")
        .json(&ExecuteRequest {
            graph_ids: Some(vec!["a".to_string()]),
            ..write
        })
        .await;
    response.assert_status_ok();
    match response.json::<ExecuteResponse>() {
        ExecuteResponse::Written {
            succeeded,
            failures,
            cancelled,
        } => {
            assert_eq!(succeeded, vec!["a".to_string()]);
            assert!(failures.is_empty());
            assert!(!cancelled);
        }
        other => panic!("expected a write report, got {:?}", other),
    }

    let response = server
        .post("/execute")
        .json(&execute_request(Operation::GetAllElements { view: None }))
        .await;
    response.assert_status_ok();
    match response.json::<ExecuteResponse>() {
        ExecuteResponse::Elements {
            elements, failures, ..
        } => {
            assert_eq!(elements.len(), 1);
            assert_eq!(elements[0].group(), "Person");
            assert!(failures.is_empty());
        }
        other => panic!("expected elements, got {:?}", other),
    }
}

#[tokio::test]
async fn test_execute_admin_operation() {
    let (server, _guard) = create_test_server();
    add_people_graph(&server, "people").await;

    let response = server
        .post("/execute")
        .json(&execute_request(Operation::GetAllGraphIds))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<ExecuteResponse>(),
        ExecuteResponse::GraphIds {
            graph_ids: vec!["people".to_string()]
        }
    );
}

#[tokio::test]
async fn test_execute_mixed_chain_is_bad_request() {
    let (server, _guard) = create_test_server();
    add_people_graph(&server, "people").await;

    let request = ExecuteRequest {
        chain: OperationChain::new(vec![
            Operation::GetAllElements { view: None },
            Operation::AddElements {
                elements: Vec::new(),
                validate: true,
                skip_invalid_elements: false,
            },
        ]),
        graph_ids: None,
        timeout_ms: None,
    };
    let response = server.post("/execute").json(&request).await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, ErrorKind::Validation);
}

#[tokio::test]
async fn test_execute_unknown_member_is_not_found() {
    let (server, _guard) = create_test_server();

    let request = ExecuteRequest {
        graph_ids: Some(vec!["ghost".to_string()]),
        ..execute_request(Operation::GetAllElements { view: None })
    };
    let response = server.post("/execute").json(&request).await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_execute_on_empty_federation_is_empty() {
    let (server, _guard) = create_test_server();

    let response = server
        .post("/execute")
        .json(&execute_request(Operation::GetAllElements { view: None }))
        .await;

    response.assert_status_ok();
    match response.json::<ExecuteResponse>() {
        ExecuteResponse::Elements {
            elements, failures, ..
        } => {
            assert!(elements.is_empty());
            assert!(failures.is_empty());
        }
        other => panic!("expected elements, got {:?}", other),
    }
}

// =============================================================================
// AUTHENTICATION TESTS
// =============================================================================

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let api_key = "test-secret-key-12345";
    let (server, _guard) = server_for(FederatedStore::builder().build(), Some(api_key));

    let response = server
        .get("/graphs")
        .add_header(
            AUTHORIZATION,
            format!("Bearer {}", api_key)
                .parse::<HeaderValue>()
                .unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let (server, _guard) = server_for(FederatedStore::builder().build(), Some("correct-key"));

    let response = server
        .get("/graphs")
        .add_header(AUTHORIZATION, "Bearer wrong-key".parse::<HeaderValue>().unwrap())
        .await;

    assert_eq!(
        response.status_code(),
        StatusCode::UNAUTHORIZED,
        "Invalid token should return 401 Unauthorized"
    );
}

#[tokio::test]
async fn test_auth_missing_header_rejected() {
    let (server, _guard) = server_for(FederatedStore::builder().build(), Some("required-key"));

    let response = server.post("/execute").json(&json!({})).await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_health_endpoint_bypasses_auth() {
    let (server, _guard) = server_for(FederatedStore::builder().build(), Some("bypass-key"));

    let response = server.get("/health").await;

    response.assert_status_ok();
}
