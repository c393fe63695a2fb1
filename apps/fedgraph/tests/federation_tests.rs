//! Integration tests for the federated execution engine.
//!
//! Member stores are a mix of in-memory stores and test doubles that fail,
//! stall or stream slowly, selected through store properties.

#![allow(clippy::unwrap_used, clippy::panic)]

use fedgraph::{
    CancelToken, ExecuteOptions, FederatedOutput, FederatedStore, FederationConfig,
    MergedElements, PartialResult, WriteReport,
};
use fedgraph_core::{
    ChainLengthLimiter, Context, DefaultStoreFactory, Element, ElementIter, ErrorKind,
    FailureKind, GraphError, GraphHook, GraphLibrary, GraphStore, GroupMigration, GroupView,
    MemoryGraphLibrary, MigrationConfig, Operation, OperationChain, Schema, SchemaMigration,
    StoreFactory, StoreProperties, View,
};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// TEST DOUBLES
// =============================================================================

const KIND_KEY: &str = "test.kind";

fn props(kind: &str) -> StoreProperties {
    StoreProperties::memory().with(KIND_KEY, kind)
}

/// Always fails at dispatch.
struct FailingStore {
    schema: Schema,
    properties: StoreProperties,
}

impl GraphStore for FailingStore {
    fn execute(&self, _: &OperationChain, _: &Context) -> Result<ElementIter, GraphError> {
        Err(GraphError::Io("backend unavailable".into()))
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn properties(&self) -> &StoreProperties {
        &self.properties
    }
}

/// Sleeps before answering, then returns a fixed set of people.
struct SlowStore {
    schema: Schema,
    properties: StoreProperties,
    delay: Duration,
    per_element: bool,
}

impl GraphStore for SlowStore {
    fn execute(&self, chain: &OperationChain, _: &Context) -> Result<ElementIter, GraphError> {
        let elements: Vec<Element> = (0..5).map(|i| person(&format!("slow-{}", i))).collect();
        if chain.shape()? == fedgraph_core::ChainShape::Write {
            std::thread::sleep(self.delay);
            return Ok(Box::new(std::iter::empty()));
        }
        if self.per_element {
            let delay = self.delay;
            return Ok(Box::new(elements.into_iter().map(move |e| {
                std::thread::sleep(delay);
                Ok(e)
            })));
        }
        std::thread::sleep(self.delay);
        Ok(Box::new(elements.into_iter().map(Ok)))
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn properties(&self) -> &StoreProperties {
        &self.properties
    }
}

/// Builds doubles from `test.kind`, and memory stores otherwise.
struct TestFactory;

impl StoreFactory for TestFactory {
    fn create(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
    ) -> Result<Arc<dyn GraphStore>, GraphError> {
        let schema = schema.clone();
        let properties = properties.clone();
        let delay = |ms: u64| Duration::from_millis(ms);
        match properties.get(KIND_KEY) {
            Some("failing") => Ok(Arc::new(FailingStore { schema, properties })),
            Some("slow") => Ok(Arc::new(SlowStore {
                schema,
                properties,
                delay: delay(300),
                per_element: false,
            })),
            Some("stalled") => Ok(Arc::new(SlowStore {
                schema,
                properties,
                delay: delay(2_000),
                per_element: false,
            })),
            Some("trickle") => Ok(Arc::new(SlowStore {
                schema,
                properties,
                delay: delay(100),
                per_element: true,
            })),
            _ => DefaultStoreFactory.create(graph_id, &schema, &properties),
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn people() -> Schema {
    Schema::new().entity("Person", [("name", "string")])
}

fn person(vertex: &str) -> Element {
    Element::entity("Person", vertex).with_property("name", vertex)
}

fn federation() -> FederatedStore {
    FederatedStore::builder()
        .factory(Arc::new(TestFactory))
        .build()
}

async fn add(store: &FederatedStore, graph_id: &str, kind: &str) {
    store
        .add_graph(graph_id, Some(people()), Some(props(kind)))
        .await
        .unwrap();
}

async fn write(store: &FederatedStore, graph_id: &str, elements: Vec<Element>) {
    let chain = OperationChain::single(Operation::AddElements {
        elements,
        validate: true,
        skip_invalid_elements: false,
    });
    let output = store
        .execute(chain, &Context::default(), ExecuteOptions::new().only([graph_id]))
        .await
        .unwrap();
    assert!(matches!(output, FederatedOutput::Written(ref r) if r.failures.is_empty()));
}

fn read_all() -> OperationChain {
    OperationChain::single(Operation::GetAllElements { view: None })
}

fn elements(output: FederatedOutput) -> MergedElements {
    match output {
        FederatedOutput::Elements(merged) => merged,
        other => panic!("expected elements, got {:?}", other.kind()),
    }
}

fn written(output: FederatedOutput) -> WriteReport {
    match output {
        FederatedOutput::Written(report) => report,
        other => panic!("expected a write report, got {:?}", other.kind()),
    }
}

async fn read(store: &FederatedStore, options: ExecuteOptions) -> PartialResult {
    let output = store
        .execute(read_all(), &Context::default(), options)
        .await
        .unwrap();
    elements(output).collect().await
}

fn vertices(result: &PartialResult) -> Vec<String> {
    let mut vertices: Vec<String> = result
        .elements
        .iter()
        .filter_map(|e| match e {
            Element::Entity { vertex, .. } => Some(vertex.clone()),
            Element::Edge { .. } => None,
        })
        .collect();
    vertices.sort();
    vertices
}

// =============================================================================
// SCHEMAS AND THE GRAPH LIBRARY
// =============================================================================

mod library {
    use super::*;

    #[tokio::test]
    async fn adding_a_schema_without_a_library_is_a_configuration_error() {
        let store = federation();
        let err = store.add_schema(&people().id("people")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("graph library"), "{}", err);
    }

    #[tokio::test]
    async fn added_schemas_can_be_fetched_by_id() {
        let store = FederatedStore::builder()
            .library(Arc::new(MemoryGraphLibrary::new()))
            .build();
        let schema = people().id("people").generation(3);
        store.add_schema(&schema).unwrap();
        assert_eq!(store.get_schema(Some("people")).await.unwrap(), schema);

        let output = store
            .execute(
                OperationChain::single(Operation::GetSchema {
                    schema_id: Some("people".into()),
                }),
                &Context::default(),
                ExecuteOptions::new(),
            )
            .await
            .unwrap();
        assert!(matches!(output, FederatedOutput::Schema(s) if s == schema));
    }

    #[tokio::test]
    async fn graphs_resolve_missing_parts_from_the_library() {
        let library = Arc::new(MemoryGraphLibrary::new());
        library
            .add("people", &people(), &StoreProperties::memory())
            .unwrap();
        let store = FederatedStore::builder().library(library).build();

        store.add_graph("people", None, None).await.unwrap();
        assert_eq!(store.graph_ids().await, vec!["people".to_string()]);

        let err = federation().add_graph("people", None, None).await.unwrap_err();
        assert!(matches!(err, GraphError::LibraryMissing(_)));
    }

    #[tokio::test]
    async fn members_are_recorded_in_the_library() {
        let library = Arc::new(MemoryGraphLibrary::new());
        let store = FederatedStore::builder()
            .library(Arc::clone(&library) as Arc<dyn GraphLibrary>)
            .build();
        store
            .add_graph("people", Some(people()), Some(StoreProperties::memory()))
            .await
            .unwrap();
        assert_eq!(library.get("people").unwrap().schema, people());

        // Removing the member leaves the record alone.
        store.remove_graph("people").await.unwrap();
        assert!(library.get("people").is_ok());
        // Re-adding with the identical record is accepted.
        store
            .add_graph("people", Some(people()), Some(StoreProperties::memory()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn merged_schema_spans_every_member() {
        let store = federation();
        add(&store, "people", "memory").await;
        store
            .add_graph(
                "edges",
                Some(Schema::new().edge("Knows", [("weight", "long")])),
                Some(StoreProperties::memory()),
            )
            .await
            .unwrap();
        let merged = store.get_schema(None).await.unwrap();
        assert!(merged.group("Person").is_some());
        assert!(merged.group("Knows").is_some());
    }
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

mod membership {
    use super::*;

    #[tokio::test]
    async fn conflicting_schemas_are_rejected_and_leave_membership_alone() {
        let store = federation();
        add(&store, "a", "memory").await;
        let conflicting = Schema::new().entity("Person", [("name", "long")]);
        let err = store
            .add_graph("b", Some(conflicting), Some(StoreProperties::memory()))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::SchemaConflict { .. }), "{}", err);
        assert_eq!(store.graph_ids().await, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = federation();
        add(&store, "a", "memory").await;
        let err = store
            .add_graph("a", Some(people()), Some(StoreProperties::memory()))
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn removing_an_unknown_graph_is_not_found() {
        let err = federation().remove_graph("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn selecting_an_unknown_member_is_not_found() {
        let store = federation();
        add(&store, "a", "memory").await;
        let err = store
            .execute(read_all(), &Context::default(), ExecuteOptions::new().only(["a", "ghost"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn admin_operations_run_through_execute() {
        let store = federation();
        let ctx = Context::default();
        store
            .execute(
                OperationChain::single(Operation::AddGraph {
                    graph_id: "a".into(),
                    schema: Some(people()),
                    store_properties: Some(StoreProperties::memory()),
                }),
                &ctx,
                ExecuteOptions::new(),
            )
            .await
            .unwrap();
        let output = store
            .execute(
                OperationChain::single(Operation::GetAllGraphIds),
                &ctx,
                ExecuteOptions::new(),
            )
            .await
            .unwrap();
        assert!(matches!(output, FederatedOutput::GraphIds(ids) if ids == vec!["a".to_string()]));
    }
}

// =============================================================================
// PARTIAL FAILURE
// =============================================================================

mod partial_failure {
    use super::*;

    #[tokio::test]
    async fn one_failing_member_is_reported_next_to_the_others_data() {
        let store = federation();
        add(&store, "a", "memory").await;
        add(&store, "b", "memory").await;
        add(&store, "c", "failing").await;
        write(&store, "a", vec![person("a1"), person("a2")]).await;
        write(&store, "b", vec![person("b1")]).await;

        let result = read(&store, ExecuteOptions::new()).await;
        assert_eq!(vertices(&result), vec!["a1", "a2", "b1"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].graph_id, "c");
        assert_eq!(result.failures[0].kind, FailureKind::Execution);
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn all_members_failing_is_an_aggregate_error() {
        let store = federation();
        for id in ["a", "b", "c"] {
            add(&store, id, "failing").await;
        }
        let err = store
            .execute(read_all(), &Context::default(), ExecuteOptions::new())
            .await
            .unwrap_err();
        match err {
            GraphError::AggregateExecution(failures) => {
                let ids: Vec<&str> = failures.iter().map(|f| f.graph_id.as_str()).collect();
                assert_eq!(ids, vec!["a", "b", "c"]);
            }
            other => panic!("expected an aggregate error, got {}", other),
        }
    }

    #[tokio::test]
    async fn write_failures_do_not_abort_sibling_writes() {
        let store = federation();
        add(&store, "a", "memory").await;
        add(&store, "c", "failing").await;
        let chain = OperationChain::single(Operation::AddElements {
            elements: vec![person("x")],
            validate: true,
            skip_invalid_elements: false,
        });
        let report = written(
            store
                .execute(chain, &Context::default(), ExecuteOptions::new())
                .await
                .unwrap(),
        );
        assert_eq!(report.succeeded, vec!["a".to_string()]);
        assert_eq!(report.failures.len(), 1);

        let result = read(&store, ExecuteOptions::new().only(["a"])).await;
        assert_eq!(vertices(&result), vec!["x"]);
    }
}

// =============================================================================
// SNAPSHOT, TIMEOUT AND CANCELLATION
// =============================================================================

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn removing_a_member_mid_flight_does_not_change_the_running_query() {
        let store = Arc::new(federation());
        add(&store, "fast", "memory").await;
        add(&store, "slow", "slow").await;
        write(&store, "fast", vec![person("f1")]).await;

        let running = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { read(&store, ExecuteOptions::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.remove_graph("slow").await.unwrap();

        let result = running.await.unwrap();
        assert!(result.is_complete(), "{:?}", result.failures);
        assert_eq!(result.elements.len(), 6);
        assert_eq!(store.graph_ids().await, vec!["fast".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_members_time_out_instead_of_failing() {
        let store = federation();
        add(&store, "fast", "memory").await;
        add(&store, "stalled", "stalled").await;
        write(&store, "fast", vec![person("f1")]).await;

        let result = read(&store, ExecuteOptions::new().timeout(Duration::from_millis(100))).await;
        assert_eq!(vertices(&result), vec!["f1"]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].graph_id, "stalled");
        assert_eq!(result.failures[0].kind, FailureKind::Timeout);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancellation_keeps_completed_writes() {
        let store = federation();
        add(&store, "fast", "memory").await;
        add(&store, "slow", "slow").await;

        let token = CancelToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                token.cancel();
            })
        };
        let chain = OperationChain::single(Operation::AddElements {
            elements: vec![person("x")],
            validate: true,
            skip_invalid_elements: false,
        });
        let report = written(
            store
                .execute(chain, &Context::default(), ExecuteOptions::new().cancel(token))
                .await
                .unwrap(),
        );
        canceller.await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.succeeded, vec!["fast".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelling_a_read_during_dispatch_keeps_finished_members() {
        let store = federation();
        add(&store, "fast", "memory").await;
        add(&store, "stalled", "stalled").await;
        write(&store, "fast", vec![person("f1")]).await;

        let token = CancelToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                token.cancel();
            })
        };
        let result = read(&store, ExecuteOptions::new().cancel(token)).await;
        canceller.await.unwrap();

        assert!(result.cancelled);
        assert_eq!(vertices(&result), vec!["f1"]);
        let failed: Vec<(&str, FailureKind)> = result
            .failures
            .iter()
            .map(|f| (f.graph_id.as_str(), f.kind))
            .collect();
        assert_eq!(failed, vec![("stalled", FailureKind::Cancelled)]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelling_a_stream_keeps_what_was_already_received() {
        let store = federation();
        add(&store, "trickle", "trickle").await;
        let token = CancelToken::new();

        let output = store
            .execute(read_all(), &Context::default(), ExecuteOptions::new().cancel(token.clone()))
            .await
            .unwrap();
        let mut merged = elements(output);
        let first = merged.next().await;
        assert!(first.is_some());
        token.cancel();

        let rest = merged.collect().await;
        assert!(rest.cancelled);
        assert!(rest.elements.len() < 4);
        assert_eq!(rest.failures.len(), 1);
        assert_eq!(rest.failures[0].kind, FailureKind::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_before_dispatch_completes_everything_as_cancelled() {
        let store = federation();
        add(&store, "stalled", "stalled").await;
        let token = CancelToken::new();
        token.cancel();
        let err = store
            .execute(read_all(), &Context::default(), ExecuteOptions::new().cancel(token))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
    }
}

// =============================================================================
// PER-MEMBER SCHEMA RECONCILIATION
// =============================================================================

mod reconciliation {
    use super::*;

    fn migration() -> Arc<SchemaMigration> {
        Arc::new(
            SchemaMigration::new(MigrationConfig {
                generation: 2,
                migrations: vec![GroupMigration::new("Person", &["Human"]).rename("name", &["label"])],
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn only_members_at_the_new_generation_get_rewritten_views() {
        let store = FederatedStore::builder()
            .migration(migration())
            .config(FederationConfig {
                current_generation: 1,
                ..FederationConfig::default()
            })
            .build();
        store
            .add_graph("old", Some(people().generation(1)), Some(StoreProperties::memory()))
            .await
            .unwrap();
        store
            .add_graph(
                "new",
                Some(Schema::new().generation(2).entity("Human", [("label", "string")])),
                Some(StoreProperties::memory()),
            )
            .await
            .unwrap();
        write(&store, "old", vec![person("ann")]).await;
        write(
            &store,
            "new",
            vec![Element::entity("Human", "bob").with_property("label", "bob")],
        )
        .await;

        let view = View::new().group("Person", GroupView::new().properties(["name"]));
        let chain = OperationChain::single(Operation::GetAllElements { view: Some(view) });
        let output = store
            .execute(chain, &Context::default(), ExecuteOptions::new())
            .await
            .unwrap();
        let result = elements(output).collect().await;

        assert!(result.is_complete(), "{:?}", result.failures);
        let mut groups: Vec<&str> = result.elements.iter().map(Element::group).collect();
        groups.sort_unstable();
        assert_eq!(groups, vec!["Human", "Person"]);
        let human = result
            .elements
            .iter()
            .find(|e| e.group() == "Human")
            .unwrap();
        assert!(human.property("label").is_some());
    }

    #[tokio::test]
    async fn a_migration_hook_stamps_the_chain_so_members_are_not_rewritten_again() {
        let migration = migration();
        let store = FederatedStore::builder()
            .migration(Arc::clone(&migration))
            .hook(migration)
            .build();
        store
            .add_graph("old", Some(people().generation(1)), Some(StoreProperties::memory()))
            .await
            .unwrap();
        store
            .add_graph(
                "new",
                Some(Schema::new().generation(2).entity("Human", [("label", "string")])),
                Some(StoreProperties::memory()),
            )
            .await
            .unwrap();
        write(&store, "old", vec![person("ann")]).await;
        write(
            &store,
            "new",
            vec![Element::entity("Human", "bob").with_property("label", "bob")],
        )
        .await;

        let view = View::new().group("Person", GroupView::new().properties(["name"]));
        let chain = OperationChain::single(Operation::GetAllElements { view: Some(view) });
        let output = store
            .execute(chain, &Context::default(), ExecuteOptions::new())
            .await
            .unwrap();
        let result = elements(output).collect().await;

        // Every member saw the chain at the target generation: the old member
        // gets the Human-only view, the new one gets it exactly once.
        assert!(result.is_complete(), "{:?}", result.failures);
        assert_eq!(
            result.elements,
            vec![Element::entity("Human", "bob").with_property("label", "bob")]
        );
    }
}

// =============================================================================
// HOOKS
// =============================================================================

mod hooks {
    use super::*;

    /// Turns a total failure into an empty write report.
    struct ForgiveWrites;

    impl GraphHook<FederatedOutput> for ForgiveWrites {
        fn name(&self) -> &str {
            "forgive-writes"
        }

        fn on_failure(
            &self,
            error: GraphError,
            _chain: &OperationChain,
            _context: &Context,
        ) -> Result<FederatedOutput, GraphError> {
            match error {
                GraphError::AggregateExecution(failures) => {
                    Ok(FederatedOutput::Written(WriteReport {
                        failures,
                        ..WriteReport::default()
                    }))
                }
                other => Err(other),
            }
        }
    }

    #[tokio::test]
    async fn rejected_chains_never_reach_a_member() {
        let store = FederatedStore::builder()
            .factory(Arc::new(TestFactory))
            .hook(Arc::new(ChainLengthLimiter::new(1)))
            .build();
        add(&store, "a", "memory").await;
        let chain = OperationChain::new(vec![
            Operation::AddElements {
                elements: vec![person("x")],
                validate: true,
                skip_invalid_elements: false,
            },
            Operation::AddElements {
                elements: vec![person("y")],
                validate: true,
                skip_invalid_elements: false,
            },
        ]);
        let err = store
            .execute(chain, &Context::default(), ExecuteOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert!(read(&store, ExecuteOptions::new()).await.elements.is_empty());
    }

    #[tokio::test]
    async fn hooks_can_recover_a_total_failure() {
        let store = FederatedStore::builder()
            .factory(Arc::new(TestFactory))
            .hook(Arc::new(ForgiveWrites))
            .build();
        add(&store, "a", "failing").await;
        let chain = OperationChain::single(Operation::AddElements {
            elements: vec![person("x")],
            validate: true,
            skip_invalid_elements: false,
        });
        let report = written(
            store
                .execute(chain, &Context::default(), ExecuteOptions::new())
                .await
                .unwrap(),
        );
        assert!(report.succeeded.is_empty());
        assert_eq!(report.failures.len(), 1);
    }
}
