//! # Federated Store
//!
//! The engine itself: membership, administrative operations and dispatch.

use super::merge::{Message, MergedElements, pump};
use super::{
    CancelToken, ExecuteOptions, FederatedOutput, FederationConfig, MemberSelector, WriteReport,
    wait_cancelled,
};
use fedgraph_core::library::validate_id;
use fedgraph_core::{
    ChainShape, Context, DefaultStoreFactory, ElementIter, FailureKind, GraphError, GraphHook,
    GraphLibrary, GraphRecord, GraphStore, HookPipeline, MemberFailure, Operation, OperationChain,
    Schema, SchemaMigration, SerialiserRegistry, StoreFactory, StoreProperties,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::Instant;

// =============================================================================
// MEMBERS
// =============================================================================

/// One registered member graph.
struct Member {
    graph_id: String,
    store: Arc<dyn GraphStore>,
}

impl Member {
    fn generation(&self) -> u32 {
        self.store.schema().generation
    }
}

/// A member's dispatch in progress.
struct Pending {
    graph_id: String,
    ready: oneshot::Receiver<Result<(), GraphError>>,
    stop: Arc<AtomicBool>,
}

/// Outcome of the dispatch join point.
#[derive(Default)]
struct Joined {
    succeeded: Vec<(String, Arc<AtomicBool>)>,
    failures: Vec<MemberFailure>,
    cancelled: bool,
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builds a `FederatedStore`.
#[must_use]
pub struct FederatedStoreBuilder {
    library: Option<Arc<dyn GraphLibrary>>,
    factory: Arc<dyn StoreFactory>,
    migration: Option<Arc<SchemaMigration>>,
    hooks: HookPipeline<FederatedOutput>,
    serialisers: SerialiserRegistry,
    config: FederationConfig,
}

impl Default for FederatedStoreBuilder {
    fn default() -> Self {
        Self {
            library: None,
            factory: Arc::new(DefaultStoreFactory),
            migration: None,
            hooks: HookPipeline::new(),
            serialisers: SerialiserRegistry::default(),
            config: FederationConfig::default(),
        }
    }
}

impl FederatedStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn library(mut self, library: Arc<dyn GraphLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn factory(mut self, factory: Arc<dyn StoreFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Reconcile older views per member before dispatch.
    pub fn migration(mut self, migration: Arc<SchemaMigration>) -> Self {
        self.migration = Some(migration);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn GraphHook<FederatedOutput>>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn serialisers(mut self, serialisers: SerialiserRegistry) -> Self {
        self.serialisers = serialisers;
        self
    }

    pub fn config(mut self, config: FederationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> FederatedStore {
        FederatedStore {
            members: RwLock::new(BTreeMap::new()),
            library: self.library,
            factory: self.factory,
            migration: self.migration,
            hooks: self.hooks,
            serialisers: self.serialisers,
            config: self.config,
        }
    }
}

// =============================================================================
// FEDERATED STORE
// =============================================================================

/// A logical graph served by a dynamic set of member stores.
pub struct FederatedStore {
    members: RwLock<BTreeMap<String, Arc<Member>>>,
    library: Option<Arc<dyn GraphLibrary>>,
    factory: Arc<dyn StoreFactory>,
    migration: Option<Arc<SchemaMigration>>,
    hooks: HookPipeline<FederatedOutput>,
    serialisers: SerialiserRegistry,
    config: FederationConfig,
}

impl FederatedStore {
    pub fn builder() -> FederatedStoreBuilder {
        FederatedStoreBuilder::new()
    }

    #[must_use]
    pub fn config(&self) -> &FederationConfig {
        &self.config
    }

    #[must_use]
    pub fn library(&self) -> Option<&Arc<dyn GraphLibrary>> {
        self.library.as_ref()
    }

    #[must_use]
    pub fn migration(&self) -> Option<&Arc<SchemaMigration>> {
        self.migration.as_ref()
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Register a member graph.
    ///
    /// A missing schema or missing properties are looked up in the graph
    /// library. Nothing changes unless every check passes.
    pub async fn add_graph(
        &self,
        graph_id: &str,
        schema: Option<Schema>,
        properties: Option<StoreProperties>,
    ) -> Result<(), GraphError> {
        validate_id(graph_id)?;
        let (schema, properties) = self.resolve(graph_id, schema, properties)?;
        schema.validate(&self.serialisers)?;

        let mut members = self.members.write().await;
        if members.contains_key(graph_id) {
            return Err(GraphError::DuplicateId(graph_id.to_string()));
        }
        for member in members.values() {
            member.store.schema().check_compatible(&schema)?;
        }
        let store = self.factory.create(graph_id, &schema, &properties)?;
        if let Some(library) = &self.library {
            record_in_library(library.as_ref(), graph_id, &schema, &properties)?;
        }

        members.insert(
            graph_id.to_string(),
            Arc::new(Member {
                graph_id: graph_id.to_string(),
                store,
            }),
        );
        tracing::info!(
            graph_id,
            generation = schema.generation,
            members = members.len(),
            "graph added to federation"
        );
        Ok(())
    }

    /// Drop a member from the live membership. Its library entry stays.
    pub async fn remove_graph(&self, graph_id: &str) -> Result<(), GraphError> {
        let mut members = self.members.write().await;
        if members.remove(graph_id).is_none() {
            return Err(GraphError::NotFound(format!("graph '{}'", graph_id)));
        }
        tracing::info!(graph_id, members = members.len(), "graph removed from federation");
        Ok(())
    }

    /// Persist a schema to the graph library.
    pub fn add_schema(&self, schema: &Schema) -> Result<(), GraphError> {
        let library = self.require_library("Error adding schema to federated store")?;
        schema.validate(&self.serialisers)?;
        library.add_schema(schema)?;
        tracing::info!(schema_id = schema.id.as_deref().unwrap_or(""), "schema added to library");
        Ok(())
    }

    /// A library schema by id, or the merged schema of every member.
    pub async fn get_schema(&self, schema_id: Option<&str>) -> Result<Schema, GraphError> {
        if let Some(schema_id) = schema_id {
            return self
                .require_library("Error getting schema from federated store")?
                .get_schema(schema_id);
        }
        let members = self.snapshot(&MemberSelector::All).await?;
        members
            .iter()
            .try_fold(Schema::new(), |merged, member| merged.merge(member.store.schema()))
    }

    /// Ids of the live members, sorted.
    pub async fn graph_ids(&self) -> Vec<String> {
        self.members.read().await.keys().cloned().collect()
    }

    fn require_library(&self, action: &str) -> Result<&Arc<dyn GraphLibrary>, GraphError> {
        self.library
            .as_ref()
            .ok_or_else(|| GraphError::LibraryMissing(action.to_string()))
    }

    fn resolve(
        &self,
        graph_id: &str,
        schema: Option<Schema>,
        properties: Option<StoreProperties>,
    ) -> Result<(Schema, StoreProperties), GraphError> {
        match (schema, properties) {
            (Some(schema), Some(properties)) => Ok((schema, properties)),
            (schema, properties) => {
                let library = self.require_library(&format!(
                    "Error adding graph '{}' to federated store",
                    graph_id
                ))?;
                let record = library.get(graph_id)?;
                Ok((
                    schema.unwrap_or(record.schema),
                    properties.unwrap_or(record.properties),
                ))
            }
        }
    }

    // =========================================================================
    // EXECUTION
    // =========================================================================

    /// Run a chain through the hooks and across the selected members.
    pub async fn execute(
        &self,
        mut chain: OperationChain,
        context: &Context,
        options: ExecuteOptions,
    ) -> Result<FederatedOutput, GraphError> {
        self.hooks.pre_execute(&mut chain, context)?;
        let outcome = self.dispatch(&chain, context, options).await;
        if let Err(e) = &outcome {
            tracing::warn!(
                correlation_id = %context.correlation_id,
                error = %e,
                "federated execution failed"
            );
        }
        self.hooks.complete(outcome, &chain, context)
    }

    async fn dispatch(
        &self,
        chain: &OperationChain,
        context: &Context,
        options: ExecuteOptions,
    ) -> Result<FederatedOutput, GraphError> {
        let shape = chain.shape()?;
        if shape == ChainShape::Admin {
            return self.execute_admin(chain).await;
        }

        let members = self.snapshot(&options.selector).await?;
        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let cancel = options.cancel;
        tracing::debug!(
            correlation_id = %context.correlation_id,
            members = members.len(),
            ?shape,
            "dispatching chain"
        );

        let (sender, receiver) = mpsc::channel(self.config.buffer_capacity.max(1));
        let pending: Vec<Pending> = members
            .iter()
            .map(|member| {
                let member_chain = self.member_chain(chain, member);
                spawn_member(Arc::clone(member), member_chain, context.clone(), shape, sender.clone())
            })
            .collect();
        drop(sender);

        let joined = join(pending, timeout, cancel.as_ref()).await;
        if joined.succeeded.is_empty() && !joined.failures.is_empty() {
            if joined.cancelled {
                return Err(GraphError::Cancelled);
            }
            return Err(GraphError::AggregateExecution(joined.failures));
        }

        match shape {
            ChainShape::Read => Ok(FederatedOutput::Elements(MergedElements::new(
                receiver,
                joined.succeeded.into_iter().collect(),
                joined.failures,
                timeout,
                cancel,
                joined.cancelled,
            ))),
            _ => Ok(FederatedOutput::Written(WriteReport {
                succeeded: joined.succeeded.into_iter().map(|(id, _)| id).collect(),
                failures: joined.failures,
                cancelled: joined.cancelled,
            })),
        }
    }

    async fn execute_admin(&self, chain: &OperationChain) -> Result<FederatedOutput, GraphError> {
        let Some(operation) = chain.operations.first() else {
            return Err(GraphError::Validation("operation chain is empty".to_string()));
        };
        match operation {
            Operation::AddGraph {
                graph_id,
                schema,
                store_properties,
            } => {
                self.add_graph(graph_id, schema.clone(), store_properties.clone())
                    .await?;
                Ok(FederatedOutput::Done)
            }
            Operation::RemoveGraph { graph_id } => {
                self.remove_graph(graph_id).await?;
                Ok(FederatedOutput::Done)
            }
            Operation::AddSchema { schema } => {
                self.add_schema(schema)?;
                Ok(FederatedOutput::Done)
            }
            Operation::GetSchema { schema_id } => Ok(FederatedOutput::Schema(
                self.get_schema(schema_id.as_deref()).await?,
            )),
            Operation::GetAllGraphIds => Ok(FederatedOutput::GraphIds(self.graph_ids().await)),
            other => Err(GraphError::Validation(format!(
                "{} is not an administrative operation",
                other.name()
            ))),
        }
    }

    /// Clone the selected member handles under the read lock.
    async fn snapshot(&self, selector: &MemberSelector) -> Result<Vec<Arc<Member>>, GraphError> {
        let members = self.members.read().await;
        match selector {
            MemberSelector::All => Ok(members.values().cloned().collect()),
            MemberSelector::Only(graph_ids) => graph_ids
                .iter()
                .map(|graph_id| {
                    members
                        .get(graph_id)
                        .cloned()
                        .ok_or_else(|| GraphError::NotFound(format!("graph '{}'", graph_id)))
                })
                .collect(),
        }
    }

    /// The chain as one member should see it.
    fn member_chain(&self, chain: &OperationChain, member: &Member) -> OperationChain {
        let mut member_chain = chain.clone();
        if let Some(migration) = &self.migration {
            let view_generation = chain.generation.unwrap_or(self.config.current_generation);
            if migration.applies(view_generation, member.generation()) {
                tracing::debug!(
                    graph_id = %member.graph_id,
                    from = view_generation,
                    to = migration.generation(),
                    "migrating views for member"
                );
                migration.rewrite_chain(&mut member_chain);
            }
        }
        member_chain
    }
}

/// Write the member's record, accepting an identical existing one.
fn record_in_library(
    library: &dyn GraphLibrary,
    graph_id: &str,
    schema: &Schema,
    properties: &StoreProperties,
) -> Result<(), GraphError> {
    match library.add(graph_id, schema, properties) {
        Err(GraphError::DuplicateId(_)) => {
            let existing = library.get(graph_id)?;
            let incoming = GraphRecord {
                schema: schema.clone(),
                properties: properties.clone(),
            };
            if existing == incoming {
                Ok(())
            } else {
                Err(GraphError::DuplicateId(format!(
                    "{} (the graph library holds a different record)",
                    graph_id
                )))
            }
        }
        other => other,
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Start one member on a blocking task.
///
/// The task reports the dispatch outcome on `ready`; for reads it then
/// pumps the member's elements into `sender` unless the receiver has gone.
fn spawn_member(
    member: Arc<Member>,
    chain: OperationChain,
    context: Context,
    shape: ChainShape,
    sender: mpsc::Sender<Message>,
) -> Pending {
    let (ready_tx, ready) = oneshot::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let graph_id = member.graph_id.clone();
    let flag = Arc::clone(&stop);

    tokio::task::spawn_blocking(move || {
        let outcome = member.store.execute(&chain, &context);
        match (shape, outcome) {
            (_, Err(e)) => {
                let _ = ready_tx.send(Err(e));
            }
            (ChainShape::Read, Ok(elements)) => {
                if ready_tx.send(Ok(())).is_ok() {
                    pump(&member.graph_id, elements, &sender, &flag);
                }
            }
            (_, Ok(elements)) => {
                let _ = ready_tx.send(drain(elements));
            }
        }
    });

    Pending {
        graph_id,
        ready,
        stop,
    }
}

/// Consume a write's (empty) result sequence, surfacing any error in it.
fn drain(elements: ElementIter) -> Result<(), GraphError> {
    for item in elements {
        item?;
    }
    Ok(())
}

/// Wait for every dispatch, up to the deadline or a cancel.
///
/// Members still running when the deadline passes or the token fires are
/// stopped and recorded; members that already finished are kept.
async fn join(pending: Vec<Pending>, timeout: Duration, cancel: Option<&CancelToken>) -> Joined {
    let deadline = Instant::now() + timeout;
    let mut joined = Joined::default();
    let mut gave_up: Option<(FailureKind, String)> = None;

    for mut member in pending {
        let outcome = match &gave_up {
            Some(_) => member.ready.try_recv().ok(),
            None => {
                tokio::select! {
                    biased;
                    () = wait_cancelled(cancel) => {
                        joined.cancelled = true;
                        gave_up = Some((FailureKind::Cancelled, "cancelled by caller".to_string()));
                        member.ready.try_recv().ok()
                    }
                    received = tokio::time::timeout_at(deadline, &mut member.ready) => match received {
                        Ok(Ok(result)) => Some(result),
                        Ok(Err(_)) => Some(Err(GraphError::MemberExecution {
                            graph_id: member.graph_id.clone(),
                            message: "member task ended without reporting".to_string(),
                        })),
                        Err(_) => {
                            gave_up = Some((
                                FailureKind::Timeout,
                                format!("no response within {:?}", timeout),
                            ));
                            None
                        }
                    },
                }
            }
        };

        match outcome {
            Some(Ok(())) => joined.succeeded.push((member.graph_id, member.stop)),
            Some(Err(e)) => {
                tracing::warn!(graph_id = %member.graph_id, error = %e, "member dispatch failed");
                joined.failures.push(MemberFailure::from_error(member.graph_id, &e));
            }
            None => {
                let (kind, message) = gave_up
                    .clone()
                    .unwrap_or((FailureKind::Timeout, String::new()));
                member.stop.store(true, Ordering::Release);
                tracing::warn!(graph_id = %member.graph_id, ?kind, "member abandoned");
                joined
                    .failures
                    .push(MemberFailure::new(member.graph_id, kind, message));
            }
        }
    }
    joined
}
