//! # Federated Execution Engine
//!
//! Registers member graphs, validates them against each other, and fans an
//! operation chain out across a snapshot of the membership.
//!
//! ## Execution Model
//!
//! - Every selected member runs its own copy of the chain on a blocking task
//! - Dispatch is a join point bounded by a timeout and a cancel token
//! - Read results are merged through one bounded channel; a slow member never
//!   starves a fast one, and per-member order is preserved
//! - Member failures become `MemberFailure` records next to the partial data;
//!   only a total failure is an error
//!
//! ## Membership
//!
//! Membership lives behind a `tokio::sync::RwLock`. Queries clone the member
//! handles under the read lock and release it before dispatch, so a chain
//! already in flight is unaffected by later `add_graph`/`remove_graph` calls.

mod merge;
mod store;

pub use merge::{MergedElements, PartialResult};
pub use store::{FederatedStore, FederatedStoreBuilder};

use fedgraph_core::{MemberFailure, Schema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Default per-chain deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default capacity of the merge channel.
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// Engine-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FederationConfig {
    /// Dispatch deadline, and the longest a merged stream waits for the next
    /// element.
    pub timeout: Duration,
    /// Elements buffered between the member pumps and the consumer.
    pub buffer_capacity: usize,
    /// Generation assumed for chains that do not state one.
    pub current_generation: u32,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            current_generation: 1,
        }
    }
}

// =============================================================================
// EXECUTE OPTIONS
// =============================================================================

/// Which members a chain is dispatched to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MemberSelector {
    #[default]
    All,
    Only(Vec<String>),
}

impl MemberSelector {
    /// `None` selects every member.
    #[must_use]
    pub fn from_ids(graph_ids: Option<Vec<String>>) -> Self {
        graph_ids.map_or(Self::All, Self::Only)
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub selector: MemberSelector,
    /// Overrides `FederationConfig::timeout` for this call.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelToken>,
}

impl ExecuteOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn selector(mut self, selector: MemberSelector) -> Self {
        self.selector = selector;
        self
    }

    #[must_use]
    pub fn only<I, S>(self, graph_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selector(MemberSelector::Only(
            graph_ids.into_iter().map(Into::into).collect(),
        ))
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

// =============================================================================
// CANCELLATION
// =============================================================================

/// Caller-side cancellation signal, shared by cloning.
#[derive(Debug, Clone)]
pub struct CancelToken {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

/// Resolves when the token fires; never resolves without one.
pub(crate) async fn wait_cancelled(token: Option<&CancelToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// OUTPUTS
// =============================================================================

/// Outcome of a write chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    /// Members that applied the write, in id order.
    pub succeeded: Vec<String>,
    pub failures: Vec<MemberFailure>,
    pub cancelled: bool,
}

/// What a federated chain produced.
#[derive(Debug)]
pub enum FederatedOutput {
    /// A lazily merged read.
    Elements(MergedElements),
    Written(WriteReport),
    GraphIds(Vec<String>),
    Schema(Schema),
    /// An administrative change was applied.
    Done,
}

impl FederatedOutput {
    /// Short name for logs and API responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Elements(_) => "elements",
            Self::Written(_) => "written",
            Self::GraphIds(_) => "graph_ids",
            Self::Schema(_) => "schema",
            Self::Done => "done",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
