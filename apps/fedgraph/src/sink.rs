//! # Ingestion Sink
//!
//! Accepts element batches from an ingestion source and writes them to a
//! federated store with at most one write in flight.
//!
//! Elements accumulate in a queue. When no write is running the queue is
//! drained into an owned `Batch` and written; elements that arrive during the
//! write wait in the queue and go out in the next batch. The in-flight flag is
//! only cleared while the queue lock is held and the queue is empty, so an
//! element can never be stranded between two writes.

use crate::federation::{ExecuteOptions, FederatedOutput, FederatedStore};
use fedgraph_core::{Context, Element, Operation, OperationChain};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Progress of a sink, published after every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStatus {
    pub batches_written: u64,
    pub elements_written: u64,
    pub last_error: Option<String>,
    /// No write running and nothing queued.
    pub idle: bool,
}

impl Default for SinkStatus {
    fn default() -> Self {
        Self {
            batches_written: 0,
            elements_written: 0,
            last_error: None,
            idle: true,
        }
    }
}

/// A drained queue, consumed exactly once by the write that owns it.
#[derive(Debug)]
struct Batch {
    elements: Vec<Element>,
}

impl Batch {
    fn len(&self) -> usize {
        self.elements.len()
    }

    fn into_chain(self, validate: bool, skip_invalid_elements: bool) -> OperationChain {
        OperationChain::single(Operation::AddElements {
            elements: self.elements,
            validate,
            skip_invalid_elements,
        })
    }
}

struct Inner {
    store: Arc<FederatedStore>,
    context: Context,
    validate: bool,
    skip_invalid_elements: bool,
    queue: Mutex<Vec<Element>>,
    in_flight: AtomicBool,
    status: watch::Sender<SinkStatus>,
}

/// Batched, single-writer ingestion into a `FederatedStore`.
#[derive(Clone)]
pub struct ElementSink {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ElementSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementSink")
            .field("status", &*self.inner.status.borrow())
            .finish()
    }
}

impl ElementSink {
    #[must_use]
    pub fn new(store: Arc<FederatedStore>) -> Self {
        Self::with_options(store, Context::new("ingest"), true, false)
    }

    #[must_use]
    pub fn with_options(
        store: Arc<FederatedStore>,
        context: Context,
        validate: bool,
        skip_invalid_elements: bool,
    ) -> Self {
        let (status, _) = watch::channel(SinkStatus::default());
        Self {
            inner: Arc::new(Inner {
                store,
                context,
                validate,
                skip_invalid_elements,
                queue: Mutex::new(Vec::new()),
                in_flight: AtomicBool::new(false),
                status,
            }),
        }
    }

    /// Queue elements and start a write if none is running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn accept(&self, elements: impl IntoIterator<Item = Element>) {
        {
            let mut queue = self.inner.queue();
            let before = queue.len();
            queue.extend(elements);
            if queue.len() == before {
                return;
            }
            self.inner.status.send_modify(|s| s.idle = false);
        }
        Inner::try_start(&self.inner);
    }

    /// Subscribe to status updates.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SinkStatus> {
        self.inner.status.subscribe()
    }

    /// Wait until everything accepted so far has been written (or failed).
    pub async fn flush(&self) -> SinkStatus {
        let mut receiver = self.inner.status.subscribe();
        match receiver.wait_for(|s| s.idle).await {
            Ok(status) => status.clone(),
            Err(_) => self.inner.status.borrow().clone(),
        }
    }
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, Vec<Element>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the queued elements, or release the in-flight flag if there are
    /// none. Both happen under the queue lock.
    fn next_batch(&self) -> Option<Batch> {
        let mut queue = self.queue();
        if queue.is_empty() {
            self.in_flight.store(false, Ordering::Release);
            self.status.send_modify(|s| s.idle = true);
            return None;
        }
        Some(Batch {
            elements: std::mem::take(&mut *queue),
        })
    }

    fn try_start(this: &Arc<Self>) {
        if this
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let Some(batch) = this.next_batch() else {
            return;
        };
        let inner = Arc::clone(this);
        tokio::spawn(async move {
            let mut batch = batch;
            loop {
                inner.write(batch).await;
                match inner.next_batch() {
                    Some(next) => batch = next,
                    None => break,
                }
            }
        });
    }

    async fn write(&self, batch: Batch) {
        let count = batch.len() as u64;
        let chain = batch.into_chain(self.validate, self.skip_invalid_elements);
        let outcome = self
            .store
            .execute(chain, &self.context, ExecuteOptions::default())
            .await;

        let error = match outcome {
            Ok(FederatedOutput::Written(report)) if report.failures.is_empty() => None,
            Ok(FederatedOutput::Written(report)) => Some(
                report
                    .failures
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            Ok(other) => Some(format!("unexpected {} output for a write", other.kind())),
            Err(e) => Some(e.to_string()),
        };

        match &error {
            None => tracing::debug!(elements = count, "sink batch written"),
            Some(e) => tracing::warn!(elements = count, error = %e, "sink batch failed"),
        }
        self.status.send_modify(|s| {
            if error.is_none() {
                s.batches_written = s.batches_written.saturating_add(1);
                s.elements_written = s.elements_written.saturating_add(count);
            }
            s.last_error = error;
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
