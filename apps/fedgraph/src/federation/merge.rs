//! # Merged Read Streams
//!
//! Each member that dispatched successfully gets a pump: a blocking loop that
//! pulls the member's lazy element sequence and pushes into one bounded
//! channel shared by all pumps. The consumer side (`MergedElements`) pulls from
//! that channel, so elements arrive interleaved in whatever order the members
//! produce them while each member's own order is kept.

use super::{CancelToken, wait_cancelled};
use fedgraph_core::{Element, ElementIter, FailureKind, MemberFailure};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// What a pump sends to the consumer.
#[derive(Debug)]
pub(crate) enum Message {
    Element(Element),
    /// The member's sequence failed part-way; earlier elements stand.
    Failed(MemberFailure),
    /// The member's sequence is exhausted.
    Finished(String),
}

/// Pull `elements` into `sender` until exhausted, stopped or disconnected.
///
/// Runs on a blocking thread.
pub(crate) fn pump(
    graph_id: &str,
    elements: ElementIter,
    sender: &mpsc::Sender<Message>,
    stop: &AtomicBool,
) {
    for item in elements {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let message = match item {
            Ok(element) => Message::Element(element),
            Err(e) => {
                tracing::warn!(graph_id, error = %e, "member stream failed");
                let _ = sender.blocking_send(Message::Failed(MemberFailure::from_error(graph_id, &e)));
                return;
            }
        };
        if sender.blocking_send(message).is_err() {
            return;
        }
    }
    let _ = sender.blocking_send(Message::Finished(graph_id.to_string()));
}

// =============================================================================
// MERGED ELEMENTS
// =============================================================================

/// A lazily merged read across federation members.
///
/// Pull with `next().await` or drain with `collect().await`. If no element
/// arrives within the idle timeout the outstanding members are stopped and
/// recorded as `Timeout`; if the cancel token fires they are stopped and
/// recorded as `Cancelled`. Elements already buffered are still delivered,
/// and a member whose stream had already ended is not recorded at all.
#[derive(Debug)]
pub struct MergedElements {
    receiver: mpsc::Receiver<Message>,
    /// Members whose pump has not reported back, with their stop flags.
    outstanding: BTreeMap<String, Arc<AtomicBool>>,
    /// Elements drained from the channel when it was closed.
    buffered: VecDeque<Element>,
    failures: Vec<MemberFailure>,
    idle_timeout: Duration,
    cancel: Option<CancelToken>,
    cancelled: bool,
    closed: bool,
}

enum Event {
    Received(Option<Message>),
    Idle,
    Cancelled,
}

impl MergedElements {
    pub(crate) fn new(
        receiver: mpsc::Receiver<Message>,
        outstanding: BTreeMap<String, Arc<AtomicBool>>,
        failures: Vec<MemberFailure>,
        idle_timeout: Duration,
        cancel: Option<CancelToken>,
        cancelled: bool,
    ) -> Self {
        let mut merged = Self {
            receiver,
            outstanding,
            buffered: VecDeque::new(),
            failures,
            idle_timeout,
            cancel,
            cancelled: false,
            closed: false,
        };
        if cancelled {
            merged.stop(FailureKind::Cancelled, "cancelled by caller");
            merged.cancelled = true;
        }
        merged
    }

    /// Next merged element, or `None` once every member has finished or
    /// been stopped.
    pub async fn next(&mut self) -> Option<Element> {
        loop {
            if self.outstanding.is_empty() && !self.closed {
                // Abandoned members may still hold senders but never pump.
                self.close();
            }
            if self.closed {
                return self.buffered.pop_front();
            }

            let event = tokio::select! {
                biased;
                () = wait_cancelled(self.cancel.as_ref()) => Event::Cancelled,
                received = tokio::time::timeout(self.idle_timeout, self.receiver.recv()) => {
                    received.map_or(Event::Idle, Event::Received)
                }
            };

            match event {
                Event::Received(Some(Message::Element(element))) => return Some(element),
                Event::Received(Some(Message::Failed(failure))) => self.record_failure(failure),
                Event::Received(Some(Message::Finished(graph_id))) => {
                    self.outstanding.remove(&graph_id);
                }
                Event::Received(None) => {
                    // Every pump dropped its sender without reporting back.
                    let lost: Vec<String> = self.outstanding.keys().cloned().collect();
                    for graph_id in lost {
                        self.failures.push(MemberFailure::new(
                            graph_id,
                            FailureKind::Execution,
                            "member stream ended without completing",
                        ));
                    }
                    self.outstanding.clear();
                    return None;
                }
                Event::Idle => {
                    let message = format!("no element within {:?}", self.idle_timeout);
                    self.stop(FailureKind::Timeout, &message);
                }
                Event::Cancelled => {
                    self.stop(FailureKind::Cancelled, "cancelled by caller");
                    self.cancelled = true;
                }
            }
        }
    }

    /// Drain the stream.
    pub async fn collect(mut self) -> PartialResult {
        let mut elements = Vec::new();
        while let Some(element) = self.next().await {
            elements.push(element);
        }
        PartialResult {
            elements,
            failures: self.failures,
            cancelled: self.cancelled,
        }
    }

    /// Failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> &[MemberFailure] {
        &self.failures
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Record a member's mid-stream failure once.
    fn record_failure(&mut self, failure: MemberFailure) {
        if self.outstanding.remove(&failure.graph_id).is_some() {
            self.failures.push(failure);
        }
    }

    /// Close the channel and move everything still in it into `buffered`.
    ///
    /// Pumps blocked on a full buffer see the channel closed and exit.
    fn close(&mut self) {
        self.receiver.close();
        while let Ok(message) = self.receiver.try_recv() {
            match message {
                Message::Element(element) => self.buffered.push_back(element),
                Message::Failed(failure) => self.record_failure(failure),
                Message::Finished(graph_id) => {
                    self.outstanding.remove(&graph_id);
                }
            }
        }
        self.closed = true;
    }

    /// Stop every outstanding pump. Members whose end is already buffered
    /// are settled from the buffer; the rest are recorded as `kind`.
    fn stop(&mut self, kind: FailureKind, message: &str) {
        for flag in self.outstanding.values() {
            flag.store(true, Ordering::Release);
        }
        self.close();
        for graph_id in std::mem::take(&mut self.outstanding).into_keys() {
            tracing::warn!(graph_id = %graph_id, ?kind, "stopping member stream");
            self.failures.push(MemberFailure::new(graph_id, kind, message));
        }
    }
}

/// A fully drained read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartialResult {
    pub elements: Vec<Element>,
    pub failures: Vec<MemberFailure>,
    pub cancelled: bool,
}

impl PartialResult {
    /// True when every selected member contributed in full.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

// =============================================================================
// TESTS
// =============================================================================
