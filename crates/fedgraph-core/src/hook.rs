//! # Graph Hooks
//!
//! Interception points around chain execution.
//!
//! A hook sees the chain before dispatch (and may rewrite or reject it),
//! and sees the outcome afterwards. Outcomes are threaded through every hook
//! in registration order: a success goes to `post_execute`, a failure to
//! `on_failure`. Any hook may recover a failure or turn a success into one.
//!
//! Hooks are generic over the output type so the same hook works for a
//! member store and for the federation.

use crate::context::Context;
use crate::operation::OperationChain;
use crate::primitives::DEFAULT_MAX_CHAIN_LENGTH;
use crate::GraphError;
use std::sync::Arc;

/// An execution interceptor.
pub trait GraphHook<O>: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Inspect or rewrite the chain. An error rejects it before any store is
    /// touched.
    fn pre_execute(&self, _chain: &mut OperationChain, _context: &Context) -> Result<(), GraphError> {
        Ok(())
    }

    fn post_execute(
        &self,
        output: O,
        _chain: &OperationChain,
        _context: &Context,
    ) -> Result<O, GraphError> {
        Ok(output)
    }

    /// Default: re-signal.
    fn on_failure(
        &self,
        error: GraphError,
        _chain: &OperationChain,
        _context: &Context,
    ) -> Result<O, GraphError> {
        Err(error)
    }
}

/// Hooks in registration order.
pub struct HookPipeline<O> {
    hooks: Vec<Arc<dyn GraphHook<O>>>,
}

impl<O> Clone for HookPipeline<O> {
    fn clone(&self) -> Self {
        Self {
            hooks: self.hooks.clone(),
        }
    }
}

impl<O> Default for HookPipeline<O> {
    fn default() -> Self {
        Self { hooks: Vec::new() }
    }
}

impl<O> std::fmt::Debug for HookPipeline<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|h| h.name().to_string()))
            .finish()
    }
}

impl<O> HookPipeline<O> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, hook: Arc<dyn GraphHook<O>>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn push(&mut self, hook: Arc<dyn GraphHook<O>>) {
        self.hooks.push(hook);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every `pre_execute`, stopping at the first rejection.
    pub fn pre_execute(&self, chain: &mut OperationChain, context: &Context) -> Result<(), GraphError> {
        for hook in &self.hooks {
            if let Err(e) = hook.pre_execute(chain, context) {
                tracing::debug!(hook = hook.name(), error = %e, "hook rejected chain");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Thread the outcome through every hook.
    pub fn complete(
        &self,
        outcome: Result<O, GraphError>,
        chain: &OperationChain,
        context: &Context,
    ) -> Result<O, GraphError> {
        self.hooks.iter().fold(outcome, |outcome, hook| match outcome {
            Ok(output) => hook.post_execute(output, chain, context),
            Err(error) => hook.on_failure(error, chain, context),
        })
    }
}

// =============================================================================
// BUILT-IN HOOKS
// =============================================================================

/// Rejects chains with too many operations.
#[derive(Debug, Clone, Copy)]
pub struct ChainLengthLimiter {
    pub max_operations: usize,
}

impl ChainLengthLimiter {
    #[must_use]
    pub fn new(max_operations: usize) -> Self {
        Self { max_operations }
    }
}

impl Default for ChainLengthLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHAIN_LENGTH)
    }
}

impl<O> GraphHook<O> for ChainLengthLimiter {
    fn name(&self) -> &str {
        "chain-length-limiter"
    }

    fn pre_execute(&self, chain: &mut OperationChain, _context: &Context) -> Result<(), GraphError> {
        if chain.len() > self.max_operations {
            return Err(GraphError::Rejected(format!(
                "chain has {} operations, the limit is {}",
                chain.len(),
                self.max_operations
            )));
        }
        Ok(())
    }
}

/// Logs every chain with its principal and correlation id.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLog;

fn operation_names(chain: &OperationChain) -> String {
    chain
        .operations
        .iter()
        .map(|op| op.name())
        .collect::<Vec<_>>()
        .join(",")
}

impl<O> GraphHook<O> for AuditLog {
    fn name(&self) -> &str {
        "audit-log"
    }

    fn pre_execute(&self, chain: &mut OperationChain, context: &Context) -> Result<(), GraphError> {
        tracing::info!(
            principal = %context.principal,
            correlation_id = %context.correlation_id,
            operations = %operation_names(chain),
            "executing operation chain"
        );
        Ok(())
    }

    fn post_execute(&self, output: O, _chain: &OperationChain, context: &Context) -> Result<O, GraphError> {
        tracing::info!(
            principal = %context.principal,
            correlation_id = %context.correlation_id,
            "operation chain completed"
        );
        Ok(output)
    }

    fn on_failure(
        &self,
        error: GraphError,
        chain: &OperationChain,
        context: &Context,
    ) -> Result<O, GraphError> {
        tracing::warn!(
            principal = %context.principal,
            correlation_id = %context.correlation_id,
            operations = %operation_names(chain),
            error = %error,
            "operation chain failed"
        );
        Err(error)
    }
}

// =============================================================================
// TESTS
// =============================================================================
