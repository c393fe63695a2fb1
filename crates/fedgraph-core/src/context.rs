//! # Execution Context
//!
//! Who is asking, and a correlation id tying together every log line and
//! member dispatch of one request. Passed by reference, never mutated.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Principal used when a request carries no identity.
pub const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub principal: String,
    pub correlation_id: String,
}

impl Context {
    /// New context with a fresh correlation id.
    #[must_use]
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            correlation_id: Uuid::new_v4().to_string(),
        }
    }

    /// Use a caller-supplied correlation id instead of a generated one.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(ANONYMOUS)
    }
}
