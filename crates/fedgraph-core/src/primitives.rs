//! # Primitives
//!
//! Fixed constants shared across the crate.
//!
//! These are compiled into the binary and are immutable at runtime.

/// Selector literal meaning "the whole element" rather than one property.
pub const ELEMENT_SELECTOR: &str = "ELEMENT";

// =============================================================================
// STORE PROPERTIES
// =============================================================================

/// Store-properties key naming the backend to instantiate.
pub const STORE_CLASS_KEY: &str = "fedgraph.store.class";

/// Optional store-properties key carrying an explicit store id.
pub const STORE_ID_KEY: &str = "fedgraph.store.id";

/// Built-in in-memory backend class.
pub const MEMORY_STORE_CLASS: &str = "memory";

// =============================================================================
// LIMITS
// =============================================================================

/// Default maximum number of operations in one chain.
///
/// Enforced by `hook::ChainLengthLimiter` when it is registered.
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 100;

/// Maximum length of a graph or schema id.
pub const MAX_ID_LENGTH: usize = 256;
