//! # Graph Stores
//!
//! The backend capability a federation member provides: execute an
//! operation chain and return a lazy sequence of elements, or fail.
//!
//! `MemoryStore` is the built-in reference backend. Other backends plug in
//! through `StoreFactory`.

use crate::context::Context;
use crate::library::StoreProperties;
use crate::operation::{ChainShape, Operation, OperationChain};
use crate::primitives::MEMORY_STORE_CLASS;
use crate::schema::Schema;
use crate::view::View;
use crate::{Element, GraphError};
use std::sync::{Arc, RwLock};

/// Lazy element sequence returned by a store.
pub type ElementIter = Box<dyn Iterator<Item = Result<Element, GraphError>> + Send>;

/// An empty element sequence.
#[must_use]
pub fn no_elements() -> ElementIter {
    Box::new(std::iter::empty())
}

/// A physical graph backend.
pub trait GraphStore: Send + Sync {
    /// Execute a read or write chain.
    ///
    /// Reads return a lazy sequence; writes return an empty one once the
    /// write has been applied.
    fn execute(&self, chain: &OperationChain, context: &Context) -> Result<ElementIter, GraphError>;

    fn schema(&self) -> &Schema;

    fn properties(&self) -> &StoreProperties;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory backend.
///
/// Reads iterate over a snapshot taken when the chain starts, so a write that
/// lands mid-iteration is not observed.
#[derive(Debug)]
pub struct MemoryStore {
    schema: Schema,
    properties: StoreProperties,
    elements: RwLock<Arc<Vec<Element>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(schema: Schema, properties: StoreProperties) -> Self {
        Self {
            schema,
            properties,
            elements: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Number of stored elements.
    pub fn len(&self) -> Result<usize, GraphError> {
        Ok(self.snapshot()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, GraphError> {
        Ok(self.len()? == 0)
    }

    fn snapshot(&self) -> Result<Arc<Vec<Element>>, GraphError> {
        self.elements
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| GraphError::Io("memory store lock poisoned".to_string()))
    }

    fn add_elements(
        &self,
        elements: &[Element],
        validate: bool,
        skip_invalid: bool,
    ) -> Result<(), GraphError> {
        let mut accepted = Vec::with_capacity(elements.len());
        for element in elements {
            if validate {
                if let Err(e) = self.schema.validate_element(element) {
                    if skip_invalid {
                        tracing::debug!(group = element.group(), error = %e, "skipping invalid element");
                        continue;
                    }
                    return Err(e);
                }
            }
            accepted.push(element.clone());
        }

        let mut guard = self
            .elements
            .write()
            .map_err(|_| GraphError::Io("memory store lock poisoned".to_string()))?;
        Arc::make_mut(&mut guard).extend(accepted);
        Ok(())
    }

    fn read(&self, snapshot: &Arc<Vec<Element>>, operation: &Operation) -> Result<ElementIter, GraphError> {
        let (seeds, view) = match operation {
            Operation::GetAllElements { view } => (None, view.clone()),
            Operation::GetElements { seeds, view } => (Some(seeds.clone()), view.clone()),
            other => {
                return Err(GraphError::Validation(format!(
                    "{} is not a read operation",
                    other.name()
                )));
            }
        };
        if let Some(view) = &view {
            view.validate(Some(&self.schema))?;
        }
        Ok(Box::new(SnapshotIter {
            elements: Arc::clone(snapshot),
            position: 0,
            seeds,
            view,
        }))
    }
}

impl GraphStore for MemoryStore {
    fn execute(&self, chain: &OperationChain, _context: &Context) -> Result<ElementIter, GraphError> {
        match chain.shape()? {
            ChainShape::Admin => Err(GraphError::Validation(
                "administrative operations are not supported by a member store".to_string(),
            )),
            ChainShape::Write => {
                for operation in &chain.operations {
                    if let Operation::AddElements {
                        elements,
                        validate,
                        skip_invalid_elements,
                    } = operation
                    {
                        self.add_elements(elements, *validate, *skip_invalid_elements)?;
                    }
                }
                Ok(no_elements())
            }
            ChainShape::Read => {
                let snapshot = self.snapshot()?;
                let mut parts = Vec::with_capacity(chain.len());
                for operation in &chain.operations {
                    parts.push(self.read(&snapshot, operation)?);
                }
                Ok(Box::new(parts.into_iter().flatten()))
            }
        }
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn properties(&self) -> &StoreProperties {
        &self.properties
    }
}

/// Lazily filters and shapes a snapshot.
struct SnapshotIter {
    elements: Arc<Vec<Element>>,
    position: usize,
    seeds: Option<Vec<String>>,
    view: Option<View>,
}

impl Iterator for SnapshotIter {
    type Item = Result<Element, GraphError>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(element) = self.elements.get(self.position) {
            self.position = self.position.saturating_add(1);
            if let Some(seeds) = &self.seeds {
                if !seeds.iter().any(|seed| element.matches_seed(seed)) {
                    continue;
                }
            }
            let shaped = match &self.view {
                Some(view) => view.apply(element),
                None => Some(element.clone()),
            };
            if let Some(shaped) = shaped {
                return Some(Ok(shaped));
            }
        }
        None
    }
}

// =============================================================================
// STORE FACTORY
// =============================================================================

/// Creates backends from store properties.
pub trait StoreFactory: Send + Sync {
    fn create(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
    ) -> Result<Arc<dyn GraphStore>, GraphError>;
}

/// Factory for the built-in backends.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStoreFactory;

impl StoreFactory for DefaultStoreFactory {
    fn create(
        &self,
        graph_id: &str,
        schema: &Schema,
        properties: &StoreProperties,
    ) -> Result<Arc<dyn GraphStore>, GraphError> {
        match properties.store_class() {
            Some(MEMORY_STORE_CLASS) => {
                tracing::debug!(graph_id, "creating memory store");
                Ok(Arc::new(MemoryStore::new(schema.clone(), properties.clone())))
            }
            Some(other) => Err(GraphError::Configuration(format!(
                "graph '{}': unknown store class '{}'",
                graph_id, other
            ))),
            None => Err(GraphError::Configuration(format!(
                "graph '{}': store properties do not name a store class",
                graph_id
            ))),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
