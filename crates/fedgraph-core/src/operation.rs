//! # Operations
//!
//! The request language: an `OperationChain` is an ordered list of
//! `Operation`s executed as one unit.
//!
//! Operations fall into three shapes:
//! - **Read**: return elements, shaped by an optional view
//! - **Write**: add elements, return nothing
//! - **Admin**: change or inspect federation membership and schemas
//!
//! Admin operations must be alone in their chain, and reads and writes are
//! not mixed.

use crate::library::StoreProperties;
use crate::schema::Schema;
use crate::view::View;
use crate::{Element, GraphError};
use serde::{Deserialize, Serialize};

/// One operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all_fields = "camelCase")]
pub enum Operation {
    /// Every element, shaped by the view.
    GetAllElements {
        #[serde(default)]
        view: Option<View>,
    },
    /// Elements touching any seed vertex, shaped by the view.
    GetElements {
        seeds: Vec<String>,
        #[serde(default)]
        view: Option<View>,
    },
    AddElements {
        elements: Vec<Element>,
        #[serde(default = "default_true")]
        validate: bool,
        #[serde(default)]
        skip_invalid_elements: bool,
    },
    /// Add a federation member. Missing parts are resolved from the graph
    /// library.
    AddGraph {
        graph_id: String,
        #[serde(default)]
        schema: Option<Schema>,
        #[serde(default)]
        store_properties: Option<StoreProperties>,
    },
    RemoveGraph {
        graph_id: String,
    },
    AddSchema {
        schema: Schema,
    },
    /// A stored schema by id, or the merged schema of every member.
    GetSchema {
        #[serde(default)]
        schema_id: Option<String>,
    },
    GetAllGraphIds,
}

const fn default_true() -> bool {
    true
}

/// What an operation (or a whole chain) does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainShape {
    Read,
    Write,
    Admin,
}

impl Operation {
    #[must_use]
    pub fn shape(&self) -> ChainShape {
        match self {
            Self::GetAllElements { .. } | Self::GetElements { .. } => ChainShape::Read,
            Self::AddElements { .. } => ChainShape::Write,
            Self::AddGraph { .. }
            | Self::RemoveGraph { .. }
            | Self::AddSchema { .. }
            | Self::GetSchema { .. }
            | Self::GetAllGraphIds => ChainShape::Admin,
        }
    }

    /// Operation name, as used in JSON and logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetAllElements { .. } => "GetAllElements",
            Self::GetElements { .. } => "GetElements",
            Self::AddElements { .. } => "AddElements",
            Self::AddGraph { .. } => "AddGraph",
            Self::RemoveGraph { .. } => "RemoveGraph",
            Self::AddSchema { .. } => "AddSchema",
            Self::GetSchema { .. } => "GetSchema",
            Self::GetAllGraphIds => "GetAllGraphIds",
        }
    }

    #[must_use]
    pub fn view(&self) -> Option<&View> {
        match self {
            Self::GetAllElements { view } | Self::GetElements { view, .. } => view.as_ref(),
            _ => None,
        }
    }

    /// The view this operation carries, if any.
    pub fn view_mut(&mut self) -> Option<&mut View> {
        match self {
            Self::GetAllElements { view } | Self::GetElements { view, .. } => view.as_mut(),
            _ => None,
        }
    }
}

/// An ordered list of operations executed as one unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OperationChain {
    pub operations: Vec<Operation>,
    /// Schema generation the chain's views were written against.
    /// `None` means "the current generation".
    #[serde(default)]
    pub generation: Option<u32>,
}

impl OperationChain {
    #[must_use]
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            operations,
            generation: None,
        }
    }

    #[must_use]
    pub fn single(operation: Operation) -> Self {
        Self::new(vec![operation])
    }

    #[must_use]
    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = Some(generation);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn views(&self) -> impl Iterator<Item = &View> {
        self.operations.iter().filter_map(Operation::view)
    }

    /// Every view carried by the chain.
    pub fn views_mut(&mut self) -> impl Iterator<Item = &mut View> {
        self.operations.iter_mut().filter_map(Operation::view_mut)
    }

    /// Classify the chain, rejecting mixed shapes.
    pub fn shape(&self) -> Result<ChainShape, GraphError> {
        let Some(first) = self.operations.first() else {
            return Err(GraphError::Validation(
                "operation chain is empty".to_string(),
            ));
        };
        let shape = first.shape();
        if shape == ChainShape::Admin && self.operations.len() > 1 {
            return Err(GraphError::Validation(format!(
                "{} must be the only operation in its chain",
                first.name()
            )));
        }
        if let Some(other) = self.operations.iter().find(|op| op.shape() != shape) {
            return Err(GraphError::Validation(format!(
                "operation chain mixes {:?} and {:?} operations ({})",
                shape,
                other.shape(),
                other.name()
            )));
        }
        Ok(shape)
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// =============================================================================
// TESTS
// =============================================================================
