//! # Filter and Transform Pipelines
//!
//! Ordered step lists evaluated against one element.
//!
//! - `ElementFilter`: every step must pass (logical AND, in order)
//! - `ElementTransformer`: each step reads its selection as left by earlier
//!   steps, applies a function and writes its projection
//!
//! Pipeline order is evaluation order.

use crate::function::{Function, Input, Predicate, Selector};
use crate::{Element, GraphError, Value};
use serde::{Deserialize, Serialize};

// =============================================================================
// FILTER
// =============================================================================

/// One filter step: `predicate(select(element))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStep {
    pub selection: Vec<Selector>,
    pub predicate: Predicate,
}

impl FilterStep {
    #[must_use]
    pub fn new(selection: Vec<Selector>, predicate: Predicate) -> Self {
        Self {
            selection,
            predicate,
        }
    }

    /// Evaluate this step against an element.
    #[must_use]
    pub fn test(&self, element: &Element) -> bool {
        let inputs: Vec<Input<'_>> = self
            .selection
            .iter()
            .map(|selector| Input::select(element, selector))
            .collect();
        self.predicate.test(&inputs)
    }
}

/// An ordered filter pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementFilter {
    pub steps: Vec<FilterStep>,
}

impl ElementFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step selecting the given properties.
    #[must_use]
    pub fn select(mut self, selection: &[&str], predicate: Predicate) -> Self {
        self.steps.push(FilterStep::new(
            selection.iter().map(|s| Selector::from(*s)).collect(),
            predicate,
        ));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether the element passes every step.
    #[must_use]
    pub fn test(&self, element: &Element) -> bool {
        self.steps.iter().all(|step| step.test(element))
    }
}

// =============================================================================
// TRANSFORMER
// =============================================================================

/// One transform step: `projection := function(selection)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    pub selection: Vec<Selector>,
    pub function: Function,
    pub projection: Vec<String>,
}

impl TransformStep {
    #[must_use]
    pub fn new(selection: Vec<Selector>, function: Function, projection: Vec<String>) -> Self {
        Self {
            selection,
            function,
            projection,
        }
    }

    /// The single property this step reads and rewrites in place, if it is
    /// shaped that way.
    #[must_use]
    pub fn in_place_property(&self) -> Option<&str> {
        match (self.selection.as_slice(), self.projection.as_slice()) {
            ([Selector::Property(read)], [written]) if read == written => Some(read),
            _ => None,
        }
    }

    /// Check the step is well-formed.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.selection.contains(&Selector::Element) {
            return Err(GraphError::Validation(
                "transform steps cannot select ELEMENT".to_string(),
            ));
        }
        let outputs = self.function.output_arity(self.selection.len());
        if outputs != self.projection.len() {
            return Err(GraphError::Validation(format!(
                "transform step projects {} properties but its function produces {}",
                self.projection.len(),
                outputs
            )));
        }
        Ok(())
    }

    fn apply(&self, element: &mut Element) {
        let inputs: Vec<Option<Value>> = self
            .selection
            .iter()
            .map(|selector| {
                selector
                    .as_property()
                    .and_then(|name| element.property(name))
                    .cloned()
            })
            .collect();
        let outputs = self.function.apply(&inputs);
        let properties = element.properties_mut();
        for (i, name) in self.projection.iter().enumerate() {
            match outputs.get(i).cloned().flatten() {
                Some(value) => {
                    properties.insert(name.clone(), value);
                }
                None => {
                    properties.remove(name);
                }
            }
        }
    }
}

/// An ordered transform pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementTransformer {
    pub steps: Vec<TransformStep>,
}

impl ElementTransformer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    #[must_use]
    pub fn select(mut self, selection: &[&str], function: Function, projection: &[&str]) -> Self {
        self.steps.push(TransformStep::new(
            selection.iter().map(|s| Selector::from(*s)).collect(),
            function,
            projection.iter().map(|s| (*s).to_string()).collect(),
        ));
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every property written by some step, in first-projection order.
    #[must_use]
    pub fn projected_properties(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self.steps.iter().flat_map(|s| s.projection.iter()) {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        names
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        self.steps.iter().try_for_each(TransformStep::validate)
    }

    /// Apply every step, in order, to `element`.
    pub fn apply(&self, element: &mut Element) {
        for step in &self.steps {
            step.apply(element);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
