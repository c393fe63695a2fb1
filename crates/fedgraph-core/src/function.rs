//! # Functions and Predicates
//!
//! The closed set of evaluable steps a view pipeline can reference.
//!
//! Steps are plain data: each variant is registered under a `"class"` name
//! so pipelines round-trip through JSON. Evaluation is total: a conversion
//! that cannot be performed yields an absent value, and a predicate over an
//! absent or incomparable value does not match.

use crate::pipeline::{ElementFilter, ElementTransformer};
use crate::primitives::ELEMENT_SELECTOR;
use crate::{Element, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// =============================================================================
// SELECTOR
// =============================================================================

/// What a pipeline step reads: one named property, or the whole element.
///
/// Serialised as the property name, or the literal `"ELEMENT"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Selector {
    Element,
    Property(String),
}

impl Selector {
    #[must_use]
    pub fn property(name: impl Into<String>) -> Self {
        Self::Property(name.into())
    }

    #[must_use]
    pub fn as_property(&self) -> Option<&str> {
        match self {
            Self::Property(name) => Some(name),
            Self::Element => None,
        }
    }
}

impl From<String> for Selector {
    fn from(s: String) -> Self {
        if s == ELEMENT_SELECTOR {
            Self::Element
        } else {
            Self::Property(s)
        }
    }
}

impl From<&str> for Selector {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Selector> for String {
    fn from(s: Selector) -> Self {
        match s {
            Selector::Element => ELEMENT_SELECTOR.to_string(),
            Selector::Property(name) => name,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element => f.write_str(ELEMENT_SELECTOR),
            Self::Property(name) => f.write_str(name),
        }
    }
}

/// One argument handed to a predicate.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Value(Option<&'a Value>),
    Element(&'a Element),
}

impl<'a> Input<'a> {
    /// Resolve a selector against an element.
    #[must_use]
    pub fn select(element: &'a Element, selector: &Selector) -> Self {
        match selector {
            Selector::Element => Self::Element(element),
            Selector::Property(name) => Self::Value(element.property(name)),
        }
    }

    fn value(self) -> Option<&'a Value> {
        match self {
            Self::Value(v) => v,
            Self::Element(_) => None,
        }
    }
}

// =============================================================================
// FUNCTIONS
// =============================================================================

/// A value-to-value transform function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum Function {
    Identity,
    ToLong,
    ToInteger,
    ToString,
    ToBoolean,
    Concat {
        #[serde(default)]
        separator: String,
    },
    SetValue {
        value: Value,
    },
    DefaultIfAbsent {
        value: Value,
    },
}

impl Function {
    /// Number of outputs produced for `inputs` arguments.
    #[must_use]
    pub fn output_arity(&self, inputs: usize) -> usize {
        match self {
            Self::Identity => inputs,
            _ => 1,
        }
    }

    /// Apply the function to the selected values.
    #[must_use]
    pub fn apply(&self, inputs: &[Option<Value>]) -> Vec<Option<Value>> {
        let first = inputs.first().cloned().flatten();
        match self {
            Self::Identity => inputs.to_vec(),
            Self::ToLong => vec![first.and_then(to_long)],
            Self::ToInteger => vec![
                first
                    .and_then(to_long)
                    .and_then(|v| v.as_i64())
                    .and_then(|v| i32::try_from(v).ok())
                    .map(Value::Int),
            ],
            Self::ToString => vec![first.map(|v| Value::String(v.to_string()))],
            Self::ToBoolean => vec![first.and_then(to_bool)],
            Self::Concat { separator } => {
                let parts: Vec<String> = inputs.iter().flatten().map(ToString::to_string).collect();
                if parts.is_empty() {
                    vec![None]
                } else {
                    vec![Some(Value::String(parts.join(separator)))]
                }
            }
            Self::SetValue { value } => vec![Some(value.clone())],
            Self::DefaultIfAbsent { value } => vec![first.or_else(|| Some(value.clone()))],
        }
    }

    /// Apply a chain of single-argument functions in order.
    #[must_use]
    pub fn apply_chain(functions: &[Self], input: Option<Value>) -> Option<Value> {
        functions.iter().fold(input, |value, function| {
            function.apply(&[value]).into_iter().next().flatten()
        })
    }
}

fn to_long(value: Value) -> Option<Value> {
    match value {
        Value::Int(v) => Some(Value::Long(i64::from(v))),
        Value::Long(v) => Some(Value::Long(v)),
        Value::Double(v) if v.is_finite() => Some(Value::Long(v as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::Long),
        _ => None,
    }
}

fn to_bool(value: Value) -> Option<Value> {
    match value {
        Value::Bool(v) => Some(Value::Bool(v)),
        Value::Int(v) => Some(Value::Bool(v != 0)),
        Value::Long(v) => Some(Value::Bool(v != 0)),
        Value::String(s) => s.trim().parse::<bool>().ok().map(Value::Bool),
        Value::Double(_) => None,
    }
}

// =============================================================================
// PREDICATES
// =============================================================================

/// A boolean test over the selected inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all_fields = "camelCase")]
pub enum Predicate {
    IsMoreThan {
        value: Value,
        #[serde(default)]
        or_equal_to: bool,
    },
    IsLessThan {
        value: Value,
        #[serde(default)]
        or_equal_to: bool,
    },
    IsEqual {
        value: Value,
    },
    IsIn {
        values: Vec<Value>,
    },
    Exists,
    Not {
        predicate: Box<Predicate>,
    },
    And {
        predicates: Vec<Predicate>,
    },
    Or {
        predicates: Vec<Predicate>,
    },
    /// Feeds argument `i` through `functions[i]` before testing `predicate`.
    /// An empty chain passes the argument through untouched.
    Adapted {
        functions: Vec<Vec<Function>>,
        predicate: Box<Predicate>,
    },
    /// Runs `transformer` on a scratch copy of the selected element and
    /// evaluates `filter` against the copy.
    TransformAndFilter {
        transformer: ElementTransformer,
        filter: ElementFilter,
    },
}

impl Predicate {
    #[must_use]
    pub fn is_more_than(value: impl Into<Value>) -> Self {
        Self::IsMoreThan {
            value: value.into(),
            or_equal_to: false,
        }
    }

    #[must_use]
    pub fn is_less_than(value: impl Into<Value>) -> Self {
        Self::IsLessThan {
            value: value.into(),
            or_equal_to: false,
        }
    }

    #[must_use]
    pub fn is_equal(value: impl Into<Value>) -> Self {
        Self::IsEqual {
            value: value.into(),
        }
    }

    /// Evaluate the predicate.
    #[must_use]
    pub fn test(&self, inputs: &[Input<'_>]) -> bool {
        match self {
            Self::IsMoreThan { value, or_equal_to } => {
                compare_first(inputs, value).is_some_and(|ord| {
                    ord == Ordering::Greater || (*or_equal_to && ord == Ordering::Equal)
                })
            }
            Self::IsLessThan { value, or_equal_to } => {
                compare_first(inputs, value).is_some_and(|ord| {
                    ord == Ordering::Less || (*or_equal_to && ord == Ordering::Equal)
                })
            }
            Self::IsEqual { value } => compare_first(inputs, value) == Some(Ordering::Equal),
            Self::IsIn { values } => values
                .iter()
                .any(|candidate| compare_first(inputs, candidate) == Some(Ordering::Equal)),
            Self::Exists => inputs.iter().all(|input| match input {
                Input::Value(v) => v.is_some(),
                Input::Element(_) => true,
            }),
            Self::Not { predicate } => !predicate.test(inputs),
            Self::And { predicates } => predicates.iter().all(|p| p.test(inputs)),
            Self::Or { predicates } => predicates.iter().any(|p| p.test(inputs)),
            Self::Adapted {
                functions,
                predicate,
            } => {
                let adapted: Vec<Option<Value>> = inputs
                    .iter()
                    .enumerate()
                    .map(|(i, input)| {
                        let chain = functions.get(i).map(Vec::as_slice).unwrap_or_default();
                        Function::apply_chain(chain, input.value().cloned())
                    })
                    .collect();
                let args: Vec<Input<'_>> = inputs
                    .iter()
                    .zip(&adapted)
                    .map(|(input, value)| match input {
                        Input::Element(e) => Input::Element(*e),
                        Input::Value(_) => Input::Value(value.as_ref()),
                    })
                    .collect();
                predicate.test(&args)
            }
            Self::TransformAndFilter {
                transformer,
                filter,
            } => match inputs.first() {
                Some(Input::Element(element)) => {
                    let mut scratch = (*element).clone();
                    transformer.apply(&mut scratch);
                    filter.test(&scratch)
                }
                _ => false,
            },
        }
    }
}

fn compare_first(inputs: &[Input<'_>], expected: &Value) -> Option<Ordering> {
    inputs
        .first()
        .and_then(|input| input.value())
        .and_then(|actual| actual.compare(expected))
}

// =============================================================================
// TESTS
// =============================================================================
