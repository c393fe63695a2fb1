//! # Property Serialisers
//!
//! Column codecs for property values. A serialiser maps one `Value` to zero
//! or more primitive column fields and back, and describes the column it
//! writes.
//!
//! The federation layer never calls these directly; `Schema::validate` only
//! asks the registry whether some serialiser can handle each declared class.

use crate::types::{CLASS_BOOLEAN, CLASS_DOUBLE, CLASS_INTEGER, CLASS_LONG, CLASS_STRING};
use crate::{GraphError, Value};
use serde::{Deserialize, Serialize};

/// A primitive column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    Utf8(String),
    Int64(i64),
    Int32(i32),
    Boolean(bool),
    Float64(f64),
}

/// A codec for one property class.
pub trait PropertySerialiser: Send + Sync {
    /// Registry name.
    fn name(&self) -> &'static str;

    fn can_handle(&self, class: &str) -> bool;

    fn serialise(&self, value: &Value) -> Result<Vec<Field>, GraphError>;

    /// Fields written for an absent value.
    fn serialise_null(&self) -> Vec<Field> {
        Vec::new()
    }

    /// Decode fields. Anything that is not exactly one field of the expected
    /// shape decodes to `None`.
    fn deserialise(&self, fields: &[Field]) -> Result<Option<Value>, GraphError>;

    fn deserialise_empty(&self) -> Option<Value> {
        None
    }

    /// Whether the encoded form sorts the same way as the values.
    fn preserves_ordering(&self) -> bool;

    /// Column declaration for `column`.
    fn column_schema(&self, column: &str) -> String;
}

fn unsupported(serialiser: &str, value: &Value) -> GraphError {
    GraphError::Serialization(format!(
        "{} cannot serialise a '{}' value",
        serialiser,
        value.class()
    ))
}

// =============================================================================
// BUILT-IN SERIALISERS
// =============================================================================

/// Single optional UTF-8 column.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerialiser;

impl PropertySerialiser for StringSerialiser {
    fn name(&self) -> &'static str {
        CLASS_STRING
    }

    fn can_handle(&self, class: &str) -> bool {
        class == CLASS_STRING
    }

    fn serialise(&self, value: &Value) -> Result<Vec<Field>, GraphError> {
        match value {
            Value::String(s) => Ok(vec![Field::Utf8(s.clone())]),
            other => Err(unsupported(self.name(), other)),
        }
    }

    fn deserialise(&self, fields: &[Field]) -> Result<Option<Value>, GraphError> {
        Ok(match fields {
            [Field::Utf8(s)] => Some(Value::String(s.clone())),
            _ => None,
        })
    }

    fn preserves_ordering(&self) -> bool {
        true
    }

    fn column_schema(&self, column: &str) -> String {
        format!("optional binary {} (UTF8);", column)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LongSerialiser;

impl PropertySerialiser for LongSerialiser {
    fn name(&self) -> &'static str {
        CLASS_LONG
    }

    fn can_handle(&self, class: &str) -> bool {
        class == CLASS_LONG
    }

    fn serialise(&self, value: &Value) -> Result<Vec<Field>, GraphError> {
        match value {
            Value::Long(v) => Ok(vec![Field::Int64(*v)]),
            other => Err(unsupported(self.name(), other)),
        }
    }

    fn deserialise(&self, fields: &[Field]) -> Result<Option<Value>, GraphError> {
        Ok(match fields {
            [Field::Int64(v)] => Some(Value::Long(*v)),
            _ => None,
        })
    }

    fn preserves_ordering(&self) -> bool {
        true
    }

    fn column_schema(&self, column: &str) -> String {
        format!("optional int64 {};", column)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerSerialiser;

impl PropertySerialiser for IntegerSerialiser {
    fn name(&self) -> &'static str {
        CLASS_INTEGER
    }

    fn can_handle(&self, class: &str) -> bool {
        class == CLASS_INTEGER
    }

    fn serialise(&self, value: &Value) -> Result<Vec<Field>, GraphError> {
        match value {
            Value::Int(v) => Ok(vec![Field::Int32(*v)]),
            other => Err(unsupported(self.name(), other)),
        }
    }

    fn deserialise(&self, fields: &[Field]) -> Result<Option<Value>, GraphError> {
        Ok(match fields {
            [Field::Int32(v)] => Some(Value::Int(*v)),
            _ => None,
        })
    }

    fn preserves_ordering(&self) -> bool {
        true
    }

    fn column_schema(&self, column: &str) -> String {
        format!("optional int32 {};", column)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanSerialiser;

impl PropertySerialiser for BooleanSerialiser {
    fn name(&self) -> &'static str {
        CLASS_BOOLEAN
    }

    fn can_handle(&self, class: &str) -> bool {
        class == CLASS_BOOLEAN
    }

    fn serialise(&self, value: &Value) -> Result<Vec<Field>, GraphError> {
        match value {
            Value::Bool(v) => Ok(vec![Field::Boolean(*v)]),
            other => Err(unsupported(self.name(), other)),
        }
    }

    fn deserialise(&self, fields: &[Field]) -> Result<Option<Value>, GraphError> {
        Ok(match fields {
            [Field::Boolean(v)] => Some(Value::Bool(*v)),
            _ => None,
        })
    }

    fn preserves_ordering(&self) -> bool {
        true
    }

    fn column_schema(&self, column: &str) -> String {
        format!("optional boolean {};", column)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DoubleSerialiser;

impl PropertySerialiser for DoubleSerialiser {
    fn name(&self) -> &'static str {
        CLASS_DOUBLE
    }

    fn can_handle(&self, class: &str) -> bool {
        class == CLASS_DOUBLE
    }

    fn serialise(&self, value: &Value) -> Result<Vec<Field>, GraphError> {
        match value {
            Value::Double(v) => Ok(vec![Field::Float64(*v)]),
            other => Err(unsupported(self.name(), other)),
        }
    }

    fn deserialise(&self, fields: &[Field]) -> Result<Option<Value>, GraphError> {
        Ok(match fields {
            [Field::Float64(v)] => Some(Value::Double(*v)),
            _ => None,
        })
    }

    // NaN has no place in a total order.
    fn preserves_ordering(&self) -> bool {
        false
    }

    fn column_schema(&self, column: &str) -> String {
        format!("optional double {};", column)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Ordered set of serialisers, looked up by name or by class.
pub struct SerialiserRegistry {
    serialisers: Vec<Box<dyn PropertySerialiser>>,
}

impl std::fmt::Debug for SerialiserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.serialisers.iter().map(|s| s.name()))
            .finish()
    }
}

impl SerialiserRegistry {
    /// An empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            serialisers: Vec::new(),
        }
    }

    /// Register a serialiser. Later registrations do not shadow earlier ones
    /// in `find`.
    #[must_use]
    pub fn with(mut self, serialiser: impl PropertySerialiser + 'static) -> Self {
        self.serialisers.push(Box::new(serialiser));
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn PropertySerialiser> {
        self.serialisers
            .iter()
            .find(|s| s.name() == name)
            .map(|s| &**s)
    }

    /// First serialiser able to handle `class`.
    #[must_use]
    pub fn find(&self, class: &str) -> Option<&dyn PropertySerialiser> {
        self.serialisers
            .iter()
            .find(|s| s.can_handle(class))
            .map(|s| &**s)
    }
}

impl Default for SerialiserRegistry {
    /// Every built-in serialiser.
    fn default() -> Self {
        Self::empty()
            .with(StringSerialiser)
            .with(LongSerialiser)
            .with(IntegerSerialiser)
            .with(BooleanSerialiser)
            .with(DoubleSerialiser)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_serialiser_writes_one_utf8_column() {
        let s = StringSerialiser;
        assert_eq!(
            s.serialise(&Value::from("abc")).expect("serialise"),
            vec![Field::Utf8("abc".into())]
        );
        assert_eq!(
            s.deserialise(&[Field::Utf8("abc".into())]).expect("deserialise"),
            Some(Value::from("abc"))
        );
        assert_eq!(s.column_schema("name"), "optional binary name (UTF8);");
        assert!(s.preserves_ordering());
    }

    #[test]
    fn unexpected_shapes_decode_to_none() {
        let s = StringSerialiser;
        assert_eq!(s.deserialise(&[]).expect("deserialise"), None);
        assert_eq!(s.deserialise(&[Field::Int64(1)]).expect("deserialise"), None);
        assert_eq!(s.deserialise_empty(), None);
        assert!(s.serialise_null().is_empty());
    }

    #[test]
    fn serialisers_reject_other_classes() {
        assert!(StringSerialiser.serialise(&Value::Long(1)).is_err());
        assert!(LongSerialiser.serialise(&Value::Int(1)).is_err());
    }

    #[test]
    fn registry_resolves_by_class() {
        let registry = SerialiserRegistry::default();
        for class in [CLASS_STRING, CLASS_LONG, CLASS_INTEGER, CLASS_BOOLEAN, CLASS_DOUBLE] {
            assert!(registry.find(class).is_some(), "{}", class);
        }
        assert!(registry.find("date").is_none());
        assert!(SerialiserRegistry::empty().find(CLASS_STRING).is_none());
    }
}
