//! Column value types.

use crate::value::Value;

/// Storage type of a scalar column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlType {
    /// 64-bit integer.
    BigInt,
    /// Text of any length (see `FieldInfo::max_length`).
    #[default]
    Text,
    /// Boolean.
    Bool,
    /// 64-bit float.
    Double,
}

impl SqlType {
    /// Coerce a value into this type, or return `None` if it does not fit.
    ///
    /// Integers widen to `Double`; nothing else converts implicitly.
    #[must_use]
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (SqlType::BigInt, Value::BigInt(_))
            | (SqlType::Text, Value::Text(_))
            | (SqlType::Bool, Value::Bool(_))
            | (SqlType::Double, Value::Double(_)) => Some(value.clone()),
            (SqlType::Double, Value::BigInt(i)) => Some(Value::Double(*i as f64)),
            _ => None,
        }
    }

    /// Message reported when a payload value has the wrong type.
    #[must_use]
    pub const fn invalid_message(&self) -> &'static str {
        match self {
            SqlType::BigInt => "A valid integer is required.",
            SqlType::Text => "Not a valid string.",
            SqlType::Bool => "Must be a valid boolean.",
            SqlType::Double => "A valid number is required.",
        }
    }
}
