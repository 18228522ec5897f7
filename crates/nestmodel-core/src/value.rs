//! Dynamic column values.

use serde::{Deserialize, Serialize};

/// A single column value stored in a row.
///
/// The set of variants is intentionally JSON-shaped: every value round-trips
/// through `serde_json::Value` without loss (integers stay integers).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL NULL.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer (also used for primary and foreign keys).
    BigInt(i64),
    /// 64-bit float.
    Double(f64),
    /// Text.
    Text(String),
}

impl Value {
    /// True for `Value::Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value, if it is one.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of the value, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view of the value, if it is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::BigInt(_) => "int",
            Value::Double(_) => "float",
            Value::Text(_) => "str",
        }
    }

    /// Convert into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::BigInt(i) => serde_json::Value::from(*i),
            Value::Double(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Convert a scalar JSON value.
    ///
    /// Returns `None` for arrays and objects, which are never column values.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::BigInt)
                .or_else(|| n.as_f64().map(Value::Double)),
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

/// JSON type name in the vocabulary used by validation messages.
#[must_use]
pub fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        serde_json::Value::Number(_) => "float",
        serde_json::Value::String(_) => "str",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "dict",
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::BigInt(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion_keeps_integers() {
        assert_eq!(Value::from_json(&json!(3)), Some(Value::BigInt(3)));
        assert_eq!(Value::from_json(&json!(1.5)), Some(Value::Double(1.5)));
        assert_eq!(Value::BigInt(7).to_json(), json!(7));
    }

    #[test]
    fn test_json_conversion_rejects_containers() {
        assert_eq!(Value::from_json(&json!([1])), None);
        assert_eq!(Value::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_option_into_value() {
        let some: Value = Some(5_i64).into();
        let none: Value = Option::<i64>::None.into();
        assert_eq!(some, Value::BigInt(5));
        assert!(none.is_null());
    }

    #[test]
    fn test_json_type_names() {
        assert_eq!(json_type_name(&json!({})), "dict");
        assert_eq!(json_type_name(&json!([])), "list");
        assert_eq!(json_type_name(&json!("x")), "str");
        assert_eq!(json_type_name(&json!(1)), "int");
    }
}
