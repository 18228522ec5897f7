//! Error types shared across the workspace.
//!
//! Two shapes of failure exist:
//!
//! - [`ErrorDetail`]: a recoverable, structured validation error tree whose shape
//!   mirrors the submitted payload, so each message can be attributed to the
//!   originating field.
//! - [`Error`]: everything that aborts an operation (configuration mistakes,
//!   integrity violations inside a transaction, misuse of the API).

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Result type alias for NestModel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the session, the serializer and the observer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Payload validation failed; the tree mirrors the payload.
    #[error("validation failed: {0}")]
    Validation(ErrorDetail),

    /// Fatal setup error (bad schema declaration, missing schema, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// A row referenced by primary key does not exist.
    #[error("{model} with pk {pk} does not exist")]
    NotFound {
        /// Model name.
        model: String,
        /// Primary key that was looked up.
        pk: i64,
    },

    /// A constraint (not-null, unique, foreign key, restrict) was violated.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// The model is not registered.
    #[error("unknown model `{0}`")]
    UnknownModel(String),

    /// The field does not exist on the model.
    #[error("unknown field `{field}` on model `{model}`")]
    UnknownField {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
    },

    /// The API was used out of order (e.g. `save` before `is_valid`).
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Build an integrity error from any displayable message.
    pub fn integrity(msg: impl fmt::Display) -> Self {
        Error::Integrity(msg.to_string())
    }

    /// Build a configuration error from any displayable message.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// True if this is a validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Structured validation error tree.
///
/// Serializes the same way a REST framework reports errors:
///
/// ```json
/// {"nested": [{}, {"id": ["Invalid pk \"99\" - object does not exist."]}]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    /// Messages attached to a single field (or `non_field_errors`).
    Messages(Vec<String>),
    /// Per-field errors of a mapping payload.
    Dict(BTreeMap<String, ErrorDetail>),
    /// Per-item errors of a list payload; valid items are an empty `Dict`.
    List(Vec<ErrorDetail>),
}

/// Key used for errors that are not attributable to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

impl ErrorDetail {
    /// A single message.
    pub fn message(msg: impl Into<String>) -> Self {
        ErrorDetail::Messages(vec![msg.into()])
    }

    /// An empty mapping (no errors).
    #[must_use]
    pub fn empty() -> Self {
        ErrorDetail::Dict(BTreeMap::new())
    }

    /// A mapping error with a single non-field message.
    pub fn non_field(msg: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(NON_FIELD_ERRORS.to_string(), ErrorDetail::message(msg));
        ErrorDetail::Dict(map)
    }

    /// True if the tree carries no message at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            ErrorDetail::Messages(m) => m.is_empty(),
            ErrorDetail::Dict(d) => d.values().all(ErrorDetail::is_empty),
            ErrorDetail::List(l) => l.iter().all(ErrorDetail::is_empty),
        }
    }

    /// Look up the detail for a field of a mapping error.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&ErrorDetail> {
        match self {
            ErrorDetail::Dict(d) => d.get(name),
            _ => None,
        }
    }

    /// Look up the detail for an item of a list error.
    #[must_use]
    pub fn item(&self, index: usize) -> Option<&ErrorDetail> {
        match self {
            ErrorDetail::List(l) => l.get(index),
            _ => None,
        }
    }

    /// Flatten every message with its dotted path (`nested.1.id`).
    #[must_use]
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.flatten_into(String::new(), &mut out);
        out
    }

    fn flatten_into(&self, prefix: String, out: &mut Vec<(String, String)>) {
        match self {
            ErrorDetail::Messages(msgs) => {
                for m in msgs {
                    out.push((prefix.clone(), m.clone()));
                }
            }
            ErrorDetail::Dict(map) => {
                for (k, v) in map {
                    let path = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    v.flatten_into(path, out);
                }
            }
            ErrorDetail::List(items) => {
                for (i, v) in items.iter().enumerate() {
                    let path = if prefix.is_empty() {
                        i.to_string()
                    } else {
                        format!("{prefix}.{i}")
                    };
                    v.flatten_into(path, out);
                }
            }
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

impl From<ErrorDetail> for Error {
    fn from(detail: ErrorDetail) -> Self {
        Error::Validation(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_detail_serializes_like_payload() {
        let mut item = BTreeMap::new();
        item.insert(
            "id".to_string(),
            ErrorDetail::message("Invalid pk \"99\" - object does not exist."),
        );
        let mut top = BTreeMap::new();
        top.insert(
            "nested".to_string(),
            ErrorDetail::List(vec![ErrorDetail::empty(), ErrorDetail::Dict(item)]),
        );
        let detail = ErrorDetail::Dict(top);

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(
            json,
            json!({"nested": [{}, {"id": ["Invalid pk \"99\" - object does not exist."]}]})
        );
    }

    #[test]
    fn test_error_detail_is_empty() {
        assert!(ErrorDetail::empty().is_empty());
        assert!(ErrorDetail::List(vec![ErrorDetail::empty()]).is_empty());
        assert!(!ErrorDetail::non_field("boom").is_empty());
    }

    #[test]
    fn test_error_detail_flatten_paths() {
        let mut inner = BTreeMap::new();
        inner.insert("name".to_string(), ErrorDetail::message("bad"));
        let mut top = BTreeMap::new();
        top.insert(
            "nested".to_string(),
            ErrorDetail::List(vec![ErrorDetail::empty(), ErrorDetail::Dict(inner)]),
        );
        let flat = ErrorDetail::Dict(top).flatten();
        assert_eq!(flat, vec![("nested.1.name".to_string(), "bad".to_string())]);
    }

    #[test]
    fn test_error_display() {
        let err = Error::NotFound {
            model: "Hero".to_string(),
            pk: 4,
        };
        assert_eq!(err.to_string(), "Hero with pk 4 does not exist");
        assert!(Error::from(ErrorDetail::non_field("x")).is_validation());
    }
}
