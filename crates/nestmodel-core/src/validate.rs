//! Column-level validation.
//!
//! [`validate_column`] checks one payload value against a [`FieldInfo`] and
//! returns either the coerced value or the list of messages to report for it.

use std::collections::HashMap;
use std::sync::{OnceLock, PoisonError, RwLock};

use regex::Regex;

use crate::field::FieldInfo;
use crate::value::Value;

/// Message for a NULL sent to a non-nullable field.
pub const MSG_NOT_NULL: &str = "This field may not be null.";
/// Message for a required field missing from the payload.
pub const MSG_REQUIRED: &str = "This field is required.";
/// Message for an empty string sent to a non-blank text field.
pub const MSG_BLANK: &str = "This field may not be blank.";
/// Message for a text value rejected by the field's pattern.
pub const MSG_PATTERN: &str = "This value does not match the required pattern.";

/// Thread-safe regex cache for compiled patterns.
///
/// Patterns are compiled lazily on first use and cached for the lifetime
/// of the program.
struct RegexCache {
    cache: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_compile(&self, pattern: &str) -> Result<Regex, regex::Error> {
        {
            let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(regex) = cache.get(pattern) {
                return Ok(regex.clone());
            }
        }

        let regex = Regex::new(pattern)?;
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::new)
}

/// Check if a string matches a regex pattern.
///
/// Returns `false` if the pattern is invalid (logs a warning).
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match regex_cache().get_or_compile(pattern) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            tracing::warn!(
                pattern = pattern,
                error = %e,
                "Invalid regex pattern in validation, treating as non-match"
            );
            false
        }
    }
}

/// Validate a regex pattern up front (used when compiling schemas).
///
/// Returns an error message if the pattern is invalid, None if valid.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    match Regex::new(pattern) {
        Ok(_) => None,
        Err(e) => Some(format!("invalid regex pattern: {e}")),
    }
}

/// Validate a single payload value for a stored column.
///
/// Checks, in order: nullability, type, blank, max length, pattern. Type
/// failures stop further checks; length and pattern failures accumulate.
pub fn validate_column(field: &FieldInfo, value: &Value) -> Result<Value, Vec<String>> {
    if value.is_null() {
        return if field.nullable {
            Ok(Value::Null)
        } else {
            Err(vec![MSG_NOT_NULL.to_string()])
        };
    }

    let Some(sql_type) = field.sql_type() else {
        return Err(vec![format!("Field `{}` is not a column.", field.name)]);
    };
    let Some(coerced) = sql_type.coerce(value) else {
        return Err(vec![sql_type.invalid_message().to_string()]);
    };

    let Value::Text(text) = &coerced else {
        return Ok(coerced);
    };

    if text.is_empty() && !field.blank {
        return Err(vec![MSG_BLANK.to_string()]);
    }

    let mut errors = Vec::new();
    if let Some(max) = field.max_length {
        if text.chars().count() > max {
            errors.push(format!(
                "Ensure this field has no more than {max} characters."
            ));
        }
    }
    if let Some(pattern) = &field.pattern {
        if !text.is_empty() && !matches_pattern(text, pattern) {
            errors.push(MSG_PATTERN.to_string());
        }
    }

    if errors.is_empty() {
        Ok(coerced)
    } else {
        Err(errors)
    }
}
