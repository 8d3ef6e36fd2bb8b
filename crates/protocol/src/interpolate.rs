//! Recursive linear interpolation over field trees
//!
//! A default interpolator for entities whose state is a tree of named
//! fields with numeric leaves: numeric leaves are combined linearly,
//! object nodes are recursed into, and everything else is rejected. The
//! two trees must match structurally.
//!
//! The walker operates on `serde_json::Value`, which any serde-derived
//! state can be converted through; `interpolate_states` does both
//! conversions. Entities with a known schema are usually better served by
//! lerping their fields directly in `SyncedEntity::interpolate`; the
//! walker is a convenience, not a requirement.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors from the field-tree interpolator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterpolationError {
    /// A leaf was not a number, or the two trees disagreed structurally
    /// at this field.
    #[error("field `{path}` is not interpolable: {detail}")]
    NonInterpolableField {
        /// Dotted path to the offending field (empty string for the root).
        path: String,
        /// What was found there.
        detail: String,
    },

    /// A state could not be represented as a field tree at all.
    #[error("state is not representable as a field tree: {0}")]
    NotAFieldTree(String),
}

/// Linearly interpolates two field trees.
///
/// Numeric leaves become `a + (b - a) * ratio`; object nodes are walked
/// recursively and must carry the same field set on both sides.
pub fn interpolate_fields(a: &Value, b: &Value, ratio: f64) -> Result<Value, InterpolationError> {
    interpolate_at_path(a, b, ratio, String::new())
}

/// Interpolates two serde-representable states through their field trees.
///
/// Convenience wrapper over [`interpolate_fields`] for use inside
/// `SyncedEntity::interpolate` implementations.
pub fn interpolate_states<S>(a: &S, b: &S, ratio: f64) -> Result<S, InterpolationError>
where
    S: Serialize + DeserializeOwned,
{
    let a = serde_json::to_value(a).map_err(|e| InterpolationError::NotAFieldTree(e.to_string()))?;
    let b = serde_json::to_value(b).map_err(|e| InterpolationError::NotAFieldTree(e.to_string()))?;
    let mixed = interpolate_fields(&a, &b, ratio)?;
    serde_json::from_value(mixed).map_err(|e| InterpolationError::NotAFieldTree(e.to_string()))
}

fn interpolate_at_path(
    a: &Value,
    b: &Value,
    ratio: f64,
    path: String,
) -> Result<Value, InterpolationError> {
    match (a, b) {
        (Value::Number(from), Value::Number(to)) => {
            let from = from.as_f64().ok_or_else(|| non_interpolable(&path, "non-finite number"))?;
            let to = to.as_f64().ok_or_else(|| non_interpolable(&path, "non-finite number"))?;
            let mixed = from + (to - from) * ratio;
            serde_json::Number::from_f64(mixed)
                .map(Value::Number)
                .ok_or_else(|| non_interpolable(&path, "interpolation produced a non-finite number"))
        }
        (Value::Object(from), Value::Object(to)) => {
            if from.len() != to.len() || from.keys().any(|k| !to.contains_key(k)) {
                return Err(non_interpolable(&path, "field sets differ between the two states"));
            }
            let mut mixed = serde_json::Map::with_capacity(from.len());
            for (key, a_child) in from {
                let b_child = &to[key];
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                mixed.insert(
                    key.clone(),
                    interpolate_at_path(a_child, b_child, ratio, child_path)?,
                );
            }
            Ok(Value::Object(mixed))
        }
        (a, b) => {
            let detail = format!("expected numeric leaves, found {} and {}", kind(a), kind(b));
            Err(non_interpolable(&path, &detail))
        }
    }
}

fn non_interpolable(path: &str, detail: &str) -> InterpolationError {
    InterpolationError::NonInterpolableField {
        path: path.to_owned(),
        detail: detail.to_owned(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
