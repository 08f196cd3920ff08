//! Masking of sensitive payload fields
//!
//! Any object key whose lowercase form contains a denylisted fragment has
//! its value replaced by [`MASK`], at every depth, including inside arrays.
//! Masking is one-way; the original value is never stored.

use serde_json::{json, Map, Value};
use tracing::warn;

/// Replacement written over sensitive values
pub const MASK: &str = "*** MASQUÉ ***";

/// Lowercase key fragments that mark a field as sensitive
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "motdepasse",
    "token",
    "apikey",
    "secret",
    "creditcard",
    "cartecredit",
    "cvv",
    "cardnumber",
    "numerocarte",
    "expirationdate",
    "dateexpiration",
];

/// Nesting depth beyond which a payload is not recorded
const MAX_DEPTH: usize = 64;

/// Marker stored when a payload cannot be recorded
pub fn unavailable() -> Value {
    json!({ "erreur": "Données non disponibles" })
}

pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|field| key.contains(field))
}

/// Return a masked deep copy of `payload`; a missing payload becomes `{}`
pub fn sanitize(payload: Option<&Value>) -> Value {
    match payload {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(value) => match mask(value, 0) {
            Some(clean) => clean,
            None => {
                warn!(max_depth = MAX_DEPTH, "History payload nested too deeply, not recorded");
                unavailable()
            }
        },
    }
}

fn mask(value: &Value, depth: usize) -> Option<Value> {
    if depth > MAX_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            let mut clean = Map::with_capacity(map.len());
            for (key, val) in map {
                let masked = if is_sensitive_key(key) {
                    Value::String(MASK.to_string())
                } else {
                    mask(val, depth + 1)?
                };
                clean.insert(key.clone(), masked);
            }
            Some(Value::Object(clean))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| mask(item, depth + 1))
            .collect::<Option<Vec<_>>>()
            .map(Value::Array),
        other => Some(other.clone()),
    }
}
