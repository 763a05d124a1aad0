//! Canonical JSON and content hashing of unit configuration.
//!
//! Object keys are sorted by UTF-16 code units (RFC 8785 §3.2.3) and the
//! result is emitted compactly, so two configurations that differ only in
//! key order hash identically.

use resource_layer::ContentHash;
use serde::Serialize;

use crate::domain::error::{Result, SynthError};

/// Recursively sort JSON object keys using UTF-16 code unit ordering.
fn sort_keys_utf16(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_by(|a, b| a.encode_utf16().cmp(b.encode_utf16()));

            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), sort_keys_utf16(&map[key.as_str()]));
            }
            serde_json::Value::Object(sorted)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(sort_keys_utf16).collect())
        }
        other => other.clone(),
    }
}

/// Reject fractional numbers: unit configuration is integral by construction
/// and float formatting is not stable enough to hash.
fn reject_floats(value: &serde_json::Value) -> Result<()> {
    match value {
        serde_json::Value::Number(n) if !(n.is_i64() || n.is_u64()) => Err(SynthError::Config(
            format!("non-integer number {n} in hashed configuration"),
        )),
        serde_json::Value::Object(map) => map.values().try_for_each(reject_floats),
        serde_json::Value::Array(items) => items.iter().try_for_each(reject_floats),
        _ => Ok(()),
    }
}

/// Serialize `value` to canonical compact JSON.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    reject_floats(&value)?;
    Ok(serde_json::to_string(&sort_keys_utf16(&value))?)
}

/// SHA-256 content hash of the canonical JSON form of `value`.
pub fn content_hash<T: Serialize>(value: &T) -> Result<ContentHash> {
    let canonical = canonical_json(value)?;
    Ok(ContentHash::from_bytes(canonical.as_bytes()))
}
