//! Canonical JSON encoding used for content-addressed hashing.
//!
//! Frame buckets are named by the SHA-256 of their canonical JSON
//! representation (spec §4.7, §8 "re-hashing a frame bucket's frames
//! produces the same hash"). `serde_json` does not guarantee stable key
//! ordering for maps, so we re-serialize through a sorted `Value` tree
//! before hashing or writing a bucket to disk.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Recursively sort object keys so two structurally-equal values always
/// produce byte-identical output.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Serialize `value` to canonical JSON bytes (sorted keys, no
/// insignificant whitespace).
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let raw = serde_json::to_value(value)?;
    let sorted = canonicalize(raw);
    Ok(serde_json::to_vec(&sorted)?)
}

/// Compute the lowercase hex SHA-256 digest of `value`'s canonical JSON.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String> {
    let bytes = canonical_bytes(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let b = json!({"a": 2, "c": {"y": 2, "z": 1}, "b": 1});
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }

    #[test]
    fn differing_values_hash_differently() {
        let a = json!({"counter": 5});
        let b = json!({"counter": 6});
        assert_ne!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }
}
