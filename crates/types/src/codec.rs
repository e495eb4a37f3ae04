//! Defines the canonical JSON codec and content identity for all durable data.
//!
//! Every record the kernel persists or hashes goes through RFC 8785 canonical
//! JSON (`serde_jcs`): mapping keys are sorted lexicographically, insignificant
//! whitespace is stripped, and number formatting is deterministic. Hashing the
//! canonical bytes with SHA-256 yields the single source of content identity
//! used for event self-hashes, chain links, and the organization fingerprint.

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serializes a value into its canonical RFC 8785 byte representation.
///
/// Two structurally equal values always produce identical bytes, regardless
/// of key order or formatting in any intermediate representation.
pub fn canonical_bytes<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    serde_jcs::to_vec(v).map_err(|e| CodecError::Canonicalize(e.to_string()))
}

/// Computes the hex-encoded SHA-256 digest of a value's canonical form.
pub fn content_hash<T: Serialize>(v: &T) -> Result<String, CodecError> {
    let bytes = canonical_bytes(v)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Computes the hex-encoded SHA-256 digest of raw bytes.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Decodes a value from a JSON byte slice, failing fast on malformed input.
pub fn from_json_bytes<T: DeserializeOwned>(b: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(b).map_err(|e| CodecError::Decode(e.to_string()))
}

/// Encodes a value as plain (non-canonical) pretty JSON for human-facing files.
pub fn to_json_pretty<T: Serialize>(v: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec_pretty(v).map_err(|e| CodecError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_bytes_normalize_key_order() {
        let a = json!({"b": 1, "a": [2, 1]});
        let b = json!({"a": [2, 1], "b": 1});

        let ca = canonical_bytes(&a).unwrap();
        let cb = canonical_bytes(&b).unwrap();
        assert_eq!(ca, cb);

        // JCS implies keys are sorted: {"a":[2,1],"b":1}
        let s = String::from_utf8(ca).unwrap();
        assert!(s.starts_with(r#"{"a""#));
    }

    #[test]
    fn content_hash_is_stable_across_copies() {
        let v = json!({"nested": {"z": 1, "y": [true, null]}, "k": "v"});
        let copy = v.clone();
        assert_eq!(content_hash(&v).unwrap(), content_hash(&copy).unwrap());
    }

    #[test]
    fn content_hash_differs_on_value_change() {
        let a = json!({"k": 1});
        let b = json!({"k": 2});
        assert_ne!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
    }
}
