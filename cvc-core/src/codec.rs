//! Canonical serialization and hashing.
//!
//! Two values are semantically equal iff their canonical bytes are
//! byte-equal, so every hash in the system goes through this single codec.
//! Canonical form: compact JSON, keys in lexicographic order, strings in
//! Unicode NFC, absent optional fields omitted entirely.

use serde::Serialize;
use serde_json::Value;
use unicode_normalization::UnicodeNormalization;

use crate::error::{CvcError, Result};
use crate::model::Digest;

/// Serialize a value to its canonical byte form.
///
/// Optional fields must be omitted rather than set to null; a null anywhere
/// in the tree means a non-representable value (such as a non-finite float)
/// leaked in, and is rejected as an encoding error.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let tree = serde_json::to_value(value)?;
    let tree = normalize(tree)?;
    Ok(serde_json::to_vec(&tree)?)
}

/// SHA-256 of the canonical bytes of a value
pub fn canonical_digest<T: Serialize>(value: &T) -> Result<Digest> {
    Ok(Digest::from_data(&canonical_bytes(value)?))
}

/// Lowercase 64-hex SHA-256 of raw bytes
pub fn sha256_hex(data: &[u8]) -> String {
    Digest::from_data(data).to_hex()
}

// serde_json's default map representation is a BTreeMap, so emitting the
// normalized tree yields lexicographic key order and shortest round-trip
// numerals without further work here.
fn normalize(value: Value) -> Result<Value> {
    match value {
        Value::Null => Err(CvcError::Encoding(
            "null is not representable in canonical form".into(),
        )),
        Value::String(s) => Ok(Value::String(s.nfc().collect())),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(CvcError::Encoding(format!("non-finite number {f}")));
                }
            }
            Ok(Value::Number(n))
        }
        Value::Array(items) => Ok(Value::Array(
            items.into_iter().map(normalize).collect::<Result<_>>()?,
        )),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(k.nfc().collect(), normalize(v)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommitMetadata, ContentBlob, Message, Mode, Role};

    #[test]
    fn test_empty_blob_canonical_form() {
        let blob = ContentBlob::default();
        let bytes = canonical_bytes(&blob).unwrap();
        assert_eq!(bytes, br#"{"messages":[]}"#);
    }

    #[test]
    fn test_semantic_equality_hashes_identically() {
        let b1 = ContentBlob {
            messages: vec![Message::new(Role::User, "hi")],
            ..Default::default()
        };
        let b2 = b1.clone();
        assert_eq!(
            canonical_digest(&b1).unwrap(),
            canonical_digest(&b2).unwrap()
        );
    }

    #[test]
    fn test_nfc_normalization() {
        // "é" composed (U+00E9) vs decomposed (U+0065 U+0301)
        let composed = ContentBlob {
            messages: vec![Message::new(Role::User, "caf\u{00e9}")],
            ..Default::default()
        };
        let decomposed = ContentBlob {
            messages: vec![Message::new(Role::User, "cafe\u{0301}")],
            ..Default::default()
        };
        assert_eq!(
            canonical_digest(&composed).unwrap(),
            canonical_digest(&decomposed).unwrap()
        );
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let mut meta = CommitMetadata::new("agent", Mode::Unknown, "msg");
        meta.timestamp_seconds = f64::NAN;
        assert!(matches!(
            canonical_bytes(&meta),
            Err(CvcError::Encoding(_))
        ));
    }

    #[test]
    fn test_keys_sorted_and_compact() {
        let blob = ContentBlob {
            messages: vec![],
            token_count: Some(7),
            reasoning_trace: Some("t".into()),
            ..Default::default()
        };
        let s = String::from_utf8(canonical_bytes(&blob).unwrap()).unwrap();
        assert_eq!(s, r#"{"messages":[],"reasoning_trace":"t","token_count":7}"#);
    }
}
