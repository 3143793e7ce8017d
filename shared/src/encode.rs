//! Canonical binary encoding used for hashing and signing.

use crate::{BlockchainError, Result};
use serde::Serialize;

/// Serializes a value into the canonical byte representation used for
/// hashing, signing and wire transfer.
///
/// # Errors
///
/// Returns error if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| BlockchainError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Eq, Debug)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn test_encode_is_deterministic_for_same_value() {
        let value = Sample {
            a: 7,
            b: "x".to_string(),
        };
        assert_eq!(encode(&value).unwrap(), encode(&value).unwrap());
    }

    #[test]
    fn test_encode_distinguishes_different_values() {
        let a = Sample {
            a: 1,
            b: "x".to_string(),
        };
        let b = Sample {
            a: 2,
            b: "x".to_string(),
        };
        assert_ne!(encode(&a).unwrap(), encode(&b).unwrap());
    }
}
