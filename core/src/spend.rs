//! Unlock policy for an output (§3 `SpendConditions`).

use crate::types::{Height, Timestamp};
use serde::{Deserialize, Serialize};
use shared::Hash256;
use shared::{encode, PublicKey};

/// Ordered public keys plus a signature threshold and a time lock; hashed
/// into an output's `SpendHash` to form a coin address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendConditions {
    /// The height at or below which this condition is spendable.
    pub time_lock: Height,
    /// Number of distinct signatures required to authorize a spend.
    pub num_signatures: u32,
    /// Candidate public keys, in a fixed order referenced by
    /// `PublicKeyIndex` in signature records.
    pub public_keys: Vec<PublicKey>,
}

impl SpendConditions {
    /// Hashes these conditions into the address an output locks to.
    ///
    /// # Errors
    ///
    /// Returns error if the conditions fail to encode.
    pub fn spend_hash(&self) -> shared::Result<Hash256> {
        let bytes = encode(self)?;
        Ok(Hash256::keccak256(&bytes))
    }
}

/// Timestamp comparable against `SpendConditions.time_lock`; a no-op alias
/// kept distinct from `Timestamp` in signature docs for clarity.
pub type TimeLock = Timestamp;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_hash_is_deterministic() {
        let conditions = SpendConditions {
            time_lock: 0,
            num_signatures: 1,
            public_keys: vec![],
        };
        assert_eq!(
            conditions.spend_hash().unwrap(),
            conditions.spend_hash().unwrap()
        );
    }

    #[test]
    fn test_spend_hash_changes_with_time_lock() {
        let a = SpendConditions {
            time_lock: 0,
            num_signatures: 1,
            public_keys: vec![],
        };
        let b = SpendConditions {
            time_lock: 5,
            num_signatures: 1,
            public_keys: vec![],
        };
        assert_ne!(a.spend_hash().unwrap(), b.spend_hash().unwrap());
    }
}
