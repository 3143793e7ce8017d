//! Blocks and the §4.2 header validator.

use crate::config::ConsensusParams;
use crate::error::{ConsensusError, Result};
use crate::transaction::Transaction;
use crate::types::{BlockID, Target, Timestamp};
use serde::{Deserialize, Serialize};
use shared::{encode, merkle_root, Hash256};

/// A unit of consensus (§3). `Nonce` is whatever mined bits a miner
/// varies to search for a hash meeting the parent's `Target`; the engine
/// treats it as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub parent_block: BlockID,
    pub timestamp: Timestamp,
    pub nonce: u64,
    pub miner_address: Hash256,
    pub merkle_root: Hash256,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Canonical encoding, used for `blockID` and as the parent reference
    /// of whatever block follows.
    ///
    /// # Errors
    ///
    /// Returns error if the block fails to encode.
    pub fn encode(&self) -> shared::Result<Vec<u8>> {
        encode(self)
    }

    /// `blockID(b) = hash(encode(b))` (§6).
    ///
    /// # Errors
    ///
    /// Returns error if the block fails to encode.
    pub fn id(&self) -> shared::Result<BlockID> {
        Ok(Hash256::keccak256(&self.encode()?))
    }

    /// Recomputes the Merkle root over this block's transaction hashes.
    ///
    /// # Errors
    ///
    /// Returns error if any transaction fails to encode.
    pub fn compute_merkle_root(&self) -> shared::Result<Hash256> {
        let leaves = self
            .transactions
            .iter()
            .map(|tx| tx.encode().map(|b| Hash256::keccak256(&b)))
            .collect::<shared::Result<Vec<_>>>()?;
        Ok(merkle_root(&leaves))
    }
}

/// Inputs a header validation needs from the parent node, kept separate
/// from `BlockNode` so the validator doesn't depend on the block tree
/// (§4.2).
pub struct HeaderContext<'a> {
    pub parent_target: &'a Target,
    /// Parent's ring of the last `RecentTimestampsDepth` applied
    /// timestamps, in insertion order (oldest could be anywhere; the
    /// validator sorts internally).
    pub parent_recent_timestamps: &'a [Timestamp],
}

/// Validates a candidate block's header against its parent (§4.2).
/// Distinguishes future-skew (hold for retry) from permanent failures
/// (mark `BadBlocks`) so the caller can route accordingly.
///
/// # Errors
///
/// Returns `ConsensusError::FutureBlock` for a timestamp too far ahead of
/// `now`, or `ConsensusError::InvalidBlockPermanent` for a bad past-median
/// timestamp, bad Merkle root, or failed proof of work.
pub fn validate_header(
    block: &Block,
    ctx: &HeaderContext<'_>,
    now: Timestamp,
    params: &ConsensusParams,
) -> Result<()> {
    let block_id = block.id()?;

    // Future skew: not permanent, caller re-queues in the future pool.
    if block.timestamp - now > params.future_threshold_secs {
        return Err(ConsensusError::FutureBlock(block_id));
    }

    // Past skew: strictly greater than the median of the last 11 applied
    // timestamps (index 5 of 11, sorted).
    if !ctx.parent_recent_timestamps.is_empty() {
        let mut sorted = ctx.parent_recent_timestamps.to_vec();
        sorted.sort_unstable();
        let median = sorted[sorted.len() / 2];
        if block.timestamp <= median {
            return Err(ConsensusError::InvalidBlockPermanent {
                id: block_id,
                reason: "timestamp does not exceed median of parent's recent timestamps"
                    .to_string(),
            });
        }
    }

    // Merkle root.
    let computed = block.compute_merkle_root()?;
    if computed != block.merkle_root {
        return Err(ConsensusError::InvalidBlockPermanent {
            id: block_id,
            reason: "merkle root mismatch".to_string(),
        });
    }

    // Proof of work: block id <= parent's target, both big-endian.
    if !ctx.parent_target.meets(&block_id) {
        return Err(ConsensusError::InvalidBlockPermanent {
            id: block_id,
            reason: "block id exceeds parent target".to_string(),
        });
    }

    Ok(())
}

/// Derives the genesis block's subsidy-output id the same way any other
/// block's would be derived (§6 `subsidyID`).
#[must_use]
pub fn subsidy_id(block_id: BlockID) -> Hash256 {
    let mut data = Vec::with_capacity(32 + 8);
    data.extend_from_slice(block_id.as_bytes());
    data.extend_from_slice(b"subsidy");
    Hash256::keccak256(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block(parent: Hash256, timestamp: Timestamp) -> Block {
        Block {
            parent_block: parent,
            timestamp,
            nonce: 0,
            miner_address: Hash256::keccak256(b"miner"),
            merkle_root: merkle_root(&[]),
            transactions: vec![],
        }
    }

    #[test]
    fn test_future_block_is_held_not_rejected_permanently() {
        let block = sample_block(Hash256::zero(), 10_000_000);
        let ctx = HeaderContext {
            parent_target: &Target::max(),
            parent_recent_timestamps: &[],
        };
        let result = validate_header(&block, &ctx, 0, &ConsensusParams::default());
        assert!(matches!(result, Err(ConsensusError::FutureBlock(_))));
    }

    #[test]
    fn test_past_median_timestamp_is_permanent() {
        let block = sample_block(Hash256::zero(), 5);
        let ctx = HeaderContext {
            parent_target: &Target::max(),
            parent_recent_timestamps: &[10, 10, 10, 10, 10, 10, 10, 10, 10, 10, 10],
        };
        let result = validate_header(&block, &ctx, 5, &ConsensusParams::default());
        assert!(matches!(
            result,
            Err(ConsensusError::InvalidBlockPermanent { .. })
        ));
    }

    #[test]
    fn test_bad_merkle_root_is_permanent() {
        let mut block = sample_block(Hash256::zero(), 100);
        block.merkle_root = Hash256::keccak256(b"wrong");
        let ctx = HeaderContext {
            parent_target: &Target::max(),
            parent_recent_timestamps: &[],
        };
        let result = validate_header(&block, &ctx, 0, &ConsensusParams::default());
        assert!(matches!(
            result,
            Err(ConsensusError::InvalidBlockPermanent { .. })
        ));
    }

    #[test]
    fn test_valid_header_passes() {
        let block = sample_block(Hash256::zero(), 100);
        let ctx = HeaderContext {
            parent_target: &Target::max(),
            parent_recent_timestamps: &[],
        };
        assert!(validate_header(&block, &ctx, 0, &ConsensusParams::default()).is_ok());
    }
}
