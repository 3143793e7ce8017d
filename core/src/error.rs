//! Error categories for the consensus engine.

use shared::Hash256;
use thiserror::Error;

/// Errors produced by the consensus engine's public operations.
///
/// Variants map directly onto the error-kind table: each carries enough
/// context to reconstruct why a call failed without the caller needing to
/// re-derive it from logs.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Parent not yet observed. Not marked bad; held for retry in the
    /// orphan pool.
    #[error("orphan block {0}, parent not yet known")]
    OrphanBlock(Hash256),

    /// Timestamp too far ahead of wall clock. Held for retry in the future
    /// pool.
    #[error("block {0} timestamp too far in the future")]
    FutureBlock(Hash256),

    /// Bad merkle root, past-median timestamp, or failed proof of work.
    /// Permanent: the id is recorded in `BadBlocks`.
    #[error("block {0} permanently invalid: {reason}")]
    InvalidBlockPermanent { id: Hash256, reason: String },

    /// Any §4.1 transaction validation failure.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// One of the transaction's inputs is already reserved by another
    /// pooled transaction.
    #[error("mempool conflict on output {0}")]
    MempoolConflict(Hash256),

    /// The id is already present in `BlockMap` or `BadBlocks`.
    #[error("{0} already known")]
    AlreadyKnown(Hash256),

    /// A block that once applied cleanly failed to re-apply during a
    /// reorg. Contradicts the invertibility invariant; callers must treat
    /// this as a crash, not a recoverable error.
    #[error("internal invariant violated while re-applying {0}: {1}")]
    InternalInvariant(Hash256, String),

    /// Wraps a lower-level cryptography/encoding failure.
    #[error(transparent)]
    Crypto(#[from] shared::BlockchainError),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
