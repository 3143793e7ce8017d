//! Consensus parameters fixed at build time (§6).

use num_bigint::BigInt;
use num_rational::BigRational;
use serde::{Deserialize, Serialize};

/// Depth of the `RecentTimestamps` ring kept on every `BlockNode`.
pub const RECENT_TIMESTAMPS_DEPTH: usize = 11;

/// The constants a conforming engine instance fixes at build time.
///
/// Mirrors the role `NetworkParams` played in the teacher's blockchain:
/// one struct, constructed once, threaded through every component that
/// needs a tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Seconds a block's timestamp may sit ahead of wall-clock `now`
    /// before it is held in the future pool instead of validated.
    pub future_threshold_secs: i64,
    /// Window (in blocks) over which difficulty retarget measures elapsed
    /// time.
    pub target_window: u64,
    /// Desired seconds between blocks.
    pub target_seconds_per_block: u64,
    /// Maximum upward adjustment factor per retarget, e.g. 4/1.
    pub max_adjustment_up: BigRational,
    /// Maximum downward adjustment factor per retarget, e.g. 1/4.
    pub max_adjustment_down: BigRational,
    /// Hysteresis margin a competing branch must exceed the current tip
    /// by before a reorg is triggered, e.g. 5/100.
    pub surpass_threshold: BigRational,
    /// Fixed per-block inflation added to the miner subsidy.
    pub coin_inflation: u64,
    /// Depth of the recent-timestamps ring; always 11 per §6, exposed as
    /// a field rather than hardcoded so tests can shrink it.
    pub recent_timestamps_depth: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            future_threshold_secs: 3 * 60 * 60,
            target_window: 144,
            target_seconds_per_block: 600,
            max_adjustment_up: BigRational::new(BigInt::from(4), BigInt::from(1)),
            max_adjustment_down: BigRational::new(BigInt::from(1), BigInt::from(4)),
            surpass_threshold: BigRational::new(BigInt::from(5), BigInt::from(100)),
            coin_inflation: 1,
            recent_timestamps_depth: RECENT_TIMESTAMPS_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_are_sane() {
        let params = ConsensusParams::default();
        assert_eq!(params.recent_timestamps_depth, 11);
        assert!(params.max_adjustment_up > BigRational::from_integer(BigInt::from(1)));
        assert!(params.max_adjustment_down < BigRational::from_integer(BigInt::from(1)));
    }
}
