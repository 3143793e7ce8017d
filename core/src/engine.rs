//! The engine: `AcceptBlock` and `AcceptTransaction`, the only two
//! externally visible operations (§4.10, §5, §6).

use crate::applier::apply_block;
use crate::block::{validate_header, Block, HeaderContext};
use crate::block_tree::{block_weight, heavier_fork, BlockTree};
use crate::config::ConsensusParams;
use crate::consensus_state::{ConsensusState, HeightView};
use crate::error::{ConsensusError, Result};
use crate::fork_choice::fork_blockchain;
use crate::mempool::Mempool;
use crate::transaction::Transaction;
use crate::types::{BlockID, Timestamp};
use shared::Hash256;
use tracing::{info, warn};

/// Everything the engine owns, guarded as one unit (§5: one exclusive
/// lock around each operation's entire body). A real deployment wraps
/// this in a `Mutex`; the type itself carries no locking so it can be
/// driven directly in tests.
pub struct Engine {
    pub tree: BlockTree,
    pub state: ConsensusState,
    pub mempool: Mempool,
    pub params: ConsensusParams,
}

impl Engine {
    /// Builds an engine rooted at `genesis`, which is taken on faith —
    /// the caller is responsible for agreeing on genesis out of band.
    ///
    /// # Errors
    ///
    /// Returns error if `genesis` fails to encode.
    pub fn new(genesis: Block, genesis_target: crate::types::Target, params: ConsensusParams) -> shared::Result<Self> {
        let mut tree = BlockTree::new();
        let genesis_id = tree.insert_genesis(genesis, genesis_target)?;
        let state = ConsensusState::new(genesis_id);
        Ok(Self {
            tree,
            state,
            mempool: Mempool::new(),
            params,
        })
    }

    #[must_use]
    pub fn current_block(&self) -> BlockID {
        self.state.current_block
    }

    #[must_use]
    pub fn height(&self) -> u64 {
        self.state.height()
    }

    /// `AcceptBlock` (§4.10). Runs the five documented steps in order;
    /// orphan and future blocks are retained for retry rather than
    /// rejected permanently (§9 bullet 3, SPEC_FULL supplement 3).
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::AlreadyKnown` if already accepted or
    /// marked bad, `ConsensusError::OrphanBlock`/`FutureBlock` if held
    /// for retry, or `ConsensusError::InvalidBlockPermanent` /
    /// `InternalInvariant` on failure.
    pub fn accept_block(&mut self, block: Block, now: Timestamp) -> Result<()> {
        let block_id = block.id()?;

        if self.tree.is_bad(&block_id) || self.tree.contains(&block_id) {
            return Err(ConsensusError::AlreadyKnown(block_id));
        }

        let parent_id = block.parent_block;
        if !self.tree.contains(&parent_id) {
            warn!(%block_id, %parent_id, "holding orphan block for retry");
            self.mempool.hold_orphan(parent_id, block);
            return Err(ConsensusError::OrphanBlock(block_id));
        }

        let parent = self.tree.get(&parent_id).expect("checked above");
        let parent_target = parent.target.clone();
        let parent_depth = parent.depth.clone();
        let recent_timestamps: Vec<Timestamp> = parent.recent_timestamps.iter().copied().collect();
        let ctx = HeaderContext {
            parent_target: &parent_target,
            parent_recent_timestamps: &recent_timestamps,
        };
        if let Err(e) = validate_header(&block, &ctx, now, &self.params) {
            if let ConsensusError::FutureBlock(_) = e {
                warn!(%block_id, "holding future block for retry");
                self.mempool.hold_future(block.timestamp, block);
            } else {
                warn!(%block_id, "marking permanently invalid block bad");
                self.tree.bad_blocks.insert(block_id);
            }
            return Err(e);
        }

        let new_id = self.tree.add_block_to_tree(parent_id, block, &self.params)?;
        let new_height = self.tree.get(&new_id).expect("just inserted").height;
        let new_parent = self.tree.get(&new_id).expect("just inserted").parent;
        let new_depth = block_weight(&parent_depth, &parent_target);
        let current_depth = self
            .tree
            .get(&self.state.current_block)
            .map_or_else(crate::types::zero_weight, |n| n.depth.clone());

        if new_height == self.state.height() + 1 && new_parent == self.state.current_block {
            if let Err(e) = apply_block(new_id, &mut self.tree, &mut self.state, &mut self.mempool, &self.params) {
                self.tree.invalidate_node(new_id);
                return Err(e);
            }
            info!(%new_id, height = new_height, "extended current branch");
        } else if heavier_fork(&new_depth, &current_depth, &self.params) {
            fork_blockchain(new_id, &mut self.tree, &mut self.state, &mut self.mempool, &self.params)?;
            info!(%new_id, height = new_height, "reorganized onto heavier branch");
        }

        self.retry_orphans(new_id, now);

        Ok(())
    }

    /// Re-submits any blocks that were waiting on `parent_id`, e.g.
    /// because `parent_id` has just been accepted.
    fn retry_orphans(&mut self, parent_id: BlockID, now: Timestamp) {
        let waiting = self.mempool.drain_orphans(&parent_id);
        for block in waiting {
            let _ = self.accept_block(block, now);
        }
    }

    /// Re-submits every future block whose timestamp is no longer ahead
    /// of `now` by more than `FutureThreshold` (§9 bullet 3).
    pub fn retry_future_blocks(&mut self, now: Timestamp) {
        let ready = self
            .mempool
            .drain_ready_future_blocks(now, self.params.future_threshold_secs);
        for block in ready {
            let _ = self.accept_block(block, now);
        }
    }

    /// `AcceptTransaction` (§4.9).
    ///
    /// # Errors
    ///
    /// Returns `ConsensusError::MempoolConflict` or the validator's
    /// error.
    pub fn accept_transaction(&mut self, t: Transaction) -> Result<Hash256> {
        let view = HeightView {
            state: &self.state,
            height: self.state.height(),
        };
        self.mempool.accept_transaction(t, &view, &self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;

    fn genesis_block() -> Block {
        Block {
            parent_block: Hash256::zero(),
            timestamp: 0,
            nonce: 0,
            miner_address: Hash256::keccak256(b"genesis-miner"),
            merkle_root: shared::merkle_root(&[]),
            transactions: vec![],
        }
    }

    fn child_of(parent: Hash256, timestamp: i64, salt: &[u8]) -> Block {
        Block {
            parent_block: parent,
            timestamp,
            nonce: 0,
            miner_address: Hash256::keccak256(salt),
            merkle_root: shared::merkle_root(&[]),
            transactions: vec![],
        }
    }

    #[test]
    fn test_accept_block_extends_current_branch() {
        let mut engine = Engine::new(genesis_block(), Target::max(), ConsensusParams::default()).unwrap();
        let genesis_id = engine.current_block();

        let child = child_of(genesis_id, 600, b"m1");
        let child_id = child.id().unwrap();
        engine.accept_block(child, 600).unwrap();

        assert_eq!(engine.current_block(), child_id);
        assert_eq!(engine.height(), 1);
    }

    #[test]
    fn test_orphan_block_is_held_and_retried_once_parent_arrives() {
        let mut engine = Engine::new(genesis_block(), Target::max(), ConsensusParams::default()).unwrap();
        let genesis_id = engine.current_block();

        let parent = child_of(genesis_id, 600, b"parent");
        let parent_id = parent.id().unwrap();

        let grandchild = child_of(parent_id, 1200, b"grandchild");
        let grandchild_id = grandchild.id().unwrap();
        let result = engine.accept_block(grandchild, 1200);
        assert!(matches!(result, Err(ConsensusError::OrphanBlock(_))));
        assert_eq!(engine.current_block(), genesis_id);

        engine.accept_block(parent, 600).unwrap();
        assert_eq!(engine.current_block(), grandchild_id);
        assert_eq!(engine.height(), 2);
    }

    #[test]
    fn test_already_known_block_rejected() {
        let mut engine = Engine::new(genesis_block(), Target::max(), ConsensusParams::default()).unwrap();
        let genesis_id = engine.current_block();
        let child = child_of(genesis_id, 600, b"dup");
        engine.accept_block(child.clone(), 600).unwrap();
        let result = engine.accept_block(child, 600);
        assert!(matches!(result, Err(ConsensusError::AlreadyKnown(_))));
    }

    #[test]
    fn test_permanently_invalid_header_is_marked_bad() {
        let mut engine = Engine::new(genesis_block(), Target::max(), ConsensusParams::default()).unwrap();
        let genesis_id = engine.current_block();

        let mut bad = child_of(genesis_id, 600, b"bad-merkle");
        bad.merkle_root = Hash256::keccak256(b"wrong");
        let bad_id = bad.id().unwrap();

        let result = engine.accept_block(bad.clone(), 600);
        assert!(matches!(result, Err(ConsensusError::InvalidBlockPermanent { .. })));
        assert!(engine.tree.is_bad(&bad_id));

        let retry = engine.accept_block(bad, 600);
        assert!(matches!(retry, Err(ConsensusError::AlreadyKnown(_))));
    }
}
