//! The block tree: `BlockNode`s, difficulty retarget (§4.3), and the
//! cumulative-weight fork-choice metric (§4.4).

use crate::block::Block;
use crate::config::ConsensusParams;
use crate::contract::{ContractTermination, MissedStorageProof, WindowReset};
use crate::types::{zero_weight, BlockID, BlockWeight, Height, Target, Timestamp};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};
use std::collections::{HashMap, HashSet, VecDeque};

/// A node of the block tree (§3). Children are a lookup convenience;
/// child→parent is a lookup through `BlockTree::nodes`, never a strong
/// reference (§9: no graph cycles, each node owns its children list).
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub block: Block,
    pub parent: BlockID,
    pub is_root: bool,
    pub children: Vec<BlockID>,
    pub height: Height,
    pub target: Target,
    pub depth: BlockWeight,
    pub recent_timestamps: VecDeque<Timestamp>,
    pub contract_terminations: Vec<ContractTermination>,
    pub missed_storage_proofs: Vec<MissedStorageProof>,
    pub window_resets: Vec<WindowReset>,
    /// Id of the miner-subsidy UTXO this block emitted, if it has been
    /// applied (kept here so a block reversal can delete it).
    pub subsidy_output_id: Option<crate::types::OutputID>,
}

/// Owns every node reachable from genesis plus the set of ids
/// permanently rejected. The two are disjoint by construction (§3
/// invariant).
#[derive(Debug, Default)]
pub struct BlockTree {
    pub nodes: HashMap<BlockID, BlockNode>,
    pub bad_blocks: HashSet<BlockID>,
    pub root: Option<BlockID>,
}

impl BlockTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the tree with a genesis node. The genesis block is
    /// self-rooted: its `parent` field points at its own id.
    pub fn insert_genesis(&mut self, block: Block, target: Target) -> shared::Result<BlockID> {
        let id = block.id()?;
        let mut recent_timestamps = VecDeque::new();
        recent_timestamps.push_back(block.timestamp);
        let node = BlockNode {
            block,
            parent: id,
            is_root: true,
            children: vec![],
            height: 0,
            target,
            depth: zero_weight(),
            recent_timestamps,
            contract_terminations: vec![],
            missed_storage_proofs: vec![],
            window_resets: vec![],
            subsidy_output_id: None,
        };
        self.nodes.insert(id, node);
        self.root = Some(id);
        Ok(id)
    }

    #[must_use]
    pub fn get(&self, id: &BlockID) -> Option<&BlockNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &BlockID) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn is_bad(&self, id: &BlockID) -> bool {
        self.bad_blocks.contains(id)
    }

    /// Walks `w` generations back from `start`, or to the root if it is
    /// reached first.
    #[must_use]
    pub fn ancestor(&self, start: &BlockID, w: u64) -> Option<BlockID> {
        let mut current = *start;
        for _ in 0..w {
            let node = self.nodes.get(&current)?;
            if node.is_root {
                break;
            }
            current = node.parent;
        }
        Some(current)
    }

    /// Inserts `block` as a child of `parent_id`, computing `Height`,
    /// `RecentTimestamps`, `Target`, and `Depth` (§4.10 item 4). Does not
    /// perform header validation; that happens before this is called.
    pub fn add_block_to_tree(
        &mut self,
        parent_id: BlockID,
        block: Block,
        params: &ConsensusParams,
    ) -> shared::Result<BlockID> {
        let id = block.id()?;
        let parent = self
            .nodes
            .get(&parent_id)
            .expect("caller ensures parent is in BlockMap");

        let height = parent.height + 1;
        let target = retarget(self, &parent_id, block.timestamp, params);
        let depth = block_weight(&parent.depth, &parent.target);

        let mut recent_timestamps = parent.recent_timestamps.clone();
        recent_timestamps.push_back(block.timestamp);
        while recent_timestamps.len() > params.recent_timestamps_depth {
            recent_timestamps.pop_front();
        }

        let node = BlockNode {
            block,
            parent: parent_id,
            is_root: false,
            children: vec![],
            height,
            target,
            depth,
            recent_timestamps,
            contract_terminations: vec![],
            missed_storage_proofs: vec![],
            window_resets: vec![],
            subsidy_output_id: None,
        };
        self.nodes.insert(id, node);
        self.nodes.get_mut(&parent_id).unwrap().children.push(id);
        Ok(id)
    }

    /// Recursively moves `id` and its entire subtree from `BlockMap` to
    /// `BadBlocks` (§4.8 step 3).
    pub fn invalidate_node(&mut self, id: BlockID) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
            }
            self.bad_blocks.insert(current);
        }
    }
}

/// Difficulty retarget (§4.3). Exact rational arithmetic throughout, per
/// §9's prohibition on floating point in this path.
#[must_use]
pub fn retarget(
    tree: &BlockTree,
    parent_id: &BlockID,
    new_timestamp: Timestamp,
    params: &ConsensusParams,
) -> Target {
    let parent = tree.get(parent_id).expect("parent must be in BlockMap");
    let w = params.target_window.min(parent.height + 1);

    // `ancestor(n, w)` is defined at height `n.Height - w`; `parent_id` is
    // already at `n.Height - 1`, so only `w - 1` further generations are
    // walked back from it (§4.3).
    let ancestor_id = tree.ancestor(parent_id, w - 1).unwrap_or(*parent_id);
    let ancestor_timestamp = tree
        .get(&ancestor_id)
        .map_or(parent.block.timestamp, |n| n.block.timestamp);

    let time_passed = (new_timestamp - ancestor_timestamp).max(1);
    let expected_time_passed = (params.target_seconds_per_block * w).max(1);

    let alpha = BigRational::new(
        BigInt::from(time_passed),
        BigInt::from(expected_time_passed) * BigInt::from(w.max(1)),
    );
    let clamped = clamp(
        alpha,
        &params.max_adjustment_down,
        &params.max_adjustment_up,
    );

    let parent_target_big = parent.target.to_biguint();
    let scaled = clamped * BigRational::from_integer(BigInt::from(parent_target_big));
    let truncated = scaled.trunc().to_integer();
    let non_negative = truncated.max(BigInt::zero());
    Target::from_biguint(&non_negative.to_biguint().unwrap_or_default())
}

#[must_use]
fn clamp(value: BigRational, low: &BigRational, high: &BigRational) -> BigRational {
    if value < *low {
        low.clone()
    } else if value > *high {
        high.clone()
    } else {
        value
    }
}

/// `BlockWeight(n) = parent.Depth + 1 / parent.Target` (§4.4).
#[must_use]
pub fn block_weight(parent_depth: &BlockWeight, parent_target: &Target) -> BlockWeight {
    let parent_target_big = parent_target.to_biguint();
    if parent_target_big.is_zero() {
        // An exhausted target (all-zero) would make the increment
        // infinite; treat it as the heaviest possible single step
        // instead of dividing by zero.
        return parent_depth + BigRational::from_integer(BigInt::one());
    }
    let increment = BigRational::new(BigInt::one(), BigInt::from(parent_target_big));
    parent_depth + increment
}

/// The heaviest-chain rule with hysteresis (§4.4): reorganize only if the
/// new node's depth clears the current depth by at least `SurpassThreshold
/// × CurrentBlockWeight`.
#[must_use]
pub fn heavier_fork(
    new_depth: &BlockWeight,
    current_depth: &BlockWeight,
    params: &ConsensusParams,
) -> bool {
    let margin = &params.surpass_threshold * current_depth;
    *new_depth >= current_depth + margin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::Transaction;
    use shared::Hash256;

    fn empty_block(parent: Hash256, timestamp: Timestamp) -> Block {
        Block {
            parent_block: parent,
            timestamp,
            nonce: 0,
            miner_address: Hash256::keccak256(b"miner"),
            merkle_root: shared::merkle_root(&[]),
            transactions: Vec::<Transaction>::new(),
        }
    }

    #[test]
    fn test_genesis_is_self_rooted() {
        let mut tree = BlockTree::new();
        let genesis = empty_block(Hash256::zero(), 0);
        let id = tree.insert_genesis(genesis, Target::max()).unwrap();
        let node = tree.get(&id).unwrap();
        assert_eq!(node.parent, id);
        assert!(node.is_root);
        assert_eq!(node.height, 0);
    }

    #[test]
    fn test_add_block_increments_height() {
        let mut tree = BlockTree::new();
        let params = ConsensusParams::default();
        let genesis_id = tree
            .insert_genesis(empty_block(Hash256::zero(), 0), Target::max())
            .unwrap();

        let child = empty_block(genesis_id, 600);
        let child_id = tree.add_block_to_tree(genesis_id, child, &params).unwrap();
        assert_eq!(tree.get(&child_id).unwrap().height, 1);
    }

    #[test]
    fn test_retarget_stays_within_clamp_bounds() {
        let mut tree = BlockTree::new();
        let params = ConsensusParams::default();
        let genesis_id = tree
            .insert_genesis(empty_block(Hash256::zero(), 0), Target::max())
            .unwrap();

        // timestamp far in the future should clamp the adjustment up,
        // never producing a target outside [down*parent, up*parent].
        let new_target = retarget(&tree, &genesis_id, 10_000_000, &params);
        let parent_target = tree.get(&genesis_id).unwrap().target.to_biguint();
        let max_allowed = (BigRational::from_integer(BigInt::from(parent_target.clone()))
            * params.max_adjustment_up.clone())
        .trunc()
        .to_integer()
        .to_biguint()
        .unwrap();
        assert!(new_target.to_biguint() <= max_allowed);
    }

    #[test]
    fn test_heavier_fork_hysteresis() {
        let params = ConsensusParams::default();
        let current_depth = BigRational::from_integer(BigInt::from(100));
        let just_barely_more = BigRational::from_integer(BigInt::from(101));
        assert!(!heavier_fork(&just_barely_more, &current_depth, &params));

        let well_past_threshold = &current_depth
            + &params.surpass_threshold * &current_depth
            + BigRational::from_integer(BigInt::from(1));
        assert!(heavier_fork(&well_past_threshold, &current_depth, &params));
    }

    #[test]
    fn test_invalidate_node_removes_subtree() {
        let mut tree = BlockTree::new();
        let params = ConsensusParams::default();
        let genesis_id = tree
            .insert_genesis(empty_block(Hash256::zero(), 0), Target::max())
            .unwrap();
        let child_id = tree
            .add_block_to_tree(genesis_id, empty_block(genesis_id, 600), &params)
            .unwrap();
        let grandchild_id = tree
            .add_block_to_tree(child_id, empty_block(child_id, 1200), &params)
            .unwrap();

        tree.invalidate_node(child_id);
        assert!(!tree.contains(&child_id));
        assert!(!tree.contains(&grandchild_id));
        assert!(tree.is_bad(&child_id));
        assert!(tree.is_bad(&grandchild_id));
        assert!(tree.contains(&genesis_id));
    }
}
