//! Reorganization onto a heavier branch (§4.8).

use crate::applier::{apply_block, reverse_block};
use crate::block_tree::BlockTree;
use crate::config::ConsensusParams;
use crate::consensus_state::ConsensusState;
use crate::error::{ConsensusError, Result};
use crate::mempool::Mempool;
use crate::types::BlockID;

/// Walks `new` back to the first ancestor on `state.current_path`, then
/// rewinds the current branch to that ancestor and replays the new
/// branch on top (§4.8). A mid-replay failure invalidates the failing
/// block and its subtree, rewinds whatever of the new branch succeeded,
/// then re-applies the rewound old branch — a failure during that last
/// step is impossible under the invertibility invariant, so it is
/// treated as `ConsensusError::InternalInvariant` rather than unwound
/// further (§4.8 step 3, §8).
pub fn fork_blockchain(
    new_tip: BlockID,
    tree: &mut BlockTree,
    state: &mut ConsensusState,
    mempool: &mut Mempool,
    params: &ConsensusParams,
) -> Result<()> {
    let (common_ancestor, parent_history) = find_fork_point(new_tip, tree, state)?;

    let rewound_blocks = rewind_to(common_ancestor, tree, state, mempool)?;

    let mut applied_so_far = Vec::with_capacity(parent_history.len());
    for block_id in &parent_history {
        match apply_block(*block_id, tree, state, mempool, params) {
            Ok(()) => applied_so_far.push(*block_id),
            Err(e) => {
                tree.invalidate_node(*block_id);
                for applied_id in applied_so_far.iter().rev() {
                    reverse_block(*applied_id, tree, state, mempool)
                        .expect("reversing a block this function just applied cannot fail");
                }
                for rewound_id in rewound_blocks.iter().rev() {
                    apply_block(*rewound_id, tree, state, mempool, params).map_err(|re_err| {
                        ConsensusError::InternalInvariant(
                            *rewound_id,
                            format!(
                                "re-applying rewound block after failed reorg attempt on {block_id}: \
                                 original failure was {e}, re-apply failure was {re_err}"
                            ),
                        )
                    })?;
                }
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Step 1 of §4.8: walk `new_tip` back to the first ancestor `a` such
/// that `CurrentPath[a.Height] == a.ID`, returning `a`'s id and the path
/// from its child down to `new_tip`, oldest first.
fn find_fork_point(
    new_tip: BlockID,
    tree: &BlockTree,
    state: &ConsensusState,
) -> Result<(BlockID, Vec<BlockID>)> {
    // Built newest-first: [new_tip, parent(new_tip), parent(parent(new_tip)), ..., ancestor].
    let mut path = vec![new_tip];
    let mut current = new_tip;
    loop {
        let node = tree
            .get(&current)
            .ok_or(ConsensusError::OrphanBlock(current))?;
        if node.is_root || state.block_at_height(node.height) == Some(current) {
            path.pop(); // `current`, the ancestor, is always the last element
            path.reverse(); // oldest first: ancestor's child ... new_tip
            return Ok((current, path));
        }
        current = node.parent;
        path.push(current);
    }
}

/// Step 2 of §4.8: rewind the current branch block-by-block until
/// `CurrentBlock == ancestor`, returning the rewound ids oldest first so
/// they can be re-applied in the same order if a later step needs to.
fn rewind_to(
    ancestor: BlockID,
    tree: &mut BlockTree,
    state: &mut ConsensusState,
    mempool: &mut Mempool,
) -> Result<Vec<BlockID>> {
    let mut rewound = Vec::new();
    while state.current_block != ancestor {
        let current = state.current_block;
        reverse_block(current, tree, state, mempool)?;
        rewound.push(current);
    }
    rewound.reverse();
    Ok(rewound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::types::Target;
    use shared::Hash256;

    fn empty_block(parent: Hash256, timestamp: i64, salt: &[u8]) -> Block {
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
    fn test_fork_choice_reorgs_onto_heavier_branch() {
        let params = ConsensusParams::default();
        let mut tree = BlockTree::new();
        let mut mempool = Mempool::new();

        let genesis_id = tree
            .insert_genesis(empty_block(Hash256::zero(), 0, b"g"), Target::max())
            .unwrap();
        let mut state = ConsensusState::new(genesis_id);

        let a1 = tree
            .add_block_to_tree(genesis_id, empty_block(genesis_id, 600, b"a1"), &params)
            .unwrap();
        apply_block(a1, &mut tree, &mut state, &mut mempool, &params).unwrap();
        assert_eq!(state.current_block, a1);

        let b1 = tree
            .add_block_to_tree(genesis_id, empty_block(genesis_id, 600, b"b1"), &params)
            .unwrap();
        let b2 = tree
            .add_block_to_tree(b1, empty_block(b1, 1200, b"b2"), &params)
            .unwrap();

        fork_blockchain(b2, &mut tree, &mut state, &mut mempool, &params).unwrap();
        assert_eq!(state.current_block, b2);
        assert_eq!(state.block_at_height(1), Some(b1));
        assert_eq!(state.block_at_height(2), Some(b2));
    }
}
