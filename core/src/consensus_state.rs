//! The derived view of the currently applied branch (§2 item 3, §3).

use crate::contract::OpenContract;
use crate::transaction::{Output, ValidationView};
use crate::types::{BlockID, ContractID, Height, OutputID};
use std::collections::HashMap;

/// `UnspentOutputs`, `SpentOutputs`, `OpenContracts`, `CurrentBlock`, and
/// `CurrentPath` (height→id), all mutated only while the engine's single
/// lock is held (§5).
#[derive(Debug, Clone, Default)]
pub struct ConsensusState {
    pub unspent_outputs: HashMap<OutputID, Output>,
    /// Shadow map populated during block application so a reversal can
    /// move entries back without re-deriving them (§2 item 3).
    pub spent_outputs: HashMap<OutputID, Output>,
    pub open_contracts: HashMap<ContractID, OpenContract>,
    pub current_block: BlockID,
    pub current_path: HashMap<Height, BlockID>,
}

impl ConsensusState {
    #[must_use]
    pub fn new(genesis_id: BlockID) -> Self {
        let mut current_path = HashMap::new();
        current_path.insert(0, genesis_id);
        Self {
            unspent_outputs: HashMap::new(),
            spent_outputs: HashMap::new(),
            open_contracts: HashMap::new(),
            current_block: genesis_id,
            current_path,
        }
    }

    #[must_use]
    pub fn height(&self) -> Height {
        self.current_path.keys().copied().max().unwrap_or(0)
    }

    /// `CurrentPath[h]` is an ancestor of `CurrentBlock` at height `h`
    /// (§3 invariant) — exposed as a read accessor (§6).
    #[must_use]
    pub fn block_at_height(&self, h: Height) -> Option<BlockID> {
        self.current_path.get(&h).copied()
    }

    #[must_use]
    pub fn get_output(&self, id: &OutputID) -> Option<&Output> {
        self.unspent_outputs.get(id)
    }

    #[must_use]
    pub fn get_open_contract(&self, id: &ContractID) -> Option<&OpenContract> {
        self.open_contracts.get(id)
    }
}

/// Adapts `ConsensusState` to the transaction validator's narrow view, at
/// a given reference height (which may differ from `self.height()` while
/// replaying history during a reorg).
pub struct HeightView<'a> {
    pub state: &'a ConsensusState,
    pub height: Height,
}

impl ValidationView for HeightView<'_> {
    fn current_height(&self) -> Height {
        self.height
    }
    fn lookup_output(&self, id: &OutputID) -> Option<&Output> {
        self.state.get_output(id)
    }
    fn lookup_open_contract(&self, id: &ContractID) -> Option<&OpenContract> {
        self.state.get_open_contract(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Hash256;

    #[test]
    fn test_new_state_seeds_current_path_at_genesis() {
        let genesis_id = Hash256::keccak256(b"genesis");
        let state = ConsensusState::new(genesis_id);
        assert_eq!(state.block_at_height(0), Some(genesis_id));
        assert_eq!(state.current_block, genesis_id);
        assert_eq!(state.height(), 0);
    }
}
