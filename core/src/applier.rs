//! Forward and inverse application of transactions and blocks (§4.5–§4.7).
//!
//! Invertibility — `forward(b)` then `reverse(b)` is the identity on
//! `(UnspentOutputs, SpentOutputs, OpenContracts, CurrentBlock,
//! CurrentPath, TransactionPool, TransactionList)` — is the design
//! invariant this module exists to uphold (§3, §4.7, §8).

use crate::block::Block;
use crate::block_tree::{BlockNode, BlockTree};
use crate::config::ConsensusParams;
use crate::consensus_state::{ConsensusState, HeightView};
use crate::contract::{
    file_contract_termination_output_id, storage_proof_output_id, ContractTermination,
    MissedStorageProof, OpenContract, WindowReset,
};
use crate::error::{ConsensusError, Result};
use crate::mempool::Mempool;
use crate::transaction::{validate_transaction, Output, Transaction};
use crate::types::{BlockID, ContractID, Currency, Height, OutputID};
use shared::Hash256;

/// What a single transaction's forward application did, kept only long
/// enough to reverse it (§4.7 per-transaction inverse).
struct TxApplyRecord {
    consumed_output_ids: Vec<OutputID>,
    created_output_ids: Vec<OutputID>,
    created_contract_ids: Vec<ContractID>,
    /// Effect of each storage proof on a *pre-existing* open contract:
    /// the output it minted and the funds/window state to restore. The
    /// documented §4.7 bullet list omits this, but it is required for
    /// the byte-for-byte reversal invariant in §3/§8 to hold when a
    /// transaction both references an existing contract and its proof
    /// mutates that contract's funds/window.
    storage_proof_effects: Vec<StorageProofEffect>,
}

struct StorageProofEffect {
    contract_id: ContractID,
    output_id: OutputID,
    payout: Currency,
}

/// Applies a single transaction forward at height `h` (§4.5).
///
/// # Errors
///
/// Propagates any `shared` encoding error encountered while deriving ids.
fn apply_transaction(
    t: &Transaction,
    state: &mut ConsensusState,
    h: Height,
) -> shared::Result<TxApplyRecord> {
    let mut consumed_output_ids = Vec::with_capacity(t.inputs.len());
    for input in &t.inputs {
        let output = state
            .unspent_outputs
            .remove(&input.output_id)
            .expect("validator guarantees the output is unspent");
        state.spent_outputs.insert(input.output_id, output);
        consumed_output_ids.push(input.output_id);
    }

    let mut created_output_ids = Vec::with_capacity(t.outputs.len());
    for (i, output) in t.outputs.iter().enumerate() {
        let id = t.output_id(i)?;
        state.unspent_outputs.insert(id, output.clone());
        created_output_ids.push(id);
    }

    let mut created_contract_ids = Vec::with_capacity(t.file_contracts.len());
    for (i, fc) in t.file_contracts.iter().enumerate() {
        let id = t.file_contract_id(i)?;
        state
            .open_contracts
            .insert(id, OpenContract::new(fc.clone(), id));
        created_contract_ids.push(id);
    }

    let mut storage_proof_effects = Vec::with_capacity(t.storage_proofs.len());
    for proof in &t.storage_proofs {
        let contract = state
            .open_contracts
            .get_mut(&proof.contract_id)
            .expect("validator guarantees the contract exists");
        let payout = std::cmp::min(contract.file_contract.valid_proof_payout, contract.funds_remaining);
        let output_id = storage_proof_output_id(proof.contract_id, h, true);
        state.unspent_outputs.insert(
            output_id,
            Output {
                value: payout,
                spend_hash: contract.file_contract.valid_proof_address,
            },
        );
        contract.funds_remaining = contract.funds_remaining.checked_sub(payout).unwrap_or(Currency::ZERO);
        contract.window_satisfied = true;
        storage_proof_effects.push(StorageProofEffect {
            contract_id: proof.contract_id,
            output_id,
            payout,
        });
    }

    Ok(TxApplyRecord {
        consumed_output_ids,
        created_output_ids,
        created_contract_ids,
        storage_proof_effects,
    })
}

/// Inverse of `apply_transaction` (§4.7 per-transaction bullets, plus the
/// storage-proof effect restoration documented on `TxApplyRecord`).
fn reverse_transaction(state: &mut ConsensusState, record: &TxApplyRecord) {
    for id in &record.created_output_ids {
        state.unspent_outputs.remove(id);
    }
    for id in &record.consumed_output_ids {
        if let Some(output) = state.spent_outputs.remove(id) {
            state.unspent_outputs.insert(*id, output);
        }
    }
    for effect in &record.storage_proof_effects {
        state.unspent_outputs.remove(&effect.output_id);
        if let Some(contract) = state.open_contracts.get_mut(&effect.contract_id) {
            contract.funds_remaining = contract
                .funds_remaining
                .checked_add(effect.payout)
                .expect("payout was subtracted from this same field");
            contract.window_satisfied = false;
        }
    }
    for id in &record.created_contract_ids {
        state.open_contracts.remove(id);
    }
}

/// Per-block forward application (§4.6). On a mid-block validation
/// failure, already-applied transactions are reversed in reverse order
/// and the error is returned without mutating `tree`'s bad-block set —
/// the caller (the engine) is responsible for calling `invalidate_node`.
///
/// # Errors
///
/// Returns the first transaction validation failure encountered.
pub fn apply_block(
    node_id: BlockID,
    tree: &mut BlockTree,
    state: &mut ConsensusState,
    mempool: &mut Mempool,
    params: &ConsensusParams,
) -> Result<()> {
    let height = tree.get(&node_id).expect("node exists").height;
    let block: Block = tree.get(&node_id).expect("node exists").block.clone();

    let mut applied_records = Vec::with_capacity(block.transactions.len());
    for t in &block.transactions {
        let view = HeightView { state, height };
        if let Err(e) = validate_transaction(t, &view, params) {
            for record in applied_records.into_iter().rev() {
                reverse_transaction(state, &record);
            }
            return Err(e);
        }
        let record = apply_transaction(t, state, height)?;
        applied_records.push(record);
    }

    let mut miner_subsidy = Currency::ZERO;
    for (t, _record) in block.transactions.iter().zip(applied_records.iter()) {
        let fee = t
            .total_miner_fees()
            .ok_or_else(|| ConsensusError::InvalidTransaction("miner fee overflow".to_string()))?;
        miner_subsidy = miner_subsidy
            .checked_add(fee)
            .ok_or_else(|| ConsensusError::InvalidTransaction("miner subsidy overflow".to_string()))?;
        let id = t.id()?;
        mempool.remove_transaction(id, t);
    }

    run_contract_maintenance(node_id, tree, state, height);

    miner_subsidy = miner_subsidy
        .checked_add(Currency::new(params.coin_inflation))
        .ok_or_else(|| ConsensusError::InvalidTransaction("miner subsidy overflow".to_string()))?;
    let block_id = block.id()?;
    let subsidy_output_id = subsidy_output_id(block_id);
    state.unspent_outputs.insert(
        subsidy_output_id,
        Output {
            value: miner_subsidy,
            spend_hash: block.miner_address,
        },
    );

    let node = tree.nodes.get_mut(&node_id).expect("node exists");
    node.subsidy_output_id = Some(subsidy_output_id);

    state.current_block = block_id;
    state.current_path.insert(height, block_id);

    Ok(())
}

fn subsidy_output_id(block_id: BlockID) -> OutputID {
    crate::block::subsidy_id(block_id)
}

/// Contract maintenance over all open contracts (§4.6 item 3). Mutation
/// of `OpenContracts` while iterating it is forbidden (§5); terminated
/// ids are buffered and removed afterward.
fn run_contract_maintenance(node_id: BlockID, tree: &mut BlockTree, state: &mut ConsensusState, h: Height) {
    let mut to_terminate: Vec<ContractID> = Vec::new();
    let mut missed_records: Vec<MissedStorageProof> = Vec::new();
    let mut reset_records: Vec<WindowReset> = Vec::new();
    let mut terminations: Vec<ContractTermination> = Vec::new();

    let contract_ids: Vec<ContractID> = state.open_contracts.keys().copied().collect();
    for contract_id in contract_ids {
        let contract = state.open_contracts.get(&contract_id).expect("just listed");
        if contract.is_window_boundary(h) {
            let was_satisfied = contract.window_satisfied;
            if was_satisfied {
                reset_records.push(WindowReset {
                    contract_id,
                    was_satisfied_before_reset: true,
                });
            } else {
                let payout = std::cmp::min(
                    contract.file_contract.missed_proof_payout,
                    contract.funds_remaining,
                );
                let address = contract.file_contract.missed_proof_address;
                let output_id = storage_proof_output_id(contract_id, h, false);
                state
                    .unspent_outputs
                    .insert(output_id, Output { value: payout, spend_hash: address });

                let contract = state.open_contracts.get_mut(&contract_id).expect("just listed");
                contract.funds_remaining =
                    contract.funds_remaining.checked_sub(payout).unwrap_or(Currency::ZERO);
                contract.failures += 1;
                missed_records.push(MissedStorageProof {
                    output_id,
                    contract_id,
                    payout,
                });
            }
            state
                .open_contracts
                .get_mut(&contract_id)
                .expect("just listed")
                .window_satisfied = false;
        }

        let contract = state.open_contracts.get(&contract_id).expect("just listed");
        if contract.should_terminate(h) {
            to_terminate.push(contract_id);
        }
    }

    for contract_id in to_terminate {
        let contract = state
            .open_contracts
            .remove(&contract_id)
            .expect("collected above");
        let terminating_output_id = if contract.funds_remaining != Currency::ZERO {
            let output_id = file_contract_termination_output_id(contract_id);
            let address = if contract.failures == contract.file_contract.tolerance {
                contract.file_contract.missed_proof_address
            } else {
                contract.file_contract.valid_proof_address
            };
            state.unspent_outputs.insert(
                output_id,
                Output {
                    value: contract.funds_remaining,
                    spend_hash: address,
                },
            );
            Some(output_id)
        } else {
            None
        };
        terminations.push(ContractTermination {
            contract,
            terminating_output_id,
        });
    }

    // Window resets on contracts that terminated this same block are
    // subsumed by the termination snapshot, so drop those duplicates.
    let terminated: std::collections::HashSet<ContractID> =
        terminations.iter().map(|t| t.contract.contract_id).collect();
    reset_records.retain(|r| !terminated.contains(&r.contract_id));
    missed_records.retain(|r| !terminated.contains(&r.contract_id));

    let node = tree.nodes.get_mut(&node_id).expect("node exists");
    node.missed_storage_proofs.extend(missed_records);
    node.window_resets.extend(reset_records);
    node.contract_terminations.extend(terminations);
}

/// Per-block inverse application (§4.7), operating on the current tip.
///
/// # Errors
///
/// Propagates encoding errors surfaced while re-deriving transaction ids.
pub fn reverse_block(
    node_id: BlockID,
    tree: &mut BlockTree,
    state: &mut ConsensusState,
    mempool: &mut Mempool,
) -> shared::Result<()> {
    let node: BlockNode = tree.get(&node_id).expect("node exists").clone();

    for termination in node.contract_terminations.iter().rev() {
        state
            .open_contracts
            .insert(termination.contract.contract_id, termination.contract.clone());
        if let Some(output_id) = termination.terminating_output_id {
            state.unspent_outputs.remove(&output_id);
        }
    }

    for missed in node.missed_storage_proofs.iter().rev() {
        if let Some(contract) = state.open_contracts.get_mut(&missed.contract_id) {
            contract.funds_remaining = contract
                .funds_remaining
                .checked_add(missed.payout)
                .expect("payout was subtracted from this same field");
            contract.failures = contract.failures.saturating_sub(1);
        }
        state.unspent_outputs.remove(&missed.output_id);
    }

    for reset in node.window_resets.iter().rev() {
        if let Some(contract) = state.open_contracts.get_mut(&reset.contract_id) {
            contract.window_satisfied = reset.was_satisfied_before_reset;
        }
    }

    for t in node.block.transactions.iter().rev() {
        // Reversal does not re-run validation, only re-derives the ids the
        // forward pass produced, which are pure functions of `t`'s bytes.
        let record = re_derive_apply_record(t, state, node.height)?;
        reverse_transaction(state, &record);
        mempool.readmit(t.clone())?;
    }

    if let Some(subsidy_output_id) = node.subsidy_output_id {
        state.unspent_outputs.remove(&subsidy_output_id);
    }

    state.current_block = node.parent;
    state.current_path.remove(&node.height);

    Ok(())
}

/// Reverse needs to know which output/contract ids a transaction created
/// without redoing validation; these are pure functions of the
/// transaction's own bytes, so they can be re-derived rather than stored
/// redundantly on the node.
fn re_derive_apply_record(
    t: &Transaction,
    state: &ConsensusState,
    h: Height,
) -> shared::Result<TxApplyRecord> {
    let consumed_output_ids = t.inputs.iter().map(|i| i.output_id).collect();
    let created_output_ids = (0..t.outputs.len())
        .map(|i| t.output_id(i))
        .collect::<shared::Result<Vec<_>>>()?;
    let created_contract_ids = (0..t.file_contracts.len())
        .map(|i| t.file_contract_id(i))
        .collect::<shared::Result<Vec<_>>>()?;
    let storage_proof_effects = t
        .storage_proofs
        .iter()
        .map(|proof| {
            let output_id = storage_proof_output_id(proof.contract_id, h, true);
            let payout = state
                .spent_outputs
                .get(&output_id)
                .or_else(|| state.unspent_outputs.get(&output_id))
                .map(|o| o.value)
                .unwrap_or(Currency::ZERO);
            StorageProofEffect {
                contract_id: proof.contract_id,
                output_id,
                payout,
            }
        })
        .collect();
    Ok(TxApplyRecord {
        consumed_output_ids,
        created_output_ids,
        created_contract_ids,
        storage_proof_effects,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::contract::FileContract;
    use crate::spend::SpendConditions;
    use crate::transaction::Input;
    use crate::types::Target;

    fn empty_block(parent: Hash256, timestamp: i64, miner: Hash256) -> Block {
        Block {
            parent_block: parent,
            timestamp,
            nonce: 0,
            miner_address: miner,
            merkle_root: shared::merkle_root(&[]),
            transactions: vec![],
        }
    }

    fn setup() -> (BlockTree, ConsensusState, Mempool, ConsensusParams, BlockID) {
        let params = ConsensusParams::default();
        let mut tree = BlockTree::new();
        let genesis = empty_block(Hash256::zero(), 0, Hash256::keccak256(b"genesis-miner"));
        let genesis_id = tree.insert_genesis(genesis, Target::max()).unwrap();
        let state = ConsensusState::new(genesis_id);
        let mempool = Mempool::new();
        (tree, state, mempool, params, genesis_id)
    }

    #[test]
    fn test_apply_then_reverse_empty_block_round_trips() {
        let (mut tree, mut state, mut mempool, params, genesis_id) = setup();
        let block = empty_block(genesis_id, 600, Hash256::keccak256(b"miner-1"));
        let node_id = tree.add_block_to_tree(genesis_id, block, &params).unwrap();

        let before = state.clone();
        apply_block(node_id, &mut tree, &mut state, &mut mempool, &params).unwrap();
        assert_ne!(state.current_block, before.current_block);

        reverse_block(node_id, &mut tree, &mut state, &mut mempool).unwrap();
        assert_eq!(state.current_block, before.current_block);
        assert_eq!(state.current_path, before.current_path);
        assert_eq!(state.unspent_outputs, before.unspent_outputs);
    }

    #[test]
    fn test_apply_then_reverse_with_spend_round_trips() {
        let (mut tree, mut state, mut mempool, params, genesis_id) = setup();

        let conditions = SpendConditions {
            time_lock: 0,
            num_signatures: 0,
            public_keys: vec![],
        };
        let spend_hash = conditions.spend_hash().unwrap();
        let seed_output_id = Hash256::keccak256(b"seed-output");
        state.unspent_outputs.insert(
            seed_output_id,
            Output {
                value: Currency::new(100),
                spend_hash,
            },
        );

        let spend = Transaction {
            inputs: vec![Input {
                output_id: seed_output_id,
                spend_conditions: conditions,
            }],
            miner_fees: vec![Currency::new(0)],
            outputs: vec![Output {
                value: Currency::new(100),
                spend_hash: Hash256::keccak256(b"recipient"),
            }],
            file_contracts: vec![],
            storage_proofs: vec![],
            signatures: vec![],
        };

        let mut block = empty_block(genesis_id, 600, Hash256::keccak256(b"miner-2"));
        block.transactions.push(spend);
        block.merkle_root = block.compute_merkle_root().unwrap();
        let node_id = tree.add_block_to_tree(genesis_id, block, &params).unwrap();

        let before = state.clone();
        apply_block(node_id, &mut tree, &mut state, &mut mempool, &params).unwrap();
        assert!(!state.unspent_outputs.contains_key(&seed_output_id));
        assert!(state.spent_outputs.contains_key(&seed_output_id));

        reverse_block(node_id, &mut tree, &mut state, &mut mempool).unwrap();
        assert_eq!(state.unspent_outputs, before.unspent_outputs);
        assert_eq!(state.spent_outputs, before.spent_outputs);
    }

    #[test]
    fn test_apply_block_with_contract_creation_and_termination() {
        let (mut tree, mut state, mut mempool, params, genesis_id) = setup();

        let contract = FileContract {
            contract_fund: Currency::new(50),
            start: 1,
            end: 2, // terminates the block after creation
            challenge_frequency: 1,
            tolerance: 1,
            valid_proof_payout: Currency::new(10),
            valid_proof_address: Hash256::keccak256(b"valid"),
            missed_proof_payout: Currency::new(10),
            missed_proof_address: Hash256::keccak256(b"missed"),
        };

        let conditions = SpendConditions {
            time_lock: 0,
            num_signatures: 0,
            public_keys: vec![],
        };
        let seed_output_id = Hash256::keccak256(b"contract-seed");
        state.unspent_outputs.insert(
            seed_output_id,
            Output {
                value: Currency::new(50),
                spend_hash: conditions.spend_hash().unwrap(),
            },
        );

        let funding_tx = Transaction {
            inputs: vec![Input {
                output_id: seed_output_id,
                spend_conditions: conditions,
            }],
            miner_fees: vec![],
            outputs: vec![],
            file_contracts: vec![contract],
            storage_proofs: vec![],
            signatures: vec![],
        };

        let mut block = empty_block(genesis_id, 600, Hash256::keccak256(b"miner-3"));
        block.transactions.push(funding_tx);
        block.merkle_root = block.compute_merkle_root().unwrap();
        let node_id = tree.add_block_to_tree(genesis_id, block, &params).unwrap();

        apply_block(node_id, &mut tree, &mut state, &mut mempool, &params).unwrap();
        // height is 1, contract End == 1 is not true yet (End=2), so it
        // should still be open after this block.
        assert_eq!(state.open_contracts.len(), 1);
    }
}
