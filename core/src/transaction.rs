//! Transactions and the §4.1 validator.

use crate::config::ConsensusParams;
use crate::contract::{FileContract, OpenContract, StorageProof};
use crate::error::{ConsensusError, Result};
use crate::spend::SpendConditions;
use crate::storage::verify_storage_proof;
use crate::types::{ContractID, Currency, Height, OutputID};
use serde::{Deserialize, Serialize};
use shared::{encode, verify, Hash256};
use std::collections::{HashMap, HashSet};

/// A UTXO: a value locked to the hash of some `SpendConditions` (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: Currency,
    pub spend_hash: Hash256,
}

/// Reference to an `Output` plus the preimage that unlocks it (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Input {
    pub output_id: OutputID,
    pub spend_conditions: SpendConditions,
}

/// One contribution toward authorizing an input (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRecord {
    /// Index of the input this signature authorizes.
    pub input_index: usize,
    /// Index into that input's `SpendConditions.public_keys`.
    pub public_key_index: usize,
    /// Height below which this signature may still be applied.
    pub time_lock: Height,
    /// Raw signature bytes over `sighash(t, input_index)`.
    pub signature: Vec<u8>,
}

/// An atomic state transition (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub miner_fees: Vec<Currency>,
    pub outputs: Vec<Output>,
    pub file_contracts: Vec<FileContract>,
    pub storage_proofs: Vec<StorageProof>,
    pub signatures: Vec<SignatureRecord>,
}

impl Transaction {
    /// Canonical encoding used for hashing, signing, and derived ids.
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails to encode.
    pub fn encode(&self) -> shared::Result<Vec<u8>> {
        encode(self)
    }

    /// Content hash of the transaction; used as the mempool's
    /// `TransactionList` key instead of the first input's `OutputID`
    /// (§9 bullet 1, SPEC_FULL supplement 4).
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails to encode.
    pub fn id(&self) -> shared::Result<Hash256> {
        Ok(Hash256::keccak256(&self.encode()?))
    }

    /// `sighash(t, input_index)`: the message each signature record signs.
    /// Binds to the whole transaction and the specific input position so
    /// a signature cannot be replayed onto a different input. Covers
    /// every field except `signatures` itself — a signer signs before
    /// its own (and every other) signature record exists, and a
    /// validator must recompute the same message after they've all been
    /// attached (Sia's `CoveredFields` semantics).
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails to encode.
    pub fn sighash(&self, input_index: usize) -> shared::Result<Hash256> {
        let mut unsigned = self.clone();
        unsigned.signatures.clear();
        let mut bytes = unsigned.encode()?;
        bytes.extend_from_slice(&(input_index as u64).to_be_bytes());
        Ok(Hash256::keccak256(&bytes))
    }

    /// Deterministic id of output `i` created by this transaction
    /// (§6 `outputID`).
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails to encode.
    pub fn output_id(&self, i: usize) -> shared::Result<OutputID> {
        let mut bytes = self.encode()?;
        bytes.extend_from_slice(b"output");
        bytes.extend_from_slice(&(i as u64).to_be_bytes());
        Ok(Hash256::keccak256(&bytes))
    }

    /// Deterministic id of the file contract created at index `i`
    /// (§6 `fileContractID`).
    ///
    /// # Errors
    ///
    /// Returns error if the transaction fails to encode.
    pub fn file_contract_id(&self, i: usize) -> shared::Result<ContractID> {
        let mut bytes = self.encode()?;
        bytes.extend_from_slice(b"contract");
        bytes.extend_from_slice(&(i as u64).to_be_bytes());
        Ok(Hash256::keccak256(&bytes))
    }

    #[must_use]
    pub fn total_miner_fees(&self) -> Option<Currency> {
        Currency::checked_sum(self.miner_fees.iter().copied())
    }
}

/// Whatever the consensus state needs to expose for transaction
/// validation, kept as a trait so fixtures stay small in tests and so
/// the validator doesn't depend on `ConsensusState` directly.
pub trait ValidationView {
    fn current_height(&self) -> Height;
    fn lookup_output(&self, id: &OutputID) -> Option<&Output>;
    fn lookup_open_contract(&self, id: &ContractID) -> Option<&OpenContract>;
}

/// Per-input authorization bookkeeping, held only for the duration of
/// validating one transaction (§4.1, final paragraph).
struct InputAuth {
    remaining_signatures: u32,
    used_keys: HashSet<usize>,
}

/// Validates a transaction against a consensus-state snapshot (§4.1).
/// Checks run in the documented order so early rejections stay reachable
/// from targeted tests.
///
/// # Errors
///
/// Returns `ConsensusError::InvalidTransaction` describing the first
/// check that failed.
pub fn validate_transaction<V: ValidationView>(
    t: &Transaction,
    view: &V,
    _params: &ConsensusParams,
) -> Result<()> {
    let h = view.current_height();

    // 1. Inputs resolve & authorize.
    let mut seen_outputs = HashSet::new();
    let mut auth: HashMap<OutputID, InputAuth> = HashMap::new();
    for input in &t.inputs {
        if !seen_outputs.insert(input.output_id) {
            return Err(ConsensusError::InvalidTransaction(format!(
                "output {:?} consumed twice in the same transaction",
                input.output_id
            )));
        }
        let output = view.lookup_output(&input.output_id).ok_or_else(|| {
            ConsensusError::InvalidTransaction(format!(
                "output {:?} not in UnspentOutputs",
                input.output_id
            ))
        })?;
        let spend_hash = input.spend_conditions.spend_hash()?;
        if spend_hash != output.spend_hash {
            return Err(ConsensusError::InvalidTransaction(format!(
                "spend conditions for {:?} do not hash to the output's SpendHash",
                input.output_id
            )));
        }
        if input.spend_conditions.time_lock > h {
            return Err(ConsensusError::InvalidTransaction(format!(
                "input {:?} still time-locked",
                input.output_id
            )));
        }
        auth.insert(
            input.output_id,
            InputAuth {
                remaining_signatures: input.spend_conditions.num_signatures,
                used_keys: HashSet::new(),
            },
        );
    }

    // 2. Contracts well-formed.
    for fc in &t.file_contracts {
        if fc.start < h {
            return Err(ConsensusError::InvalidTransaction(
                "file contract Start must be >= current height".to_string(),
            ));
        }
        if fc.end <= fc.start {
            return Err(ConsensusError::InvalidTransaction(
                "file contract End must be > Start".to_string(),
            ));
        }
    }

    // 3. Storage proofs eligible. Proof-body verification is delegated to
    // the crypto collaborator and is mandatory (§4.1 item 3, §9 bullet 2).
    for proof in &t.storage_proofs {
        let open = view
            .lookup_open_contract(&proof.contract_id)
            .ok_or_else(|| {
                ConsensusError::InvalidTransaction(format!(
                    "storage proof references unknown contract {:?}",
                    proof.contract_id
                ))
            })?;
        if open.window_satisfied {
            return Err(ConsensusError::InvalidTransaction(format!(
                "contract {:?} window already satisfied",
                proof.contract_id
            )));
        }
        if !verify_storage_proof(open, proof) {
            return Err(ConsensusError::InvalidTransaction(format!(
                "storage proof for contract {:?} failed verification",
                proof.contract_id
            )));
        }
    }

    // 4. Value conservation.
    let input_total = t
        .inputs
        .iter()
        .map(|i| view.lookup_output(&i.output_id).expect("checked above").value)
        .try_fold(Currency::ZERO, |acc, v| acc.checked_add(v))
        .ok_or_else(|| ConsensusError::InvalidTransaction("input value overflow".to_string()))?;
    let fee_total = t
        .total_miner_fees()
        .ok_or_else(|| ConsensusError::InvalidTransaction("miner fee overflow".to_string()))?;
    let output_total = Currency::checked_sum(t.outputs.iter().map(|o| o.value))
        .ok_or_else(|| ConsensusError::InvalidTransaction("output value overflow".to_string()))?;
    let contract_total = Currency::checked_sum(t.file_contracts.iter().map(|fc| fc.contract_fund))
        .ok_or_else(|| ConsensusError::InvalidTransaction("contract fund overflow".to_string()))?;
    let rhs = fee_total
        .checked_add(output_total)
        .and_then(|v| v.checked_add(contract_total))
        .ok_or_else(|| ConsensusError::InvalidTransaction("output side overflow".to_string()))?;
    if input_total != rhs {
        return Err(ConsensusError::InvalidTransaction(format!(
            "value does not conserve: inputs {} != fees+outputs+contracts {}",
            input_total.value(),
            rhs.value()
        )));
    }

    // 5. Signatures.
    for (position, sig) in t.signatures.iter().enumerate() {
        let input = t.inputs.get(sig.input_index).ok_or_else(|| {
            ConsensusError::InvalidTransaction(format!(
                "signature {position} references out-of-range input {}",
                sig.input_index
            ))
        })?;
        let entry = auth.get_mut(&input.output_id).expect("input indexed above");
        if entry.remaining_signatures == 0 {
            return Err(ConsensusError::InvalidTransaction(format!(
                "input {:?} already fully signed",
                input.output_id
            )));
        }
        if entry.used_keys.contains(&sig.public_key_index) {
            return Err(ConsensusError::InvalidTransaction(format!(
                "public key index {} already used for input {:?}",
                sig.public_key_index, input.output_id
            )));
        }
        if sig.time_lock > h {
            return Err(ConsensusError::InvalidTransaction(
                "signature still time-locked".to_string(),
            ));
        }
        let public_key = input
            .spend_conditions
            .public_keys
            .get(sig.public_key_index)
            .ok_or_else(|| {
                ConsensusError::InvalidTransaction("public key index out of range".to_string())
            })?;
        let message = t.sighash(sig.input_index)?;
        let ok = verify(message.as_bytes(), public_key, &sig.signature)?;
        if !ok {
            return Err(ConsensusError::InvalidTransaction(format!(
                "signature {position} failed to verify"
            )));
        }
        entry.remaining_signatures -= 1;
        entry.used_keys.insert(sig.public_key_index);
    }

    // Signature completeness (§9 bullet 3, SPEC_FULL supplement 2): every
    // input touched above must end with no signatures outstanding.
    for (output_id, entry) in &auth {
        if entry.remaining_signatures != 0 {
            return Err(ConsensusError::InvalidTransaction(format!(
                "input {output_id:?} left under-signed ({} remaining)",
                entry.remaining_signatures
            )));
        }
    }

    Ok(())
}
