//! File contracts and their lifecycle as `OpenContract`s (§3, §4.6, §4.7).

use crate::types::{ContractID, Currency, Height, OutputID};
use serde::{Deserialize, Serialize};
use shared::Hash256;

/// A storage agreement embedded in a transaction's output set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContract {
    /// Total funds locked into the contract at creation.
    pub contract_fund: Currency,
    /// Height at which the contract's challenge windows begin.
    pub start: Height,
    /// Height at which the contract terminates unconditionally.
    pub end: Height,
    /// Number of blocks between successive proof windows.
    pub challenge_frequency: u64,
    /// Number of missed windows tolerated before termination.
    pub tolerance: u32,
    /// Payout per satisfied window.
    pub valid_proof_payout: Currency,
    /// Address credited on a satisfied window.
    pub valid_proof_address: Hash256,
    /// Payout per missed window.
    pub missed_proof_payout: Currency,
    /// Address credited on a missed window.
    pub missed_proof_address: Hash256,
}

/// Claim that a host is storing data for the contract's current window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    pub contract_id: ContractID,
    /// Opaque proof body, interpreted and verified by the crypto
    /// collaborator (`verify_storage_proof`), never by the validator
    /// itself.
    pub proof_data: Vec<u8>,
}

/// A `FileContract` that has been applied and is live in consensus state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenContract {
    pub file_contract: FileContract,
    pub contract_id: ContractID,
    pub funds_remaining: Currency,
    pub failures: u32,
    pub window_satisfied: bool,
}

impl OpenContract {
    /// Builds the live contract at creation time: the first window is
    /// free because `Start > h` whenever the contract is created (§4.5
    /// item 3).
    #[must_use]
    pub fn new(file_contract: FileContract, contract_id: ContractID) -> Self {
        let funds_remaining = file_contract.contract_fund;
        Self {
            file_contract,
            contract_id,
            funds_remaining,
            failures: 0,
            window_satisfied: true,
        }
    }

    /// A window boundary falls at heights where `(h - Start) mod
    /// ChallengeFrequency == 0` and `h > Start` (§4.6).
    #[must_use]
    pub fn is_window_boundary(&self, h: Height) -> bool {
        h > self.file_contract.start
            && self.file_contract.challenge_frequency > 0
            && (h - self.file_contract.start) % self.file_contract.challenge_frequency == 0
    }

    /// Termination condition: funds exhausted, `End` reached, or
    /// tolerance exceeded (§4.6, §3 lifecycle).
    #[must_use]
    pub fn should_terminate(&self, h: Height) -> bool {
        self.funds_remaining == Currency::ZERO
            || self.file_contract.end == h
            || self.failures == self.file_contract.tolerance
    }
}

/// Ledger entry recording a missed window, kept on the block node that
/// produced it so the effect can be reversed byte-for-byte (§4.7 item 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedStorageProof {
    pub output_id: OutputID,
    pub contract_id: ContractID,
    pub payout: Currency,
}

/// Snapshot of an `OpenContract` at the moment it terminated, kept on the
/// block node so a reorg can resurrect it exactly (§4.7 item 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractTermination {
    pub contract: OpenContract,
    /// Set when a terminating UTXO was emitted (funds remained at
    /// termination); `None` when the contract drained to zero exactly.
    pub terminating_output_id: Option<OutputID>,
}

/// Records a window-boundary reset on a contract that survived the block
/// (did not terminate), so a block reversal can restore `WindowSatisfied`
/// to what it was before the boundary reset it to `false`. Kept alongside
/// `MissedStorageProof` rather than folded into it because a boundary
/// with no miss still needs its reset undone for byte-for-byte reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReset {
    pub contract_id: ContractID,
    pub was_satisfied_before_reset: bool,
}

/// Deterministic id for the UTXO produced by a satisfied or missed proof
/// window (§6 `storageProofOutputID`).
#[must_use]
pub fn storage_proof_output_id(contract_id: ContractID, height: Height, satisfied: bool) -> Hash256 {
    let mut data = Vec::with_capacity(32 + 8 + 1);
    data.extend_from_slice(contract_id.as_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.push(u8::from(satisfied));
    Hash256::keccak256(&data)
}

/// Deterministic id for the UTXO produced when a contract terminates with
/// funds remaining (§6 `fileContractTerminationOutputID`).
#[must_use]
pub fn file_contract_termination_output_id(contract_id: ContractID) -> Hash256 {
    let mut data = Vec::with_capacity(32 + 11);
    data.extend_from_slice(contract_id.as_bytes());
    data.extend_from_slice(b"terminated");
    Hash256::keccak256(&data)
}
