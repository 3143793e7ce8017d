pub mod applier;
pub mod block;
pub mod block_tree;
pub mod config;
pub mod consensus_state;
pub mod contract;
pub mod engine;
pub mod error;
pub mod fork_choice;
pub mod mempool;
pub mod spend;
pub mod storage;
pub mod transaction;
pub mod types;

pub use block::{validate_header, Block, HeaderContext};
pub use block_tree::{block_weight, heavier_fork, retarget, BlockNode, BlockTree};
pub use config::ConsensusParams;
pub use consensus_state::{ConsensusState, HeightView};
pub use contract::{FileContract, OpenContract, StorageProof};
pub use engine::Engine;
pub use error::{ConsensusError, Result};
pub use mempool::Mempool;
pub use spend::SpendConditions;
pub use transaction::{validate_transaction, Input, Output, Transaction, ValidationView};
pub use types::{BlockID, BlockWeight, ContractID, Currency, Height, OutputID, Target, Timestamp};

pub use shared::Hash256;
