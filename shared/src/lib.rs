pub mod crypto;
pub mod encode;
pub mod error;
pub mod hash;
pub mod types;

pub use crypto::{
    public_key_from_bytes, sign_transaction_hash, signature_from_bytes,
    verify_transaction_signature, verify, KeyPair, PrivateKey, PublicKey, Signature,
    SignatureAlgorithm,
};
pub use encode::encode;
pub use error::BlockchainError;
pub use hash::{merkle_root, Hash256};

pub type Result<T> = std::result::Result<T, BlockchainError>;
