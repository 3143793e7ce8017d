//! Core data-model types shared across the engine's modules (§3).

use num_bigint::BigUint;
use num_rational::BigRational;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use shared::Hash256;
use std::ops::{Add, Sub};

/// Non-negative coin amount with explicit, checked summation: overflow is
/// a hard error rather than a silent wraparound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Currency(pub u64);

impl Currency {
    pub const ZERO: Currency = Currency(0);

    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Checked addition; `None` on overflow rather than a silent wrap.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction; `None` if it would go negative.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Sums an iterator of `Currency`, returning `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = Currency>>(iter: I) -> Option<Currency> {
        iter.into_iter()
            .try_fold(Currency::ZERO, |acc, v| acc.checked_add(v))
    }
}

impl Add for Currency {
    type Output = Currency;
    fn add(self, rhs: Self) -> Self {
        self.checked_add(rhs).expect("currency overflow")
    }
}

impl Sub for Currency {
    type Output = Currency;
    fn sub(self, rhs: Self) -> Self {
        self.checked_sub(rhs).expect("currency underflow")
    }
}

/// Seconds since epoch.
pub type Timestamp = i64;

/// Block height; genesis is height 0.
pub type Height = u64;

/// Identifier of an unspent output.
pub type OutputID = Hash256;

/// Identifier of a file contract / open contract.
pub type ContractID = Hash256;

/// Identifier of a block.
pub type BlockID = Hash256;

/// Width in bytes of a `Target`, matching `Hash256`.
pub const TARGET_WIDTH: usize = 32;

/// Upper bound on a block id, interpreted as a big-endian unsigned
/// integer (§3). Stored at fixed width so re-encoding after a retarget
/// never changes its size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target([u8; TARGET_WIDTH]);

impl Target {
    /// The loosest possible target: all bits set.
    #[must_use]
    pub const fn max() -> Self {
        Self([0xff; TARGET_WIDTH])
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; TARGET_WIDTH]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; TARGET_WIDTH] {
        &self.0
    }

    #[must_use]
    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Re-encodes a `BigUint` back to the fixed target width, left-padding
    /// with zeros. Saturates at `Target::max()` if the value no longer
    /// fits (can only happen if retarget math is given a buggy clamp).
    #[must_use]
    pub fn from_biguint(value: &BigUint) -> Self {
        let be = value.to_bytes_be();
        if be.len() > TARGET_WIDTH {
            return Self::max();
        }
        let mut bytes = [0u8; TARGET_WIDTH];
        bytes[TARGET_WIDTH - be.len()..].copy_from_slice(&be);
        Self(bytes)
    }

    /// `id ≤ target`, both read as big-endian unsigned integers (§4.2).
    #[must_use]
    pub fn meets(&self, id: &Hash256) -> bool {
        id.as_bytes()[..] <= self.0[..]
    }
}

/// Cumulative work, an unbounded non-negative rational (§3, §4.4). Never
/// floating point, per §9.
pub type BlockWeight = BigRational;

#[must_use]
pub fn zero_weight() -> BlockWeight {
    BlockWeight::zero()
}
