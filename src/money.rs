//! Money primitives shared across the ingress, matcher, and outbox.
//!
//! All token amounts are arbitrary-precision integers in the token's
//! smallest unit ("atomic units"). Fiat amounts are integer cents. No
//! floating point appears anywhere on these paths.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An atomic-unit token amount (e.g. USDT/USDC's smallest denomination).
///
/// Backed by `U256`, which comfortably covers the 78-digit decimal range
/// the persisted schema reserves for atomic amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AtomicAmount(U256);

#[derive(Debug, Error)]
#[error("invalid atomic amount: {0}")]
pub struct AtomicAmountParseError(String);

impl AtomicAmount {
    pub const ZERO: AtomicAmount = AtomicAmount(U256::ZERO);

    pub fn from_u256(value: U256) -> Self {
        Self(value)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: AtomicAmount) -> Option<AtomicAmount> {
        self.0.checked_add(other.0).map(AtomicAmount)
    }

    pub fn checked_sub(&self, other: AtomicAmount) -> Option<AtomicAmount> {
        self.0.checked_sub(other.0).map(AtomicAmount)
    }
}

impl fmt::Display for AtomicAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AtomicAmount {
    type Err = AtomicAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str(s)
            .map(AtomicAmount)
            .map_err(|e| AtomicAmountParseError(e.to_string()))
    }
}

impl TryFrom<String> for AtomicAmount {
    type Error = AtomicAmountParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AtomicAmount::from_str(&value)
    }
}

impl From<AtomicAmount> for String {
    fn from(value: AtomicAmount) -> Self {
        value.to_string()
    }
}

impl From<u64> for AtomicAmount {
    fn from(value: u64) -> Self {
        AtomicAmount(U256::from(value))
    }
}

/// Fiat amount in integer cents. The persisted column is a 12-digit
/// decimal, comfortably inside `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FiatCents(pub i64);

impl FiatCents {
    pub fn new(cents: i64) -> Result<Self, FiatCentsError> {
        if cents < 0 {
            return Err(FiatCentsError::Negative);
        }
        if cents > 999_999_999_999 {
            return Err(FiatCentsError::OutOfRange);
        }
        Ok(FiatCents(cents))
    }
}

#[derive(Debug, Error)]
pub enum FiatCentsError {
    #[error("fiat amount must not be negative")]
    Negative,
    #[error("fiat amount exceeds the 12-digit cent budget")]
    OutOfRange,
}

impl fmt::Display for FiatCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
