//! Address derivation error types.

use alloy_primitives::Address;
use thiserror::Error;

/// Malformed inputs to address derivation
///
/// These are programming errors on the caller's side; none of them is
/// recoverable by retrying with the same inputs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressDerivationError {
    #[error("Owner set is empty")]
    EmptyOwners,

    #[error("Duplicate owner: {0}")]
    DuplicateOwner(Address),

    /// Zero address or the Safe owner-list sentinel (0x…01)
    #[error("Invalid owner address: {0}")]
    InvalidOwner(Address),

    #[error("Invalid threshold {threshold} for {owners} owner(s)")]
    InvalidThreshold { threshold: u64, owners: usize },

    #[error("Invalid proxy creation code: {0}")]
    InvalidCreationCode(String),
}

/// Result type for address derivation
pub type Result<T> = std::result::Result<T, AddressDerivationError>;
