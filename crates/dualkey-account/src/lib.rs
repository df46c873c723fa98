//! # dualkey-account
//!
//! Deterministic addressing for Safe smart accounts.
//!
//! A wallet's address is computed from its owner set, threshold and salt
//! nonce before anything is deployed, using the proxy factory's two-step
//! CREATE2 scheme. Nothing in this crate touches the network: whether
//! bytecode exists at a derived address is a separate probe owned by the
//! caller.
//!
//! The crate also carries the Safe ABI pieces needed afterwards: the
//! factory deployment calldata and EIP-712 hashing of Safe transactions,
//! both through the `sol!` bindings in [`contracts`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod contracts;
pub mod create2;
pub mod errors;
pub mod owner;
pub mod safe;
pub mod transaction;
pub mod types;

pub use create2::{create2_address, derive_address, proxy_init_code_hash, safe_salt};
pub use errors::{AddressDerivationError, Result};
pub use owner::owner_address;
pub use safe::{create_proxy_calldata, setup_initializer, SafeDeployment};
pub use transaction::{Operation, SafeTransaction};
pub use types::SmartAccount;

pub use alloy_primitives::{Address, Bytes, B256, U256};
