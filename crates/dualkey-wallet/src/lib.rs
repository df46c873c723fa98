//! # dualkey-wallet
//!
//! Authorization pipeline and multi-wallet directory.
//!
//! A transaction moves through
//! `REQUESTED -> CHALLENGE_BOUND -> CREDENTIAL_VERIFIED -> KEY_COMBINED ->
//! DEPLOYMENT_CHECKED -> SUBMITTED`: a challenge is bound to the exact
//! transaction, the user's assertion over it is verified, the stored
//! intent is compared with what is submitted, the device and server shares
//! are combined under a per-wallet lock, the Safe is deployed if it has no
//! code yet, and the signed `execTransaction` goes to the chain client.
//! Confirmation is left to the caller.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod chain;
pub mod config;
pub mod directory;
pub mod errors;
pub mod keys;
pub mod locks;
pub mod service;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use chain::{ChainClient, ChainError, DeploymentCall, Submission, SubmissionKind};
pub use config::{master_key_from_env, parse_master_key, DeploymentMode, MasterKey, WalletConfig};
pub use directory::WalletDirectory;
pub use errors::{Disposition, Result, WalletError};
pub use service::WalletService;
pub use types::*;
