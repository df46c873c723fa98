//! Chain client contract.
//!
//! The RPC/bundler client is owned by the caller and handed to the service
//! as an `Arc`; the service keeps no process-wide client caches.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Chain client errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// RPC unreachable, timed out or returned garbage
    #[error("Transport error: {0}")]
    Transport(String),

    /// Node or bundler refused the transaction (nonce, gas, fee)
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Execution reverted
    #[error("Execution reverted: {0}")]
    Reverted(String),
}

/// What a submission does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    /// Factory call deploying the wallet
    Deployment,
    /// `execTransaction` on the wallet
    Execution,
}

/// Factory call deploying a wallet, attached to an execution when the
/// execution model supports deploy-plus-call in one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentCall {
    pub factory: Address,
    pub calldata: Bytes,
}

/// A transaction handed to the chain client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub kind: SubmissionKind,
    pub chain_id: u64,
    /// Wallet the submission acts for
    pub wallet: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub deployment: Option<DeploymentCall>,
}

/// Chain access consumed by the pipeline
///
/// Every method is an I/O boundary; none is retried by the service.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Contract code at an address; `None` or empty when nothing is deployed
    async fn get_bytecode(&self, address: Address) -> Result<Option<Bytes>, ChainError>;

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError>;

    /// Current Safe nonce of a deployed wallet
    async fn get_nonce(&self, address: Address) -> Result<U256, ChainError>;

    /// Submit and return the transaction hash; confirmation polling is the
    /// caller's job
    async fn submit_transaction(&self, submission: &Submission) -> Result<B256, ChainError>;
}
