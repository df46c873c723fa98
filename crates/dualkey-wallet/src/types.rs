//! Wallet, key record and pipeline types.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use dualkey_crypto::{EncryptedShare, RecoveryKey, RecoveryKeyHash};
use dualkey_webauthn::Challenge;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Domain prefix of the transaction binding hash
pub const DOMAIN_TRANSACTION_BINDING: &str = "dualkey:tx-binding:v1";

/// Authorization pipeline stages
///
/// `Requested -> ChallengeBound -> CredentialVerified -> KeyCombined ->
/// DeploymentChecked -> Submitted -> {Confirmed | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    Requested,
    ChallengeBound,
    CredentialVerified,
    KeyCombined,
    DeploymentChecked,
    Submitted,
    /// Reached by the caller after polling; never set by the service
    Confirmed,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Requested => "REQUESTED",
            PipelineStage::ChallengeBound => "CHALLENGE_BOUND",
            PipelineStage::CredentialVerified => "CREDENTIAL_VERIFIED",
            PipelineStage::KeyCombined => "KEY_COMBINED",
            PipelineStage::DeploymentChecked => "DEPLOYMENT_CHECKED",
            PipelineStage::Submitted => "SUBMITTED",
            PipelineStage::Confirmed => "CONFIRMED",
            PipelineStage::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Per-user split-key record
///
/// Holds the device share's public half, never the device share itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub user_id: Uuid,
    /// Compressed SEC1 public key of the device share
    pub device_public_key: Vec<u8>,
    /// EOA address of the combined key (the Safe owner)
    pub owner_address: Address,
    pub encrypted_server_share: EncryptedShare,
    pub recovery_hash: RecoveryKeyHash,
    pub created_at: u64,
    pub rotated_at: Option<u64>,
}

/// Directory entry for one wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: Address,
    pub user_id: Uuid,
    pub name: String,
    pub chain_id: u64,
    /// Per-user slot; also the Safe salt nonce
    pub salt_nonce: u64,
    /// Safe owner at derivation time
    pub owner: Address,
    pub is_default: bool,
    pub created_at: u64,
}

/// How callers pick "the current wallet"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletSelector {
    /// The default wallet, or the newest if none is flagged
    Default,
    /// Highest slot
    Newest,
    Slot(u64),
    Address(Address),
}

/// Transaction a caller asks to send from a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub wallet: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

/// A requested transaction, stored until its challenge is answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub user_id: Uuid,
    pub wallet: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: u64,
    /// Timestamp folded into the binding
    pub created_at: u64,
}

impl TransactionIntent {
    /// Canonical encoding
    ///
    /// Layout:
    /// - version: u8 (0x01)
    /// - chain_id: u64 big-endian
    /// - wallet: 20 bytes
    /// - to: 20 bytes
    /// - value: uint256 big-endian (32 bytes)
    /// - created_at: u64 big-endian
    /// - data length: u32 big-endian
    /// - data
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + 8 + 20 + 20 + 32 + 8 + 4 + self.data.len());
        out.push(0x01);
        out.extend_from_slice(&self.chain_id.to_be_bytes());
        out.extend_from_slice(self.wallet.as_slice());
        out.extend_from_slice(self.to.as_slice());
        out.extend_from_slice(&self.value.to_be_bytes::<32>());
        out.extend_from_slice(&self.created_at.to_be_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Hash embedded in the transaction challenge
    pub fn binding_hash(&self) -> [u8; 32] {
        let mut preimage = DOMAIN_TRANSACTION_BINDING.as_bytes().to_vec();
        preimage.extend_from_slice(&self.canonical_bytes());
        keccak256(&preimage).0
    }

    /// The intent a request would produce under this intent's context
    pub fn with_request(&self, request: &TransactionRequest) -> Self {
        Self {
            user_id: self.user_id,
            wallet: request.wallet,
            to: request.to,
            value: request.value,
            data: request.data.clone(),
            chain_id: self.chain_id,
            created_at: self.created_at,
        }
    }
}

/// Issued transaction challenge
#[derive(Debug, Clone)]
pub struct TransactionChallenge {
    pub challenge: Challenge,
    /// Value the client passes to `navigator.credentials.get()`
    pub encoded_challenge: String,
    pub intent: TransactionIntent,
}

/// Successful plain authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub credential_id: Vec<u8>,
    pub sign_count: u32,
}

/// Result of `register_wallet`
///
/// `recovery_key` is the only copy of the raw key; it is never stored or
/// returned again.
#[derive(Debug)]
pub struct WalletRegistration {
    pub wallet: Wallet,
    pub owner_address: Address,
    pub recovery_key: RecoveryKey,
}

/// Result of a server share rotation
#[derive(Debug)]
pub struct KeyRotation {
    pub previous_owner: Address,
    pub owner_address: Address,
    /// Replaces the recovery key that authorized the rotation
    pub recovery_key: RecoveryKey,
}

/// What happened to the wallet's deployment during a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentOutcome {
    AlreadyDeployed,
    /// Factory call submitted on its own
    Separate { transaction_hash: B256 },
    /// Factory call attached to the execution
    Atomic,
}

/// Result of `deploy_wallet`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentReceipt {
    pub wallet: Address,
    pub outcome: DeploymentOutcome,
}

/// Result of `authorize_transaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationReceipt {
    pub wallet: Address,
    pub transaction_hash: B256,
    pub safe_tx_hash: B256,
    pub safe_nonce: U256,
    pub deployment: DeploymentOutcome,
    /// Stages passed, in order
    pub stages: Vec<PipelineStage>,
}
