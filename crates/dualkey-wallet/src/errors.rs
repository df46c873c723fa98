//! Error types for the authorization pipeline and wallet directory.

use crate::{chain::ChainError, types::PipelineStage};
use alloy_primitives::{Address, U256};
use dualkey_account::AddressDerivationError;
use dualkey_crypto::CryptoError;
use dualkey_storage::StorageError;
use dualkey_webauthn::WebAuthnError;
use thiserror::Error;
use uuid::Uuid;

/// What the caller should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Terminal rejection of this attempt; do not retry as-is
    Rejected,
    /// Request a fresh challenge and run the ceremony again
    RestartCeremony,
    /// Fund the wallet, then retry
    FundAndRetry,
    /// Transient; the caller may retry with fresh chain parameters
    Retryable,
    /// Bug or misconfiguration; retrying cannot help
    Fatal,
}

/// Wallet service errors
///
/// Variants carry the stage, wallet and challenge they concern. None of
/// them carries key material.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Share generation, encryption or decryption failed
    #[error("Key material error at {stage}: {source}")]
    KeyMaterial {
        stage: PipelineStage,
        #[source]
        source: CryptoError,
    },

    /// Combined key does not own the wallet
    #[error("Key shares do not match the owner of wallet {wallet}")]
    ShareMismatch { wallet: Address },

    /// Challenge expired, missing, consumed, or issued for something else
    #[error("Challenge {challenge_id} rejected at {stage}: {source}")]
    Challenge {
        stage: PipelineStage,
        challenge_id: Uuid,
        #[source]
        source: WebAuthnError,
    },

    /// Challenge could not be issued or stored
    #[error("Challenge issuance failed: {0}")]
    ChallengeIssuance(#[source] WebAuthnError),

    /// Revoking or listing authenticators failed
    #[error("Authenticator management failed: {0}")]
    AuthenticatorManagement(#[source] WebAuthnError),

    /// Origin, signature, counter or key-format failure
    #[error("Credential verification failed for challenge {challenge_id}: {source}")]
    CredentialVerification {
        challenge_id: Uuid,
        #[source]
        source: WebAuthnError,
    },

    /// Submitted transaction differs from the one the challenge was bound to
    #[error("Transaction data mismatch for wallet {wallet} (challenge {challenge_id})")]
    TransactionDataMismatch { wallet: Address, challenge_id: Uuid },

    #[error("Address derivation failed: {0}")]
    AddressDerivation(#[from] AddressDerivationError),

    /// Deployment needs funds the wallet does not hold
    #[error("Wallet {wallet} needs funds to deploy: required {required}, available {available}")]
    NeedsFunds {
        wallet: Address,
        required: U256,
        available: U256,
    },

    /// Factory call reverted
    #[error("Deployment of wallet {wallet} failed: {reason}")]
    Deployment { wallet: Address, reason: String },

    /// Chain read or submission failed
    #[error("Chain error at {stage} for wallet {wallet}: {source}")]
    Submission {
        stage: PipelineStage,
        wallet: Address,
        #[source]
        source: ChainError,
    },

    #[error("Wallet not found: {0}")]
    WalletNotFound(Address),

    #[error("No wallets for user {0}")]
    NoWallets(Uuid),

    #[error("No key record for user {0}")]
    KeyRecordNotFound(Uuid),

    #[error("User {0} already has a key record")]
    AlreadyRegistered(Uuid),

    #[error("Invalid device public key: {0}")]
    InvalidDevicePublicKey(String),

    #[error("Invalid wallet name: {0}")]
    InvalidName(String),

    #[error("Recovery key rejected")]
    RecoveryKeyRejected,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl WalletError {
    /// Map a verifier error, separating challenge problems from
    /// credential problems
    pub fn from_verification(
        challenge_id: Uuid,
        stage: PipelineStage,
        source: WebAuthnError,
    ) -> Self {
        match source {
            WebAuthnError::Storage(e) => WalletError::Storage(e),
            source if source.is_challenge_error() => WalletError::Challenge {
                stage,
                challenge_id,
                source,
            },
            source => WalletError::CredentialVerification {
                challenge_id,
                source,
            },
        }
    }

    /// Map a failure to issue a challenge
    pub fn from_issuance(source: WebAuthnError) -> Self {
        match source {
            WebAuthnError::Storage(e) => WalletError::Storage(e),
            source => WalletError::ChallengeIssuance(source),
        }
    }

    pub fn from_management(source: WebAuthnError) -> Self {
        match source {
            WebAuthnError::Storage(e) => WalletError::Storage(e),
            source => WalletError::AuthenticatorManagement(source),
        }
    }

    pub fn key_material(stage: PipelineStage) -> impl FnOnce(CryptoError) -> Self {
        move |source| WalletError::KeyMaterial { stage, source }
    }

    pub fn chain(stage: PipelineStage, wallet: Address) -> impl FnOnce(ChainError) -> Self {
        move |source| WalletError::Submission {
            stage,
            wallet,
            source,
        }
    }

    /// How the caller should react
    pub fn disposition(&self) -> Disposition {
        match self {
            WalletError::KeyMaterial { .. } => Disposition::Fatal,
            WalletError::ShareMismatch { .. } => Disposition::Rejected,
            WalletError::Challenge { .. } => Disposition::RestartCeremony,
            WalletError::ChallengeIssuance(_) => Disposition::Retryable,
            WalletError::AuthenticatorManagement(_) => Disposition::Rejected,
            WalletError::CredentialVerification { .. } => Disposition::Rejected,
            WalletError::TransactionDataMismatch { .. } => Disposition::Rejected,
            WalletError::AddressDerivation(_) => Disposition::Fatal,
            WalletError::NeedsFunds { .. } => Disposition::FundAndRetry,
            WalletError::Deployment { .. } => Disposition::Fatal,
            WalletError::Submission { .. } => Disposition::Retryable,
            WalletError::WalletNotFound(_)
            | WalletError::NoWallets(_)
            | WalletError::KeyRecordNotFound(_)
            | WalletError::AlreadyRegistered(_)
            | WalletError::InvalidDevicePublicKey(_)
            | WalletError::InvalidName(_)
            | WalletError::RecoveryKeyRejected => Disposition::Rejected,
            WalletError::Storage(_) => Disposition::Retryable,
        }
    }

    /// Pipeline stage the error occurred at, where one applies
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            WalletError::KeyMaterial { stage, .. }
            | WalletError::Challenge { stage, .. }
            | WalletError::Submission { stage, .. } => Some(*stage),
            WalletError::CredentialVerification { .. } => Some(PipelineStage::ChallengeBound),
            WalletError::TransactionDataMismatch { .. } => Some(PipelineStage::CredentialVerified),
            WalletError::ShareMismatch { .. } => Some(PipelineStage::KeyCombined),
            WalletError::NeedsFunds { .. } | WalletError::Deployment { .. } => {
                Some(PipelineStage::DeploymentChecked)
            }
            _ => None,
        }
    }
}

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, WalletError>;
