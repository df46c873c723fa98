//! Error types for WebAuthn verification.

use dualkey_storage::StorageError;
use thiserror::Error;

/// Credential verification errors
///
/// None of these is retried automatically. Each one is a terminal rejection
/// of the attempt that produced it.
#[derive(Debug, Error)]
pub enum WebAuthnError {
    /// Challenge was never issued, already consumed, or past its expiry
    #[error("Challenge expired or not found")]
    ChallengeExpired,

    /// Signed challenge differs from the issued one, or was issued for
    /// another ceremony or user
    #[error("Challenge mismatch: {0}")]
    ChallengeMismatch(String),

    /// Client-data origin or authenticator-data RP ID hash mismatch
    #[error("Origin mismatch: {0}")]
    OriginMismatch(String),

    #[error("Unexpected ceremony type: expected {expected}, got {actual}")]
    UnexpectedCeremonyType {
        expected: &'static str,
        actual: String,
    },

    #[error("Invalid client data: {0}")]
    InvalidClientData(String),

    #[error("Invalid authenticator data: {0}")]
    InvalidAuthenticatorData(String),

    #[error("User presence flag not set")]
    UserPresenceRequired,

    #[error("User verification required")]
    UserVerificationRequired,

    #[error("Signature invalid")]
    SignatureInvalid,

    /// Counter did not advance: possible cloned authenticator
    #[error("Possible cloned authenticator: counter {presented} <= stored {stored}")]
    PossibleCloneDetected { stored: u32, presented: u32 },

    /// Stored or presented public key is malformed or of unknown type
    #[error("Key format error: {0}")]
    KeyFormatError(String),

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Authenticator revoked")]
    AuthenticatorRevoked,

    #[error("Authenticator not owned by user")]
    AuthenticatorNotOwned,

    #[error("Credential already registered")]
    CredentialAlreadyRegistered,

    #[error("Unsupported attestation format: {0}")]
    UnsupportedAttestation(String),

    #[error("Invalid attestation: {0}")]
    InvalidAttestation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Random number generation failed: {0}")]
    RandomGenerationFailed(String),
}

impl WebAuthnError {
    /// Errors that require the client to request a fresh challenge
    pub fn is_challenge_error(&self) -> bool {
        matches!(
            self,
            WebAuthnError::ChallengeExpired | WebAuthnError::ChallengeMismatch(_)
        )
    }

    /// Errors worth recording as security events
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            WebAuthnError::PossibleCloneDetected { .. }
                | WebAuthnError::SignatureInvalid
                | WebAuthnError::AuthenticatorRevoked
                | WebAuthnError::AuthenticatorNotOwned
        )
    }
}

/// Result type for WebAuthn operations
pub type Result<T> = std::result::Result<T, WebAuthnError>;
