//! Cryptographic error types.

use thiserror::Error;

/// Key material errors
///
/// Every variant is fatal to the operation that produced it. None of them is
/// ever answered by falling back to unencrypted or partially combined material.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid key size
    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected key size in bytes
        expected: usize,
        /// Actual key size in bytes
        actual: usize,
    },

    /// Share bytes are not a valid non-zero secp256k1 scalar
    #[error("Invalid key share: not a valid curve scalar")]
    InvalidShare,

    /// Both shares passed to combine carry the same role
    #[error("Cannot combine two {0} shares")]
    RoleMismatch(&'static str),

    /// Shares summed to zero (no usable key)
    #[error("Share combination produced a degenerate key")]
    DegenerateCombination,

    /// Invalid public key encoding
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (wrong key, wrong context or tampered ciphertext)
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// HKDF expand rejected the requested output length
    #[error("Share key derivation failed")]
    HkdfError,

    /// Random number generation failed
    #[error("Random number generation failed: {0}")]
    RandomGenerationFailed(String),

    /// Recovery key text could not be parsed
    #[error("Malformed recovery key")]
    MalformedRecoveryKey,

    /// Recovery key did not match the stored hash
    #[error("Recovery key does not match")]
    RecoveryKeyMismatch,
}

/// Result type for cryptographic operations
pub type Result<T> = std::result::Result<T, CryptoError>;
