//! Sizes and domain separation strings.
//!
//! All constants are normative: changing any of them invalidates every
//! stored share and recovery hash.

/// Size of a key share (a secp256k1 scalar) in bytes
pub const SHARE_SIZE: usize = 32;

/// Size of a compressed SEC1 secp256k1 public key
pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;

/// Size of a recoverable ECDSA signature (`r || s || v`)
pub const RECOVERABLE_SIGNATURE_SIZE: usize = 65;

/// Size of the service master key in bytes
pub const MASTER_KEY_SIZE: usize = 32;

/// Size of XChaCha20-Poly1305 nonces in bytes (192 bits)
pub const NONCE_SIZE: usize = 24;

/// Size of XChaCha20-Poly1305 authentication tags in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the raw recovery key secret in bytes
pub const RECOVERY_KEY_SIZE: usize = 32;

/// Size of the per-hash salt for recovery keys
pub const RECOVERY_SALT_SIZE: usize = 16;

/// Number of hex characters per group in a rendered recovery key
pub const RECOVERY_KEY_GROUP_LEN: usize = 8;

/// Domain separation for the per-owner share encryption key
/// Format: "dualkey:share-kek:v1" || owner_id
pub const DOMAIN_SHARE_KEK: &str = "dualkey:share-kek:v1";

/// Domain separation for share ciphertext AAD
/// Format: "dualkey:share:v1" || role || owner_id
pub const DOMAIN_SHARE_AAD: &str = "dualkey:share:v1";

/// Domain separation for recovery key hashing
/// Format: "dualkey:recovery:v1" || salt || recovery_key
pub const DOMAIN_RECOVERY_HASH: &str = "dualkey:recovery:v1";
