//! Recovery keys.
//!
//! A recovery key is shown to the user once, at wallet registration, and is
//! the only way to re-authorize server share regeneration after the device
//! share is lost. Only a salted SHA-256 hash of it is ever stored.

use crate::{
    constants::*,
    errors::*,
    hashing::{constant_time_compare, domain_digest},
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Raw recovery key, rendered as dash-separated hex groups
pub struct RecoveryKey(Zeroizing<String>);

impl RecoveryKey {
    /// Generate a new recovery key from the OS RNG
    pub fn generate() -> Result<Self> {
        let mut raw = Zeroizing::new([0u8; RECOVERY_KEY_SIZE]);
        OsRng
            .try_fill_bytes(raw.as_mut())
            .map_err(|e| CryptoError::RandomGenerationFailed(e.to_string()))?;
        Ok(Self(render(&raw)))
    }

    /// Parse a user-supplied recovery key
    ///
    /// Dashes, whitespace and letter case are ignored.
    pub fn parse(text: &str) -> Result<Self> {
        let raw = decode(text)?;
        Ok(Self(render(&raw)))
    }

    /// Display form, e.g. `0a1b2c3d-...`
    ///
    /// # Security
    ///
    /// Return this to the user exactly once; never log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn raw(&self) -> Result<Zeroizing<[u8; RECOVERY_KEY_SIZE]>> {
        decode(&self.0)
    }
}

impl fmt::Debug for RecoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryKey(<redacted>)")
    }
}

/// Stored one-way hash of a recovery key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryKeyHash {
    /// Random per-key salt
    pub salt: [u8; RECOVERY_SALT_SIZE],
    /// SHA-256("dualkey:recovery:v1" || salt || key)
    pub digest: [u8; 32],
}

/// Generate a new recovery key
pub fn generate_recovery_key() -> Result<RecoveryKey> {
    RecoveryKey::generate()
}

/// Hash a recovery key for storage with a fresh random salt
pub fn hash_recovery_key(key: &RecoveryKey) -> Result<RecoveryKeyHash> {
    let mut salt = [0u8; RECOVERY_SALT_SIZE];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::RandomGenerationFailed(e.to_string()))?;

    let raw = key.raw()?;
    Ok(RecoveryKeyHash {
        salt,
        digest: salted_digest(&salt, &raw),
    })
}

/// Verify a presented recovery key against its stored hash in constant time
pub fn verify_recovery_key(presented: &str, stored: &RecoveryKeyHash) -> Result<()> {
    let raw = decode(presented)?;
    let digest = salted_digest(&stored.salt, &raw);

    if constant_time_compare(&digest, &stored.digest) {
        Ok(())
    } else {
        Err(CryptoError::RecoveryKeyMismatch)
    }
}

fn salted_digest(salt: &[u8; RECOVERY_SALT_SIZE], raw: &[u8; RECOVERY_KEY_SIZE]) -> [u8; 32] {
    domain_digest(DOMAIN_RECOVERY_HASH, &[salt.as_slice(), raw.as_slice()])
}

fn render(raw: &[u8; RECOVERY_KEY_SIZE]) -> Zeroizing<String> {
    let hex = Zeroizing::new(hex::encode(raw));
    let groups = hex.len() / RECOVERY_KEY_GROUP_LEN;
    let mut out = Zeroizing::new(String::with_capacity(hex.len() + groups));
    for (i, chunk) in hex.as_bytes().chunks(RECOVERY_KEY_GROUP_LEN).enumerate() {
        if i > 0 {
            out.push('-');
        }
        // chunks of an ASCII hex string are valid UTF-8
        out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
    }
    out
}

fn decode(text: &str) -> Result<Zeroizing<[u8; RECOVERY_KEY_SIZE]>> {
    let compact: Zeroizing<String> = Zeroizing::new(
        text.chars()
            .filter(|c| *c != '-' && !c.is_whitespace())
            .map(|c| c.to_ascii_lowercase())
            .collect(),
    );

    let mut raw = Zeroizing::new([0u8; RECOVERY_KEY_SIZE]);
    hex::decode_to_slice(compact.as_str(), raw.as_mut())
        .map_err(|_| CryptoError::MalformedRecoveryKey)?;
    Ok(raw)
}
