//! Device and server key shares.
//!
//! Each share is a non-zero secp256k1 scalar. The signing key is the sum of
//! the two scalars mod n, so:
//!
//! - combination is order-independent and deterministic
//! - a change to either share changes the signing key (addition is a bijection)
//! - the combined *public* key is the sum of the shares' public keys, which
//!   lets the service derive the owner address while holding only the
//!   device share's public half

use crate::{constants::*, errors::*};
use k256::{
    ecdsa::SigningKey,
    elliptic_curve::{group::Curve, sec1::ToEncodedPoint},
    NonZeroScalar, PublicKey,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

/// Which half of the split key a share is
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareRole {
    /// Generated on, and never leaves, the user's device
    Device = 0x01,
    /// Generated by the service, persisted only encrypted
    Server = 0x02,
}

impl ShareRole {
    /// Lowercase role name
    pub fn as_str(&self) -> &'static str {
        match self {
            ShareRole::Device => "device",
            ShareRole::Server => "server",
        }
    }
}

impl fmt::Display for ShareRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One half of a split signing key
///
/// Not `Clone`: each share has exactly one owner and is zeroized on drop.
pub struct KeyShare {
    role: ShareRole,
    material: Zeroizing<[u8; SHARE_SIZE]>,
}

impl KeyShare {
    /// Generate a fresh share from the OS RNG
    fn generate(role: ShareRole) -> Result<Self> {
        let mut bytes = Zeroizing::new([0u8; SHARE_SIZE]);
        // Rejection sampling: the chance of needing a second draw is ~2^-128
        loop {
            OsRng
                .try_fill_bytes(bytes.as_mut())
                .map_err(|e| CryptoError::RandomGenerationFailed(e.to_string()))?;
            if parse_scalar(&bytes).is_ok() {
                return Ok(Self {
                    role,
                    material: bytes,
                });
            }
        }
    }

    /// Rebuild a share from raw bytes (e.g. after decryption)
    ///
    /// The input array is zeroized after copying.
    pub fn from_bytes(role: ShareRole, mut bytes: [u8; SHARE_SIZE]) -> Result<Self> {
        let material = Zeroizing::new(bytes);
        bytes.zeroize();
        parse_scalar(&material)?;
        Ok(Self { role, material })
    }

    /// Rebuild a share from a byte slice
    pub fn from_slice(role: ShareRole, bytes: &[u8]) -> Result<Self> {
        let array: [u8; SHARE_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeySize {
                    expected: SHARE_SIZE,
                    actual: bytes.len(),
                })?;
        Self::from_bytes(role, array)
    }

    /// The share's role
    pub fn role(&self) -> ShareRole {
        self.role
    }

    /// Raw share bytes
    ///
    /// # Security
    ///
    /// Never log or persist these bytes unencrypted.
    pub fn as_bytes(&self) -> &[u8; SHARE_SIZE] {
        &self.material
    }

    /// Public half of this share (`share * G`)
    pub fn public_key(&self) -> Result<PublicKey> {
        let scalar = parse_scalar(&self.material)?;
        Ok(PublicKey::from_secret_scalar(&scalar))
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("role", &self.role)
            .field("material", &"<redacted>")
            .finish()
    }
}

/// Generate the device share
///
/// The caller binds it to a biometric-protected credential in the device's
/// secure storage; this crate never persists it.
pub fn generate_device_share() -> Result<KeyShare> {
    KeyShare::generate(ShareRole::Device)
}

/// Generate the server share
pub fn generate_server_share() -> Result<KeyShare> {
    KeyShare::generate(ShareRole::Server)
}

/// Transient signing key produced by combining both shares
///
/// Not `Clone`, not serializable. The inner key zeroizes itself on drop, so
/// the combined key lives exactly as long as this value.
pub struct CombinedKey {
    signing_key: SigningKey,
}

impl CombinedKey {
    /// Public key of the combined signing key
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.signing_key.verifying_key())
    }

    /// Sign a 32-byte prehash, returning `r || s || v` with `v` in {27, 28}
    pub fn sign_prehash(&self, prehash: &[u8; 32]) -> Result<[u8; RECOVERABLE_SIGNATURE_SIZE]> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(prehash)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut out = [0u8; RECOVERABLE_SIGNATURE_SIZE];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + u8::from(recovery_id.is_y_odd());
        Ok(out)
    }
}

impl fmt::Debug for CombinedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CombinedKey(<redacted>)")
    }
}

/// Combine a device share and a server share into a signing key
///
/// Order-independent: `combine(a, b)` and `combine(b, a)` yield the same key.
/// The shares must carry different roles.
pub fn combine(a: &KeyShare, b: &KeyShare) -> Result<CombinedKey> {
    if a.role == b.role {
        return Err(CryptoError::RoleMismatch(a.role.as_str()));
    }

    let x = parse_scalar(&a.material)?;
    let y = parse_scalar(&b.material)?;
    let sum = Option::<NonZeroScalar>::from(NonZeroScalar::new(*x + *y))
        .ok_or(CryptoError::DegenerateCombination)?;

    Ok(CombinedKey {
        signing_key: SigningKey::from(sum),
    })
}

/// Combine two share public keys into the combined public key
///
/// `combine_public_keys(d.public_key(), s.public_key())` equals
/// `combine(d, s).public_key()`.
pub fn combine_public_keys(a: &PublicKey, b: &PublicKey) -> Result<PublicKey> {
    let sum = (a.to_projective() + b.to_projective()).to_affine();
    PublicKey::from_affine(sum).map_err(|_| CryptoError::DegenerateCombination)
}

/// Parse a SEC1-encoded (compressed or uncompressed) secp256k1 public key
pub fn parse_public_key(sec1: &[u8]) -> Result<PublicKey> {
    PublicKey::from_sec1_bytes(sec1).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
}

/// Compressed SEC1 encoding of a public key
pub fn compress_public_key(public_key: &PublicKey) -> [u8; COMPRESSED_PUBLIC_KEY_SIZE] {
    let mut out = [0u8; COMPRESSED_PUBLIC_KEY_SIZE];
    out.copy_from_slice(public_key.to_encoded_point(true).as_bytes());
    out
}

fn parse_scalar(bytes: &[u8; SHARE_SIZE]) -> Result<NonZeroScalar> {
    Option::from(NonZeroScalar::from_repr((*bytes).into())).ok_or(CryptoError::InvalidShare)
}
