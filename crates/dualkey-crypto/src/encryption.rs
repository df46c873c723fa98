//! Share encryption using XChaCha20-Poly1305.

use crate::{constants::*, derivation::derive_share_kek, errors::*, keyshare::*};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

/// AEAD algorithm recorded alongside every stored ciphertext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionAlgorithm {
    /// XChaCha20-Poly1305 with a 24-byte nonce and 16-byte tag
    XChaCha20Poly1305,
}

/// A key share encrypted at rest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedShare {
    /// Role of the wrapped share (also bound into the AAD)
    pub role: ShareRole,
    /// AEAD algorithm
    pub algorithm: EncryptionAlgorithm,
    /// Random nonce, unique per encryption
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext without the tag
    pub ciphertext: Vec<u8>,
    /// Poly1305 authentication tag
    pub auth_tag: [u8; TAG_SIZE],
}

/// Encrypt data using XChaCha20-Poly1305 AEAD
///
/// # Arguments
///
/// * `key` - 32-byte encryption key
/// * `plaintext` - Data to encrypt
/// * `nonce` - 24-byte nonce (MUST be unique per key)
/// * `aad` - Associated authenticated data (not encrypted, but authenticated)
///
/// # Returns
///
/// Ciphertext with 16-byte authentication tag appended
pub fn encrypt(
    key: &[u8; 32],
    plaintext: &[u8],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let xnonce = XNonce::from_slice(nonce);

    cipher
        .encrypt(xnonce, Payload { msg: plaintext, aad })
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Decrypt data using XChaCha20-Poly1305 AEAD
///
/// `ciphertext` includes the 16-byte tag at the end. Any tag mismatch is an error.
pub fn decrypt(
    key: &[u8; 32],
    ciphertext: &[u8],
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let xnonce = XNonce::from_slice(nonce);

    cipher
        .decrypt(xnonce, Payload { msg: ciphertext, aad })
        .map(Zeroizing::new)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// Generate a random nonce for encryption
pub fn generate_nonce() -> Result<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::RandomGenerationFailed(e.to_string()))?;
    Ok(nonce)
}

/// Encrypt a key share for storage
///
/// Key: HKDF(master_key, "dualkey:share-kek:v1" || owner_id)
/// AAD: "dualkey:share:v1" || role || owner_id
pub fn encrypt_share(
    share: &KeyShare,
    master_key: &[u8; MASTER_KEY_SIZE],
    owner_id: &Uuid,
) -> Result<EncryptedShare> {
    let kek = derive_share_kek(master_key, owner_id)?;
    let nonce = generate_nonce()?;
    let aad = share_aad(share.role(), owner_id);

    let mut sealed = encrypt(&kek, share.as_bytes(), &nonce, &aad)?;
    let tag_start = sealed.len() - TAG_SIZE;
    let mut auth_tag = [0u8; TAG_SIZE];
    auth_tag.copy_from_slice(&sealed[tag_start..]);
    sealed.truncate(tag_start);

    Ok(EncryptedShare {
        role: share.role(),
        algorithm: EncryptionAlgorithm::XChaCha20Poly1305,
        nonce,
        ciphertext: sealed,
        auth_tag,
    })
}

/// Decrypt a stored key share
///
/// Fails closed: a wrong master key, wrong owner, swapped role or any
/// modified byte yields `DecryptionFailed`.
pub fn decrypt_share(
    blob: &EncryptedShare,
    master_key: &[u8; MASTER_KEY_SIZE],
    owner_id: &Uuid,
) -> Result<KeyShare> {
    match blob.algorithm {
        EncryptionAlgorithm::XChaCha20Poly1305 => {}
    }

    let kek = derive_share_kek(master_key, owner_id)?;
    let aad = share_aad(blob.role, owner_id);

    let mut sealed = Vec::with_capacity(blob.ciphertext.len() + TAG_SIZE);
    sealed.extend_from_slice(&blob.ciphertext);
    sealed.extend_from_slice(&blob.auth_tag);

    let plaintext = decrypt(&kek, &sealed, &blob.nonce, &aad)?;
    KeyShare::from_slice(blob.role, &plaintext)
}

fn share_aad(role: ShareRole, owner_id: &Uuid) -> Vec<u8> {
    let mut aad = Vec::with_capacity(DOMAIN_SHARE_AAD.len() + 1 + 16);
    aad.extend_from_slice(DOMAIN_SHARE_AAD.as_bytes());
    aad.push(role as u8);
    aad.extend_from_slice(owner_id.as_bytes());
    aad
}
