//! Share wrapping-key derivation.

use crate::{constants::*, errors::*};
use hkdf::Hkdf;
use sha2::Sha256;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Derive the key that wraps one owner's server share
///
/// `kek = HKDF-SHA256(ikm = master_key, info = "dualkey:share-kek:v1" || owner_id)`
///
/// A ciphertext moved to another owner's record is therefore opened under a
/// different key and fails authentication.
pub fn derive_share_kek(
    master_key: &[u8; MASTER_KEY_SIZE],
    owner_id: &Uuid,
) -> Result<Zeroizing<[u8; 32]>> {
    let mut kek = Zeroizing::new([0u8; 32]);
    Hkdf::<Sha256>::new(None, master_key)
        .expand_multi_info(
            &[DOMAIN_SHARE_KEK.as_bytes(), owner_id.as_bytes().as_slice()],
            &mut kek[..],
        )
        .map_err(|_| CryptoError::HkdfError)?;
    Ok(kek)
}
