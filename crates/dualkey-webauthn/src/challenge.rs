//! Challenge generation and canonical encoding.

use crate::{errors::*, types::*};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dualkey_crypto::current_timestamp;
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

/// Generate a new challenge
///
/// `binding` must be present exactly for [`ChallengePurpose::Transaction`].
pub fn generate_challenge(
    purpose: ChallengePurpose,
    user_id: Option<Uuid>,
    binding: Option<[u8; BINDING_HASH_SIZE]>,
    ttl_seconds: u64,
) -> Result<Challenge> {
    if (purpose == ChallengePurpose::Transaction) != binding.is_some() {
        return Err(WebAuthnError::ChallengeMismatch(
            "transaction challenges, and only those, carry a binding".to_string(),
        ));
    }

    let mut nonce = [0u8; CHALLENGE_NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| WebAuthnError::RandomGenerationFailed(e.to_string()))?;

    let now = current_timestamp();
    Ok(Challenge {
        challenge_id: Uuid::new_v4(),
        purpose,
        user_id,
        nonce,
        binding,
        issued_at: now,
        expires_at: now + ttl_seconds,
    })
}

/// Challenge bytes: nonce, then binding hash when bound
pub fn challenge_bytes(challenge: &Challenge) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(CHALLENGE_NONCE_SIZE + BINDING_HASH_SIZE);
    bytes.extend_from_slice(&challenge.nonce);
    if let Some(binding) = &challenge.binding {
        bytes.extend_from_slice(binding);
    }
    bytes
}

/// Canonical encoding used in client data: base64url without padding
pub fn encode_challenge(challenge: &Challenge) -> String {
    URL_SAFE_NO_PAD.encode(challenge_bytes(challenge))
}

/// Check if challenge is expired
pub fn is_challenge_expired(challenge: &Challenge) -> bool {
    current_timestamp() >= challenge.expires_at
}
