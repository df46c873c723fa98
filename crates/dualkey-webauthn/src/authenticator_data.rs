//! Authenticator data parsing.
//!
//! Layout:
//! - rpIdHash: 32 bytes
//! - flags: 1 byte
//! - signCount: u32 big-endian
//! - attestedCredentialData (when AT is set):
//!   aaguid (16) || credentialIdLength u16 BE || credentialId || COSE key
//! - extensions (when ED is set), ignored

use crate::errors::*;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// User present
pub const FLAG_UP: u8 = 0x01;
/// User verified
pub const FLAG_UV: u8 = 0x04;
/// Attested credential data included
pub const FLAG_AT: u8 = 0x40;
/// Extension data included
pub const FLAG_ED: u8 = 0x80;

const RP_ID_HASH_LEN: usize = 32;
const MIN_LEN: usize = RP_ID_HASH_LEN + 1 + 4;
const AAGUID_LEN: usize = 16;

/// Credential data attached during registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    /// Raw COSE_Key bytes
    pub credential_public_key: Vec<u8>,
}

/// Parsed authenticator data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; RP_ID_HASH_LEN],
    pub flags: u8,
    pub sign_count: u32,
    pub attested_credential: Option<AttestedCredentialData>,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_LEN {
            return Err(WebAuthnError::InvalidAuthenticatorData(format!(
                "expected at least {} bytes, got {}",
                MIN_LEN,
                bytes.len()
            )));
        }

        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(&bytes[..RP_ID_HASH_LEN]);
        let flags = bytes[RP_ID_HASH_LEN];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested_credential = if flags & FLAG_AT != 0 {
            Some(parse_attested_credential(&bytes[MIN_LEN..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_UP != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_UV != 0
    }

    /// RP ID hash must equal SHA-256 of the configured RP ID
    pub fn check_rp_id(&self, rp_id: &str) -> Result<()> {
        let expected: [u8; 32] = Sha256::digest(rp_id.as_bytes()).into();
        if !bool::from(self.rp_id_hash[..].ct_eq(&expected[..])) {
            return Err(WebAuthnError::OriginMismatch(
                "RP ID hash mismatch".to_string(),
            ));
        }
        Ok(())
    }

    /// UP always; UV when `require_user_verification`
    pub fn check_user_flags(&self, require_user_verification: bool) -> Result<()> {
        if !self.user_present() {
            return Err(WebAuthnError::UserPresenceRequired);
        }
        if require_user_verification && !self.user_verified() {
            return Err(WebAuthnError::UserVerificationRequired);
        }
        Ok(())
    }
}

fn parse_attested_credential(bytes: &[u8]) -> Result<AttestedCredentialData> {
    if bytes.len() < AAGUID_LEN + 2 {
        return Err(WebAuthnError::InvalidAuthenticatorData(
            "attested credential data truncated".to_string(),
        ));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&bytes[..AAGUID_LEN]);

    let id_len = u16::from_be_bytes([bytes[AAGUID_LEN], bytes[AAGUID_LEN + 1]]) as usize;
    let id_start = AAGUID_LEN + 2;
    let key_start = id_start + id_len;
    if bytes.len() <= key_start {
        return Err(WebAuthnError::InvalidAuthenticatorData(
            "credential id or public key truncated".to_string(),
        ));
    }

    // The COSE key is self-delimiting; extensions may follow it
    let mut reader = &bytes[key_start..];
    let before = reader.len();
    let _: ciborium::Value = ciborium::from_reader(&mut reader).map_err(|e| {
        WebAuthnError::InvalidAuthenticatorData(format!("credential public key: {}", e))
    })?;
    let key_len = before - reader.len();

    Ok(AttestedCredentialData {
        aaguid,
        credential_id: bytes[id_start..key_start].to_vec(),
        credential_public_key: bytes[key_start..key_start + key_len].to_vec(),
    })
}

/// Build authenticator data bytes
///
/// Used by the software authenticator and by tests.
pub fn encode_authenticator_data(
    rp_id: &str,
    flags: u8,
    sign_count: u32,
    attested_credential: Option<&AttestedCredentialData>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(MIN_LEN);
    out.extend_from_slice(&Sha256::digest(rp_id.as_bytes()));
    out.push(flags);
    out.extend_from_slice(&sign_count.to_be_bytes());
    if let Some(credential) = attested_credential {
        out.extend_from_slice(&credential.aaguid);
        out.extend_from_slice(&(credential.credential_id.len() as u16).to_be_bytes());
        out.extend_from_slice(&credential.credential_id);
        out.extend_from_slice(&credential.credential_public_key);
    }
    out
}
