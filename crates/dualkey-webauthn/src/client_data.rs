//! CollectedClientData parsing and checks.

use crate::errors::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The `clientDataJSON` dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    /// base64url challenge as the client received it
    pub challenge: String,
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_origin: Option<bool>,
}

impl CollectedClientData {
    /// Parse raw clientDataJSON bytes
    pub fn parse(client_data_json: &[u8]) -> Result<Self> {
        serde_json::from_slice(client_data_json)
            .map_err(|e| WebAuthnError::InvalidClientData(e.to_string()))
    }

    /// Check the ceremony type (`webauthn.get` / `webauthn.create`)
    pub fn check_type(&self, expected: &'static str) -> Result<()> {
        if self.ceremony_type != expected {
            return Err(WebAuthnError::UnexpectedCeremonyType {
                expected,
                actual: self.ceremony_type.clone(),
            });
        }
        Ok(())
    }

    /// Compare the embedded challenge with the issued one in constant time
    pub fn check_challenge(&self, expected_encoded: &str) -> Result<()> {
        let matches: bool = self
            .challenge
            .as_bytes()
            .ct_eq(expected_encoded.as_bytes())
            .into();
        if !matches {
            return Err(WebAuthnError::ChallengeMismatch(
                "signed challenge differs from issued challenge".to_string(),
            ));
        }
        Ok(())
    }

    /// Origin must be one of the configured origins, exactly
    pub fn check_origin(&self, allowed_origins: &[String]) -> Result<()> {
        if self.cross_origin == Some(true) {
            return Err(WebAuthnError::OriginMismatch(
                "cross-origin ceremonies are not accepted".to_string(),
            ));
        }
        if !allowed_origins.iter().any(|o| o == &self.origin) {
            return Err(WebAuthnError::OriginMismatch(format!(
                "origin {} not allowed",
                self.origin
            )));
        }
        Ok(())
    }
}

/// SHA-256 of the raw clientDataJSON bytes
pub fn client_data_hash(client_data_json: &[u8]) -> [u8; 32] {
    Sha256::digest(client_data_json).into()
}
