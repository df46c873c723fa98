//! Attestation object parsing for the registration ceremony.
//!
//! Accepted statement formats:
//! - `none`: empty statement
//! - `packed` self attestation: no certificate chain, signature made with
//!   the credential key itself
//!
//! Certificate-chained attestation is not accepted; there is no trust store
//! to chain it to.

use crate::{
    authenticator_data::AuthenticatorData, cose::parse_cose_key, errors::*,
    signature::verify_signature, types::CredentialPublicKey,
};
use ciborium::Value;

/// Decoded attestation object
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub auth_data_bytes: Vec<u8>,
    pub auth_data: AuthenticatorData,
    att_stmt: Vec<(Value, Value)>,
}

/// A credential extracted from a verified attestation
#[derive(Debug, Clone)]
pub struct AttestedCredential {
    pub credential_id: Vec<u8>,
    pub public_key: CredentialPublicKey,
    pub auth_data: AuthenticatorData,
}

impl AttestationObject {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = ciborium::from_reader(bytes)
            .map_err(|e| WebAuthnError::InvalidAttestation(format!("invalid CBOR: {}", e)))?;
        let map = value.as_map().ok_or_else(|| {
            WebAuthnError::InvalidAttestation("attestation object is not a map".to_string())
        })?;

        let field = |name: &str| {
            map.iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v)
        };

        let fmt = field("fmt")
            .and_then(Value::as_text)
            .ok_or_else(|| WebAuthnError::InvalidAttestation("missing fmt".to_string()))?
            .to_string();
        let auth_data_bytes = field("authData")
            .and_then(Value::as_bytes)
            .ok_or_else(|| WebAuthnError::InvalidAttestation("missing authData".to_string()))?
            .clone();
        let att_stmt = field("attStmt")
            .and_then(Value::as_map)
            .ok_or_else(|| WebAuthnError::InvalidAttestation("missing attStmt".to_string()))?
            .clone();

        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;

        Ok(Self {
            fmt,
            auth_data_bytes,
            auth_data,
            att_stmt,
        })
    }

    /// Verify the statement and extract the new credential
    pub fn verify(self, client_data_json: &[u8]) -> Result<AttestedCredential> {
        let attested = self.auth_data.attested_credential.as_ref().ok_or_else(|| {
            WebAuthnError::InvalidAttestation("no attested credential data".to_string())
        })?;
        let public_key = parse_cose_key(&attested.credential_public_key)?;
        let credential_id = attested.credential_id.clone();

        match self.fmt.as_str() {
            "none" => {
                if !self.att_stmt.is_empty() {
                    return Err(WebAuthnError::InvalidAttestation(
                        "fmt none with non-empty attStmt".to_string(),
                    ));
                }
            }
            "packed" => self.verify_packed_self(&public_key, client_data_json)?,
            other => return Err(WebAuthnError::UnsupportedAttestation(other.to_string())),
        }

        Ok(AttestedCredential {
            credential_id,
            public_key,
            auth_data: self.auth_data,
        })
    }

    fn verify_packed_self(
        &self,
        public_key: &CredentialPublicKey,
        client_data_json: &[u8],
    ) -> Result<()> {
        let stmt = |name: &str| {
            self.att_stmt
                .iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v)
        };

        if stmt("x5c").is_some() {
            return Err(WebAuthnError::UnsupportedAttestation(
                "packed with certificate chain".to_string(),
            ));
        }

        let alg = stmt("alg")
            .and_then(Value::as_integer)
            .and_then(|i| i64::try_from(i).ok())
            .ok_or_else(|| WebAuthnError::InvalidAttestation("packed: missing alg".to_string()))?;
        if alg != public_key.cose_algorithm() {
            return Err(WebAuthnError::InvalidAttestation(
                "packed: alg differs from credential key".to_string(),
            ));
        }

        let sig = stmt("sig")
            .and_then(Value::as_bytes)
            .ok_or_else(|| WebAuthnError::InvalidAttestation("packed: missing sig".to_string()))?;

        verify_signature(public_key, &self.auth_data_bytes, client_data_json, sig)
    }
}

/// Encode an attestation object
///
/// Used by the software authenticator and by tests.
pub fn encode_attestation_object(
    fmt: &str,
    auth_data: &[u8],
    att_stmt: Vec<(Value, Value)>,
) -> Result<Vec<u8>> {
    let object = Value::Map(vec![
        (Value::Text("fmt".to_string()), Value::Text(fmt.to_string())),
        (Value::Text("attStmt".to_string()), Value::Map(att_stmt)),
        (Value::Text("authData".to_string()), Value::Bytes(auth_data.to_vec())),
    ]);

    let mut out = Vec::new();
    ciborium::into_writer(&object, &mut out).map_err(|e| {
        WebAuthnError::InvalidAttestation(format!("attestation encoding failed: {}", e))
    })?;
    Ok(out)
}
