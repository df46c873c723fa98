//! Assertion signature verification.

use crate::{client_data::client_data_hash, errors::*, types::CredentialPublicKey};

/// Signed message: authenticatorData || SHA-256(clientDataJSON)
pub fn signed_message(authenticator_data: &[u8], client_data_json: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(authenticator_data.len() + 32);
    message.extend_from_slice(authenticator_data);
    message.extend_from_slice(&client_data_hash(client_data_json));
    message
}

/// Verify a WebAuthn signature with the stored credential key
///
/// ES256 signatures are ASN.1 DER; EdDSA signatures are raw 64 bytes.
pub fn verify_signature(
    key: &CredentialPublicKey,
    authenticator_data: &[u8],
    client_data_json: &[u8],
    signature: &[u8],
) -> Result<()> {
    let message = signed_message(authenticator_data, client_data_json);

    match key {
        CredentialPublicKey::Es256 { sec1 } => {
            use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};

            let verifying_key = VerifyingKey::from_sec1_bytes(sec1)
                .map_err(|_| WebAuthnError::KeyFormatError("stored ES256 key".to_string()))?;
            let signature =
                Signature::from_der(signature).map_err(|_| WebAuthnError::SignatureInvalid)?;
            // Platform authenticators do not all emit low-S signatures
            let signature = signature.normalize_s().unwrap_or(signature);

            verifying_key
                .verify(&message, &signature)
                .map_err(|_| WebAuthnError::SignatureInvalid)
        }
        CredentialPublicKey::EdDsa { public_key } => {
            use ed25519_dalek::{Signature, VerifyingKey};

            let verifying_key = VerifyingKey::from_bytes(public_key)
                .map_err(|_| WebAuthnError::KeyFormatError("stored EdDSA key".to_string()))?;
            let signature =
                Signature::from_slice(signature).map_err(|_| WebAuthnError::SignatureInvalid)?;

            verifying_key
                .verify_strict(&message, &signature)
                .map_err(|_| WebAuthnError::SignatureInvalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Signer as _;
    use p256::{ecdsa::signature::Signer, elliptic_curve::sec1::ToEncodedPoint};
    use rand::rngs::OsRng;

    const AUTH_DATA: &[u8] = &[0x11; 37];
    const CLIENT_DATA: &[u8] = br#"{"type":"webauthn.get"}"#;

    #[test]
    fn test_es256_valid_and_tampered() {
        let signing_key = p256::ecdsa::SigningKey::random(&mut OsRng);
        let key = CredentialPublicKey::Es256 {
            sec1: signing_key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        };

        let sig: p256::ecdsa::Signature = signing_key.sign(&signed_message(AUTH_DATA, CLIENT_DATA));
        let der = sig.to_der().as_bytes().to_vec();

        assert!(verify_signature(&key, AUTH_DATA, CLIENT_DATA, &der).is_ok());
        assert!(matches!(
            verify_signature(&key, AUTH_DATA, br#"{"type":"webauthn.create"}"#, &der),
            Err(WebAuthnError::SignatureInvalid)
        ));
        assert!(matches!(
            verify_signature(&key, AUTH_DATA, CLIENT_DATA, &[0x30, 0x00]),
            Err(WebAuthnError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_eddsa_valid_and_wrong_key() {
        let signing_key = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let other = ed25519_dalek::SigningKey::generate(&mut OsRng);
        let sig = signing_key
            .sign(&signed_message(AUTH_DATA, CLIENT_DATA))
            .to_bytes();

        let key = CredentialPublicKey::EdDsa {
            public_key: signing_key.verifying_key().to_bytes(),
        };
        let wrong = CredentialPublicKey::EdDsa {
            public_key: other.verifying_key().to_bytes(),
        };

        assert!(verify_signature(&key, AUTH_DATA, CLIENT_DATA, &sig).is_ok());
        assert!(matches!(
            verify_signature(&wrong, AUTH_DATA, CLIENT_DATA, &sig),
            Err(WebAuthnError::SignatureInvalid)
        ));
    }

    #[test]
    fn test_malformed_stored_key() {
        let key = CredentialPublicKey::Es256 { sec1: vec![0x04; 10] };
        assert!(matches!(
            verify_signature(&key, AUTH_DATA, CLIENT_DATA, &[]),
            Err(WebAuthnError::KeyFormatError(_))
        ));
    }
}
