//! Software authenticator producing real WebAuthn responses.

use crate::{
    attestation::encode_attestation_object,
    authenticator_data::*,
    client_data::CollectedClientData,
    cose::encode_cose_key,
    signature::signed_message,
    errors::Result,
    types::*,
};
use p256::{
    ecdsa::{signature::Signer, Signature, SigningKey},
    elliptic_curve::sec1::ToEncodedPoint,
};
use rand::{rngs::OsRng, RngCore};

/// An ES256 platform authenticator living in memory
pub struct SoftAuthenticator {
    pub rp_id: String,
    pub origin: String,
    /// Flags set in authenticator data (UP | UV by default)
    pub flags: u8,
    credential_id: Vec<u8>,
    signing_key: SigningKey,
    sign_count: u32,
}

impl SoftAuthenticator {
    pub fn new(rp_id: &str, origin: &str) -> Self {
        let mut credential_id = vec![0u8; 16];
        OsRng.fill_bytes(&mut credential_id);

        Self {
            rp_id: rp_id.to_string(),
            origin: origin.to_string(),
            flags: FLAG_UP | FLAG_UV,
            credential_id,
            signing_key: SigningKey::random(&mut OsRng),
            sign_count: 0,
        }
    }

    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    pub fn public_key(&self) -> CredentialPublicKey {
        CredentialPublicKey::Es256 {
            sec1: self
                .signing_key
                .verifying_key()
                .to_encoded_point(false)
                .as_bytes()
                .to_vec(),
        }
    }

    /// Respond to a registration challenge with a `none` attestation
    pub fn register(&self, encoded_challenge: &str) -> Result<RegistrationResponse> {
        let client_data_json = self.client_data("webauthn.create", encoded_challenge);
        let auth_data = encode_authenticator_data(
            &self.rp_id,
            self.flags | FLAG_AT,
            0,
            Some(&AttestedCredentialData {
                aaguid: [0u8; 16],
                credential_id: self.credential_id.clone(),
                credential_public_key: encode_cose_key(&self.public_key())?,
            }),
        );

        Ok(RegistrationResponse {
            credential_id: self.credential_id.clone(),
            client_data_json,
            attestation_object: encode_attestation_object("none", &auth_data, vec![])?,
        })
    }

    /// Sign an assertion, advancing the counter
    pub fn assert(&mut self, encoded_challenge: &str) -> AssertionResponse {
        self.sign_count += 1;
        self.assert_with_counter(encoded_challenge, self.sign_count)
    }

    /// Sign an assertion carrying an explicit counter value
    pub fn assert_with_counter(
        &self,
        encoded_challenge: &str,
        sign_count: u32,
    ) -> AssertionResponse {
        let client_data_json = self.client_data("webauthn.get", encoded_challenge);
        let authenticator_data =
            encode_authenticator_data(&self.rp_id, self.flags, sign_count, None);

        let signature: Signature = self
            .signing_key
            .sign(&signed_message(&authenticator_data, &client_data_json));

        AssertionResponse {
            credential_id: self.credential_id.clone(),
            client_data_json,
            authenticator_data,
            signature: signature.to_der().as_bytes().to_vec(),
            user_handle: None,
        }
    }

    fn client_data(&self, ceremony_type: &str, encoded_challenge: &str) -> Vec<u8> {
        let data = CollectedClientData {
            ceremony_type: ceremony_type.to_string(),
            challenge: encoded_challenge.to_string(),
            origin: self.origin.clone(),
            cross_origin: Some(false),
        };
        serde_json::to_vec(&data).unwrap_or_default()
    }
}
