//! Credential verifier service.
//!
//! Per attempt: `NO_CHALLENGE -> CHALLENGE_ISSUED -> {VERIFIED | REJECTED}`.
//! The challenge is consumed before any check runs, so a rejected attempt
//! can never be retried with the same challenge.

use crate::{
    attestation::AttestationObject,
    authenticator_data::AuthenticatorData,
    challenge::{encode_challenge, generate_challenge, is_challenge_expired},
    client_data::CollectedClientData,
    errors::*,
    signature::verify_signature,
    traits::{ChallengeStore, CredentialStore},
    types::*,
};
use dualkey_crypto::current_timestamp;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use uuid::Uuid;

/// WebAuthn verifier over a challenge store and a credential store
pub struct CredentialVerifier<S> {
    store: Arc<S>,
    config: VerifierConfig,
}

impl<S> CredentialVerifier<S>
where
    S: ChallengeStore + CredentialStore,
{
    pub fn new(store: Arc<S>, config: VerifierConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Issue and durably store a challenge
    ///
    /// Returns only after the store write completes, so the client may
    /// start the ceremony as soon as it receives the challenge.
    pub async fn issue_challenge(
        &self,
        purpose: ChallengePurpose,
        user_id: Option<Uuid>,
        binding: Option<[u8; BINDING_HASH_SIZE]>,
    ) -> Result<Challenge> {
        let ttl = self.config.challenge_ttl_seconds;
        let challenge = generate_challenge(purpose, user_id, binding, ttl)?;

        self.store
            .put_challenge(&challenge, Duration::from_secs(ttl))
            .await?;

        info!(
            challenge_id = %challenge.challenge_id,
            purpose = ?purpose,
            "Issued challenge"
        );
        Ok(challenge)
    }

    pub async fn issue_authentication_challenge(&self, user_id: Option<Uuid>) -> Result<Challenge> {
        self.issue_challenge(ChallengePurpose::Authentication, user_id, None)
            .await
    }

    pub async fn issue_registration_challenge(&self, user_id: Uuid) -> Result<Challenge> {
        self.issue_challenge(ChallengePurpose::Registration, Some(user_id), None)
            .await
    }

    pub async fn issue_transaction_challenge(
        &self,
        user_id: Uuid,
        binding: [u8; BINDING_HASH_SIZE],
    ) -> Result<Challenge> {
        self.issue_challenge(ChallengePurpose::Transaction, Some(user_id), Some(binding))
            .await
    }

    /// Verify an assertion against a previously issued challenge
    ///
    /// On success the authenticator's counter is advanced and the consumed
    /// challenge is returned so callers can check its binding.
    pub async fn verify_assertion(
        &self,
        challenge_id: Uuid,
        assertion: &AssertionResponse,
    ) -> Result<VerifiedAssertion> {
        info!(challenge_id = %challenge_id, "Verifying assertion");

        let challenge = self.consume_challenge(challenge_id).await?;

        match self.verify_assertion_inner(challenge, assertion).await {
            Ok(verified) => {
                info!(
                    challenge_id = %challenge_id,
                    user_id = %verified.user_id,
                    sign_count = verified.sign_count,
                    "Assertion verified"
                );
                Ok(verified)
            }
            Err(e) => {
                warn!(challenge_id = %challenge_id, error = %e, "Assertion rejected");
                Err(e)
            }
        }
    }

    async fn verify_assertion_inner(
        &self,
        challenge: Challenge,
        assertion: &AssertionResponse,
    ) -> Result<VerifiedAssertion> {
        if challenge.purpose == ChallengePurpose::Registration {
            return Err(WebAuthnError::ChallengeMismatch(
                "registration challenge presented for an assertion".to_string(),
            ));
        }

        // Step 1: Client data matches the issued challenge and origin
        let client_data = CollectedClientData::parse(&assertion.client_data_json)?;
        client_data.check_type(challenge.purpose.ceremony_type())?;
        client_data.check_challenge(&encode_challenge(&challenge))?;
        client_data.check_origin(&self.config.allowed_origins)?;

        // Step 2: Authenticator data is scoped to our RP ID with the right flags
        let auth_data = AuthenticatorData::parse(&assertion.authenticator_data)?;
        auth_data.check_rp_id(&self.config.rp_id)?;
        auth_data.check_user_flags(self.config.require_user_verification)?;

        // Step 3: Authenticator exists, is active and belongs to the user
        let authenticator = self
            .store
            .find_authenticator(&assertion.credential_id)
            .await?
            .ok_or(WebAuthnError::UnknownCredential)?;
        check_ownership(&authenticator, &challenge, assertion.user_handle.as_deref())?;

        // Step 4: Signature over authenticatorData || SHA-256(clientDataJSON)
        verify_signature(
            &authenticator.public_key,
            &assertion.authenticator_data,
            &assertion.client_data_json,
            &assertion.signature,
        )?;

        // Step 5: Counter advanced; persisted only after everything passed.
        // The snapshot check fails fast, the store re-checks on write.
        let presented = auth_data.sign_count;
        let advance = match check_sign_count(&authenticator, presented) {
            Ok(()) => {
                self.store
                    .advance_authenticator_counter(
                        &authenticator.credential_id,
                        presented,
                        current_timestamp(),
                    )
                    .await?
            }
            Err(_) => CounterAdvance::Stale {
                stored: authenticator.sign_count,
            },
        };
        match advance {
            CounterAdvance::Advanced => {}
            CounterAdvance::Missing => return Err(WebAuthnError::UnknownCredential),
            CounterAdvance::Stale { stored } => {
                warn!(
                    target: "security",
                    user_id = %authenticator.user_id,
                    credential_id = %hex::encode(&authenticator.credential_id),
                    stored,
                    presented,
                    "Signature counter did not advance: possible cloned authenticator"
                );
                return Err(WebAuthnError::PossibleCloneDetected { stored, presented });
            }
        }

        Ok(VerifiedAssertion {
            user_id: authenticator.user_id,
            credential_id: authenticator.credential_id,
            sign_count: auth_data.sign_count,
            user_verified: auth_data.user_verified(),
            challenge,
        })
    }

    /// Complete the registration ceremony and store the new authenticator
    pub async fn register_authenticator(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
        response: &RegistrationResponse,
    ) -> Result<Authenticator> {
        info!(challenge_id = %challenge_id, user_id = %user_id, "Registering authenticator");

        let challenge = self.consume_challenge(challenge_id).await?;

        match self.register_inner(challenge, user_id, response).await {
            Ok(authenticator) => {
                info!(
                    user_id = %user_id,
                    credential_id = %hex::encode(&authenticator.credential_id),
                    algorithm = authenticator.public_key.algorithm_name(),
                    "Authenticator registered"
                );
                Ok(authenticator)
            }
            Err(e) => {
                warn!(challenge_id = %challenge_id, error = %e, "Registration rejected");
                Err(e)
            }
        }
    }

    async fn register_inner(
        &self,
        challenge: Challenge,
        user_id: Uuid,
        response: &RegistrationResponse,
    ) -> Result<Authenticator> {
        if challenge.purpose != ChallengePurpose::Registration
            || challenge.user_id != Some(user_id)
        {
            return Err(WebAuthnError::ChallengeMismatch(
                "challenge was not issued for this registration".to_string(),
            ));
        }

        let client_data = CollectedClientData::parse(&response.client_data_json)?;
        client_data.check_type(challenge.purpose.ceremony_type())?;
        client_data.check_challenge(&encode_challenge(&challenge))?;
        client_data.check_origin(&self.config.allowed_origins)?;

        let attestation = AttestationObject::parse(&response.attestation_object)?;
        attestation.auth_data.check_rp_id(&self.config.rp_id)?;
        attestation
            .auth_data
            .check_user_flags(self.config.require_user_verification)?;

        let attested = attestation.verify(&response.client_data_json)?;
        if attested.credential_id != response.credential_id {
            return Err(WebAuthnError::InvalidAttestation(
                "credential id differs from attested credential data".to_string(),
            ));
        }

        if self
            .store
            .find_authenticator(&attested.credential_id)
            .await?
            .is_some()
        {
            return Err(WebAuthnError::CredentialAlreadyRegistered);
        }

        // Counter bootstrap: start at 0, first assertion may carry any value
        let authenticator = Authenticator {
            credential_id: attested.credential_id,
            user_id,
            public_key: attested.public_key,
            sign_count: 0,
            active: true,
            created_at: current_timestamp(),
            last_used_at: None,
        };
        self.store.save_authenticator(&authenticator).await?;

        Ok(authenticator)
    }

    /// Revoke an authenticator owned by `user_id`
    pub async fn revoke_authenticator(&self, user_id: Uuid, credential_id: &[u8]) -> Result<()> {
        let mut authenticator = self
            .store
            .find_authenticator(credential_id)
            .await?
            .ok_or(WebAuthnError::UnknownCredential)?;

        if authenticator.user_id != user_id {
            return Err(WebAuthnError::AuthenticatorNotOwned);
        }

        authenticator.active = false;
        self.store.save_authenticator(&authenticator).await?;

        info!(
            user_id = %user_id,
            credential_id = %hex::encode(credential_id),
            "Authenticator revoked"
        );
        Ok(())
    }

    pub async fn list_authenticators(&self, user_id: Uuid) -> Result<Vec<Authenticator>> {
        self.store.list_authenticators(&user_id).await
    }

    /// Take the challenge out of the store; missing and expired look the same
    async fn consume_challenge(&self, challenge_id: Uuid) -> Result<Challenge> {
        let challenge = self
            .store
            .get_and_delete(&challenge_id)
            .await?
            .ok_or(WebAuthnError::ChallengeExpired)?;

        if is_challenge_expired(&challenge) {
            return Err(WebAuthnError::ChallengeExpired);
        }
        Ok(challenge)
    }
}

/// Active, owned by the challenge's user, and matching the user handle
fn check_ownership(
    authenticator: &Authenticator,
    challenge: &Challenge,
    user_handle: Option<&[u8]>,
) -> Result<()> {
    if !authenticator.active {
        return Err(WebAuthnError::AuthenticatorRevoked);
    }
    if let Some(expected) = challenge.user_id {
        if authenticator.user_id != expected {
            return Err(WebAuthnError::AuthenticatorNotOwned);
        }
    }
    if let Some(handle) = user_handle {
        if handle != authenticator.user_id.as_bytes() {
            return Err(WebAuthnError::AuthenticatorNotOwned);
        }
    }
    Ok(())
}

/// Counter rule
///
/// Before first use (`last_used_at == None`) any counter `>= stored` is
/// accepted; afterwards it must be strictly greater.
pub fn check_sign_count(authenticator: &Authenticator, presented: u32) -> Result<()> {
    let stored = authenticator.sign_count;
    let accepted = match authenticator.last_used_at {
        None => presented >= stored,
        Some(_) => presented > stored,
    };

    if accepted {
        Ok(())
    } else {
        Err(WebAuthnError::PossibleCloneDetected { stored, presented })
    }
}
