//! Core types for challenges, authenticators and ceremonies.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Nonce length of every challenge
pub const CHALLENGE_NONCE_SIZE: usize = 32;

/// Length of a transaction binding hash
pub const BINDING_HASH_SIZE: usize = 32;

/// Default challenge lifetime in seconds
pub const DEFAULT_CHALLENGE_TTL_SECONDS: u64 = 300;

/// What a challenge may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengePurpose {
    /// Creating a new authenticator (`webauthn.create`)
    Registration,
    /// Plain authentication, no payload binding
    Authentication,
    /// Authorizing one specific transaction; carries a binding hash
    Transaction,
}

impl ChallengePurpose {
    /// Client-data `type` expected for this purpose
    pub fn ceremony_type(&self) -> &'static str {
        match self {
            ChallengePurpose::Registration => "webauthn.create",
            ChallengePurpose::Authentication | ChallengePurpose::Transaction => "webauthn.get",
        }
    }
}

/// A single-use server challenge
///
/// Lifecycle: issued and stored, then consumed on the first verification
/// attempt whatever its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: Uuid,
    pub purpose: ChallengePurpose,
    /// User the challenge was issued to, if known at issue time
    pub user_id: Option<Uuid>,
    pub nonce: [u8; CHALLENGE_NONCE_SIZE],
    /// Hash of the payload this challenge commits to
    pub binding: Option<[u8; BINDING_HASH_SIZE]>,
    /// Issued at (Unix seconds)
    pub issued_at: u64,
    /// Expires at (Unix seconds)
    pub expires_at: u64,
}

/// Canonical, format-tagged credential public key
///
/// Produced once from the COSE key at registration; verification branches
/// on the variant and never re-sniffs the encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialPublicKey {
    /// ECDSA P-256 with SHA-256 (COSE alg -7)
    Es256 {
        /// Uncompressed SEC1 point (65 bytes)
        sec1: Vec<u8>,
    },
    /// Ed25519 (COSE alg -8)
    EdDsa {
        /// Raw 32-byte public key
        public_key: [u8; 32],
    },
}

impl CredentialPublicKey {
    /// COSE algorithm identifier
    pub fn cose_algorithm(&self) -> i64 {
        match self {
            CredentialPublicKey::Es256 { .. } => crate::cose::COSE_ALG_ES256,
            CredentialPublicKey::EdDsa { .. } => crate::cose::COSE_ALG_EDDSA,
        }
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self {
            CredentialPublicKey::Es256 { .. } => "ES256",
            CredentialPublicKey::EdDsa { .. } => "EdDSA",
        }
    }
}

/// A registered platform authenticator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticator {
    pub credential_id: Vec<u8>,
    pub user_id: Uuid,
    pub public_key: CredentialPublicKey,
    /// Last accepted signature counter
    pub sign_count: u32,
    /// False once revoked
    pub active: bool,
    pub created_at: u64,
    /// None until the first successful assertion
    pub last_used_at: Option<u64>,
}

/// Result of a conditional signature counter update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAdvance {
    /// Counter and last use recorded
    Advanced,
    /// Rejected against the counter stored at the time of the write
    Stale { stored: u32 },
    /// No such credential
    Missing,
}

/// Assertion returned by `navigator.credentials.get()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertionResponse {
    pub credential_id: Vec<u8>,
    /// Raw clientDataJSON bytes, exactly as signed
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    /// DER for ES256, raw 64 bytes for EdDSA
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

/// Attestation returned by `navigator.credentials.create()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub credential_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    /// CBOR attestation object
    pub attestation_object: Vec<u8>,
}

/// Outcome of a successful assertion verification
#[derive(Debug, Clone)]
pub struct VerifiedAssertion {
    /// The consumed challenge (carries the binding, if any)
    pub challenge: Challenge,
    pub user_id: Uuid,
    pub credential_id: Vec<u8>,
    /// Counter now stored for the authenticator
    pub sign_count: u32,
    pub user_verified: bool,
}

/// Relying party settings for the verifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Relying party ID (a registrable domain)
    pub rp_id: String,
    /// Exact origins accepted in client data
    pub allowed_origins: Vec<String>,
    pub challenge_ttl_seconds: u64,
    /// Require the UV flag on every ceremony
    pub require_user_verification: bool,
}

impl VerifierConfig {
    pub fn new(rp_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            rp_id: rp_id.into(),
            allowed_origins: vec![origin.into()],
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            require_user_verification: true,
        }
    }
}
