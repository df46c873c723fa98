//! # dualkey-webauthn
//!
//! Challenge/response verification for platform authenticators.
//!
//! Every authorization-sensitive operation in dualkey is gated by a WebAuthn
//! assertion over a single-use, server-issued challenge. This crate issues
//! those challenges, verifies assertions against registered authenticators
//! and runs the registration ceremony that creates them.
//!
//! # Challenge encoding
//!
//! The challenge a client signs is the base64url (no padding) encoding of
//! the challenge bytes: the 32-byte nonce, followed by a 32-byte binding
//! hash when the challenge is bound to a pending transaction. The same
//! encoding is used when issuing and when verifying.
//!
//! # Signature counters
//!
//! A new authenticator starts at counter 0 and its first assertion may carry
//! any counter. Every later assertion must carry a counter strictly greater
//! than the stored one.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod attestation;
pub mod authenticator_data;
pub mod challenge;
pub mod client_data;
pub mod cose;
pub mod errors;
pub mod signature;
pub mod traits;
pub mod types;
pub mod verifier;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use challenge::{encode_challenge, generate_challenge, is_challenge_expired};
pub use errors::{Result, WebAuthnError};
pub use traits::{ChallengeStore, CredentialStore};
pub use types::*;
pub use verifier::CredentialVerifier;
