//! # dualkey-crypto
//!
//! Key material for dualkey wallets.
//!
//! A wallet's signing key never exists at rest. It is split into a device
//! share (held in the device's secure storage) and a server share (held by
//! the service, encrypted under the service master key). The two are added
//! together only in memory, for the duration of one signing operation.
//!
//! ## Security Properties
//!
//! - All share and key material is zeroized after use
//! - Share decryption fails closed on any authentication-tag mismatch
//! - Recovery keys are stored only as salted hashes and compared in constant time
//! - No unsafe code

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod derivation;
pub mod encryption;
pub mod errors;
pub mod hashing;
pub mod keyshare;
pub mod recovery;
pub mod utils;

pub use constants::*;
pub use derivation::*;
pub use encryption::*;
pub use errors::{CryptoError, Result};
pub use hashing::*;
pub use keyshare::*;
pub use recovery::*;
pub use utils::current_timestamp;
