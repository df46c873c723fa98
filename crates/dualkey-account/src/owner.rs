//! EOA owner addresses.

use alloy_primitives::{keccak256, Address};
use k256::{elliptic_curve::sec1::ToEncodedPoint, PublicKey};

/// Ethereum address of a secp256k1 public key
///
/// Address = last 20 bytes of keccak256(uncompressed_point[1..])
pub fn owner_address(public_key: &PublicKey) -> Address {
    let point = public_key.to_encoded_point(false);
    // Skip the 0x04 prefix of the uncompressed encoding
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}
