//! Share generation, encryption, combination and recovery keys.

use dualkey_account::owner_address;
use dualkey_crypto::{
    combine, combine_public_keys, decrypt_share, encrypt_share, generate_device_share,
    generate_recovery_key, generate_server_share, hash_recovery_key, verify_recovery_key,
    CryptoError, KeyShare, ShareRole,
};
use uuid::Uuid;

#[path = "../common/mod.rs"]
mod common;
use common::harness::TEST_MASTER_KEY;

#[test]
fn test_combination_avalanche() {
    println!("=== Share Combination Avalanche ===\n");

    for _ in 0..16 {
        let device = generate_device_share().unwrap();
        let server = generate_server_share().unwrap();
        let owner = owner_address(&combine(&device, &server).unwrap().public_key());

        for bit in [0usize, 7, 100, 255] {
            let mut flipped = *device.as_bytes();
            flipped[bit / 8] ^= 1 << (bit % 8);
            // A flip can leave the scalar range; such shares are unusable anyway
            let Ok(flipped) = KeyShare::from_bytes(ShareRole::Device, flipped) else {
                continue;
            };
            let other = owner_address(&combine(&flipped, &server).unwrap().public_key());
            assert_ne!(owner, other, "bit {} did not change the combined key", bit);
        }
    }
    println!("✓ Every single-bit flip changed the combined key");
}

#[test]
fn test_server_derives_owner_from_device_public_key() {
    let device = generate_device_share().unwrap();
    let server = generate_server_share().unwrap();

    let from_shares = owner_address(&combine(&server, &device).unwrap().public_key());
    let from_public = owner_address(
        &combine_public_keys(&device.public_key().unwrap(), &server.public_key().unwrap())
            .unwrap(),
    );
    assert_eq!(from_shares, from_public);
}

#[test]
fn test_encrypted_share_fails_closed() {
    let owner = Uuid::new_v4();
    let share = generate_server_share().unwrap();
    let blob = encrypt_share(&share, &TEST_MASTER_KEY, &owner).unwrap();

    let decrypted = decrypt_share(&blob, &TEST_MASTER_KEY, &owner).unwrap();
    assert_eq!(decrypted.as_bytes(), share.as_bytes());

    assert!(matches!(
        decrypt_share(&blob, &[0x43; 32], &owner),
        Err(CryptoError::DecryptionFailed(_))
    ));
    assert!(matches!(
        decrypt_share(&blob, &TEST_MASTER_KEY, &Uuid::new_v4()),
        Err(CryptoError::DecryptionFailed(_))
    ));

    let mut tampered = blob.clone();
    tampered.auth_tag[0] ^= 0x01;
    assert!(matches!(
        decrypt_share(&tampered, &TEST_MASTER_KEY, &owner),
        Err(CryptoError::DecryptionFailed(_))
    ));
}

#[test]
fn test_recovery_key_verification() {
    let key = generate_recovery_key().unwrap();
    let hash = hash_recovery_key(&key).unwrap();

    verify_recovery_key(key.expose(), &hash).unwrap();
    verify_recovery_key(&key.expose().to_uppercase(), &hash).unwrap();

    let other = generate_recovery_key().unwrap();
    assert!(matches!(
        verify_recovery_key(other.expose(), &hash),
        Err(CryptoError::RecoveryKeyMismatch)
    ));

    // Same key, fresh salt, different digest
    let again = hash_recovery_key(&key).unwrap();
    assert_ne!(hash.digest, again.digest);
}
