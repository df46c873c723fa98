//! Counterfactual addresses and the wallet directory.

use alloy_primitives::{Address, U256};
use dualkey_account::{derive_address, AddressDerivationError};
use dualkey_wallet::{WalletError, WalletSelector};

#[path = "../common/mod.rs"]
mod common;
use common::harness::{test_config, test_deployment, TestUser};

#[test]
fn test_derivation_is_deterministic() {
    let deployment = test_deployment();
    let owners = [Address::repeat_byte(0x11)];

    let a = derive_address(&owners, 1, &deployment, U256::from(3u64)).unwrap();
    let b = derive_address(&owners, 1, &deployment, U256::from(3u64)).unwrap();
    let c = derive_address(&owners, 1, &deployment, U256::from(4u64)).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_owner_set_is_part_of_salt() {
    let deployment = test_deployment();
    let salt = U256::ZERO;

    let one = derive_address(&[Address::repeat_byte(0x11)], 1, &deployment, salt).unwrap();
    let other = derive_address(&[Address::repeat_byte(0x12)], 1, &deployment, salt).unwrap();
    let pair = derive_address(
        &[Address::repeat_byte(0x11), Address::repeat_byte(0x12)],
        1,
        &deployment,
        salt,
    )
    .unwrap();
    let pair_both = derive_address(
        &[Address::repeat_byte(0x11), Address::repeat_byte(0x12)],
        2,
        &deployment,
        salt,
    )
    .unwrap();

    assert_ne!(one, other);
    assert_ne!(one, pair);
    assert_ne!(pair, pair_both);
}

#[test]
fn test_malformed_owner_sets_rejected() {
    let deployment = test_deployment();
    let owner = Address::repeat_byte(0x11);

    assert_eq!(
        derive_address(&[], 1, &deployment, U256::ZERO),
        Err(AddressDerivationError::EmptyOwners)
    );
    assert_eq!(
        derive_address(&[owner, owner], 1, &deployment, U256::ZERO),
        Err(AddressDerivationError::DuplicateOwner(owner))
    );
    assert!(matches!(
        derive_address(&[owner], 2, &deployment, U256::ZERO),
        Err(AddressDerivationError::InvalidThreshold { .. })
    ));
}

#[tokio::test]
async fn test_second_wallet_gets_new_address() {
    println!("=== Wallet Slots ===\n");

    let mut user = TestUser::enroll(test_config()).await;
    let first = user.register_wallet().await.wallet;
    println!("✓ Slot 0: {}", first.address);

    let (challenge_id, assertion) = user.login().await;
    let second = user
        .service
        .create_wallet(challenge_id, &assertion, None, None)
        .await
        .unwrap();
    println!("✓ Slot 1: {}", second.address);

    assert_eq!(first.salt_nonce, 0);
    assert_eq!(second.salt_nonce, 1);
    assert_ne!(first.address, second.address);

    // Both addresses re-derive from owner and slot alone
    for wallet in [&first, &second] {
        let derived = user
            .service
            .derive_address(&[wallet.owner], U256::from(wallet.salt_nonce))
            .unwrap();
        assert_eq!(derived, wallet.address);
    }
}

#[tokio::test]
async fn test_default_selection() {
    let mut user = TestUser::enroll(test_config()).await;
    let first = user.register_wallet().await.wallet;

    let (challenge_id, assertion) = user.login().await;
    let second = user
        .service
        .create_wallet(challenge_id, &assertion, Some("Savings".into()), None)
        .await
        .unwrap();

    let selected = user
        .service
        .select_wallet(user.user_id, WalletSelector::Default)
        .await
        .unwrap();
    assert_eq!(selected.address, first.address);

    user.service
        .set_default_wallet(user.user_id, second.address)
        .await
        .unwrap();

    let wallets = user.service.list_wallets(user.user_id).await.unwrap();
    assert_eq!(wallets.iter().filter(|w| w.is_default).count(), 1);
    assert!(wallets[1].is_default);

    let selected = user
        .service
        .select_wallet(user.user_id, WalletSelector::Default)
        .await
        .unwrap();
    assert_eq!(selected.name, "Savings");

    let missing = user
        .service
        .set_default_wallet(user.user_id, Address::repeat_byte(0x99))
        .await;
    assert!(matches!(missing, Err(WalletError::WalletNotFound(_))));
}
