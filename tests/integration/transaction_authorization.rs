//! The authorization pipeline end to end.

use alloy_primitives::{Address, U256};
use dualkey_wallet::{DeploymentOutcome, Disposition, PipelineStage, SubmissionKind, WalletError};
use dualkey_webauthn::WebAuthnError;

#[path = "../common/mod.rs"]
mod common;
use common::harness::{test_config, transfer, TestUser};

fn beef() -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xbe;
    bytes[1] = 0xef;
    Address::from(bytes)
}

#[tokio::test]
async fn test_first_transaction_deploys_wallet() {
    println!("=== Deployment On First Transaction ===\n");

    let mut user = TestUser::enroll(test_config()).await;
    let wallet = user.register_wallet().await.wallet;

    // Freshly derived: no code yet
    assert!(!user.service.is_deployed(wallet.address).await.unwrap());
    println!("✓ {} has no code", wallet.address);

    let receipt = user
        .send(&transfer(wallet.address, beef(), 1000))
        .await
        .unwrap();
    assert_eq!(receipt.deployment, DeploymentOutcome::Atomic);
    assert!(receipt.stages.contains(&PipelineStage::DeploymentChecked));
    assert_eq!(receipt.stages.last(), Some(&PipelineStage::Submitted));
    println!("✓ Submitted {}", receipt.transaction_hash);

    assert!(user.service.is_deployed(wallet.address).await.unwrap());
    println!("✓ {} has code", wallet.address);

    let receipt = user
        .send(&transfer(wallet.address, beef(), 2000))
        .await
        .unwrap();
    assert_eq!(receipt.deployment, DeploymentOutcome::AlreadyDeployed);
    assert!(receipt.stages.contains(&PipelineStage::DeploymentChecked));

    let kinds: Vec<_> = user.chain.submissions().iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![SubmissionKind::Execution, SubmissionKind::Execution]);
}

#[tokio::test]
async fn test_already_deployed_wallet_skips_deployment() {
    let mut user = TestUser::enroll(test_config()).await;
    let wallet = user.register_wallet().await.wallet;
    user.chain.deploy(wallet.address);

    let receipt = user
        .send(&transfer(wallet.address, beef(), 1))
        .await
        .unwrap();
    assert_eq!(receipt.deployment, DeploymentOutcome::AlreadyDeployed);
    assert!(user.chain.submissions()[0].deployment.is_none());
}

#[tokio::test]
async fn test_submitting_different_recipient_rejected() {
    let mut user = TestUser::enroll(test_config()).await;
    let wallet = user.register_wallet().await.wallet;

    let challenged = transfer(wallet.address, beef(), 1000);
    let bound = user.request(&challenged).await;
    let assertion = user.authenticator.assert(&bound.encoded_challenge);

    let swapped = transfer(wallet.address, Address::repeat_byte(0x66), 1000);
    let err = user
        .service
        .authorize_transaction(
            bound.challenge.challenge_id,
            &swapped,
            &assertion,
            &user.device_share,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WalletError::TransactionDataMismatch { .. }));
    assert!(user.chain.submissions().is_empty());
}

#[tokio::test]
async fn test_assertion_over_other_transaction_rejected() {
    let mut user = TestUser::enroll(test_config()).await;
    let wallet = user.register_wallet().await.wallet;

    let bound = user.request(&transfer(wallet.address, beef(), 1000)).await;
    let other = user
        .request(&transfer(wallet.address, Address::repeat_byte(0x66), 1000))
        .await;

    // Signed over the other transaction's challenge
    let assertion = user.authenticator.assert(&other.encoded_challenge);
    let err = user
        .service
        .authorize_transaction(
            bound.challenge.challenge_id,
            &transfer(wallet.address, beef(), 1000),
            &assertion,
            &user.device_share,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WalletError::Challenge {
            source: WebAuthnError::ChallengeMismatch(_),
            ..
        }
    ));
    assert!(user.chain.submissions().is_empty());
}

#[tokio::test]
async fn test_needs_funds_then_sponsored() {
    let one_eth = U256::from(10u64).pow(U256::from(18u64));

    let mut config = test_config();
    config.min_deployment_balance = one_eth;
    let mut user = TestUser::enroll(config.clone()).await;
    let wallet = user.register_wallet().await.wallet;

    let err = user
        .send(&transfer(wallet.address, beef(), 1))
        .await
        .unwrap_err();
    match &err {
        WalletError::NeedsFunds {
            required,
            available,
            ..
        } => {
            assert_eq!(*required, one_eth);
            assert_eq!(*available, U256::ZERO);
        }
        other => panic!("expected NeedsFunds, got {:?}", other),
    }
    assert_eq!(err.disposition(), Disposition::FundAndRetry);
    assert!(!user.service.is_deployed(wallet.address).await.unwrap());

    config.sponsored_deployment = true;
    let mut sponsored = TestUser::enroll(config).await;
    let wallet = sponsored.register_wallet().await.wallet;
    let receipt = sponsored
        .send(&transfer(wallet.address, beef(), 1))
        .await
        .unwrap();
    assert_eq!(receipt.deployment, DeploymentOutcome::Atomic);
}
