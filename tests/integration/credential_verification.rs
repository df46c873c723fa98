//! Challenge lifecycle and assertion checks as seen through the wallet
//! service.

use dualkey_wallet::{Disposition, WalletError};
use dualkey_webauthn::{encode_challenge, testing::SoftAuthenticator, WebAuthnError};

#[path = "../common/mod.rs"]
mod common;
use common::harness::{test_config, TestUser, ORIGIN, RP_ID};

#[tokio::test]
async fn test_challenge_is_single_use() {
    let mut user = TestUser::enroll(test_config()).await;
    let (challenge_id, assertion) = user.login().await;

    user.service
        .authenticate(challenge_id, &assertion)
        .await
        .unwrap();

    let replay = user
        .service
        .authenticate(challenge_id, &assertion)
        .await
        .unwrap_err();
    assert!(matches!(
        replay,
        WalletError::Challenge {
            source: WebAuthnError::ChallengeExpired,
            ..
        }
    ));
    assert_eq!(replay.disposition(), Disposition::RestartCeremony);
}

#[tokio::test]
async fn test_counter_must_advance() {
    let mut user = TestUser::enroll(test_config()).await;

    // First use establishes the counter
    let (challenge_id, assertion) = user.login().await;
    let authenticated = user
        .service
        .authenticate(challenge_id, &assertion)
        .await
        .unwrap();
    let stored = authenticated.sign_count;

    for presented in [stored, stored.saturating_sub(1)] {
        let challenge = user
            .service
            .issue_authentication_challenge(Some(user.user_id))
            .await
            .unwrap();
        let cloned = user
            .authenticator
            .assert_with_counter(&encode_challenge(&challenge), presented);

        let err = user
            .service
            .authenticate(challenge.challenge_id, &cloned)
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                WalletError::CredentialVerification {
                    source: WebAuthnError::PossibleCloneDetected { .. },
                    ..
                }
            ),
            "counter {} accepted",
            presented
        );
        assert_eq!(err.disposition(), Disposition::Rejected);
    }

    // A higher counter still works
    let (challenge_id, assertion) = user.login().await;
    user.service
        .authenticate(challenge_id, &assertion)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_foreign_origin_rejected() {
    let mut user = TestUser::enroll(test_config()).await;
    user.authenticator.origin = "https://phish.example".to_string();

    let (challenge_id, assertion) = user.login().await;
    let err = user
        .service
        .authenticate(challenge_id, &assertion)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::CredentialVerification {
            source: WebAuthnError::OriginMismatch(_),
            ..
        }
    ));
}

#[tokio::test]
async fn test_unregistered_authenticator_rejected() {
    let mut user = TestUser::enroll(test_config()).await;
    user.authenticator = SoftAuthenticator::new(RP_ID, ORIGIN);

    let (challenge_id, assertion) = user.login().await;
    let err = user
        .service
        .authenticate(challenge_id, &assertion)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::CredentialVerification {
            source: WebAuthnError::UnknownCredential,
            ..
        }
    ));
}

#[tokio::test]
async fn test_revoked_authenticator_rejected() {
    let mut user = TestUser::enroll(test_config()).await;
    let credential_id = user.authenticator.credential_id().to_vec();

    user.service
        .revoke_authenticator(user.user_id, &credential_id)
        .await
        .unwrap();
    let listed = user.service.list_authenticators(user.user_id).await.unwrap();
    assert!(listed.iter().all(|a| !a.active));

    let (challenge_id, assertion) = user.login().await;
    let err = user
        .service
        .authenticate(challenge_id, &assertion)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WalletError::CredentialVerification {
            source: WebAuthnError::AuthenticatorRevoked,
            ..
        }
    ));
}
