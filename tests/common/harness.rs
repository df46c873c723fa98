//! A wallet service wired to RocksDB, an in-memory chain and a software
//! authenticator.

#![allow(dead_code)]

use alloy_primitives::{Address, Bytes, U256};
use dualkey_account::SafeDeployment;
use dualkey_crypto::{compress_public_key, generate_device_share, KeyShare};
use dualkey_storage::RocksDbStorage;
use dualkey_wallet::{
    testing::MockChain, AuthorizationReceipt, MasterKey, Result, TransactionChallenge, TransactionRequest,
    WalletConfig, WalletRegistration, WalletService,
};
use dualkey_webauthn::{encode_challenge, testing::SoftAuthenticator, AssertionResponse};
use std::sync::Arc;
use uuid::Uuid;

pub const RP_ID: &str = "wallet.example";
pub const ORIGIN: &str = "https://wallet.example";

/// Test master key used for integration tests
pub const TEST_MASTER_KEY: [u8; 32] = [0x42; 32];

/// Stand-in for the factory's `proxyCreationCode()`
pub const TEST_PROXY_CREATION_CODE: &[u8] = &[0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15];

pub fn test_deployment() -> SafeDeployment {
    SafeDeployment::from_creation_code(
        Address::repeat_byte(0xfa),
        Address::repeat_byte(0x5a),
        Address::ZERO,
        TEST_PROXY_CREATION_CODE,
    )
    .unwrap()
}

pub fn test_config() -> WalletConfig {
    WalletConfig::new(RP_ID, ORIGIN, test_deployment())
}

pub struct TestUser {
    pub service: WalletService<RocksDbStorage, MockChain>,
    pub chain: Arc<MockChain>,
    pub authenticator: SoftAuthenticator,
    pub device_share: KeyShare,
    pub user_id: Uuid,
}

impl TestUser {
    /// A user with a registered authenticator and no key record yet
    pub async fn enroll(config: WalletConfig) -> Self {
        let storage = Arc::new(RocksDbStorage::open_test().unwrap());
        let chain = Arc::new(MockChain::new());
        let service = WalletService::new(
            storage,
            chain.clone(),
            config,
            MasterKey::new(TEST_MASTER_KEY),
        );

        let user_id = Uuid::new_v4();
        let authenticator = SoftAuthenticator::new(RP_ID, ORIGIN);
        let challenge = service.issue_registration_challenge(user_id).await.unwrap();
        let response = authenticator.register(&encode_challenge(&challenge)).unwrap();
        service
            .register_authenticator(challenge.challenge_id, user_id, &response)
            .await
            .unwrap();

        Self {
            service,
            chain,
            authenticator,
            device_share: generate_device_share().unwrap(),
            user_id,
        }
    }

    /// Fresh authentication challenge and a valid assertion over it
    pub async fn login(&mut self) -> (Uuid, AssertionResponse) {
        let challenge = self
            .service
            .issue_authentication_challenge(Some(self.user_id))
            .await
            .unwrap();
        let assertion = self.authenticator.assert(&encode_challenge(&challenge));
        (challenge.challenge_id, assertion)
    }

    pub async fn register_wallet(&mut self) -> WalletRegistration {
        let (challenge_id, assertion) = self.login().await;
        let device_public_key = compress_public_key(&self.device_share.public_key().unwrap());
        self.service
            .register_wallet(challenge_id, &assertion, &device_public_key, None)
            .await
            .unwrap()
    }

    pub async fn request(&self, request: &TransactionRequest) -> TransactionChallenge {
        self.service
            .request_transaction(self.user_id, request.clone())
            .await
            .unwrap()
    }

    /// Request, sign and authorize in one go
    pub async fn send(&mut self, request: &TransactionRequest) -> Result<AuthorizationReceipt> {
        let bound = self.request(request).await;
        let assertion = self.authenticator.assert(&bound.encoded_challenge);
        self.service
            .authorize_transaction(
                bound.challenge.challenge_id,
                request,
                &assertion,
                &self.device_share,
            )
            .await
    }
}

pub fn transfer(wallet: Address, to: Address, value: u64) -> TransactionRequest {
    TransactionRequest {
        wallet,
        to,
        value: U256::from(value),
        data: Bytes::new(),
    }
}
