//! Wallet service: registration, the authorization pipeline and the
//! directory operations callers reach through it.

use crate::{
    chain::*,
    config::{DeploymentMode, MasterKey, WalletConfig},
    directory::WalletDirectory,
    errors::*,
    keys::{
        find_key_record, load_key_record, registration_conflict, save_key_record,
        stage_new_key_record,
    },
    locks::KeyedLocks,
    types::*,
};
use alloy_primitives::{Address, B256, U256};
use dualkey_account::{derive_address, owner_address, SafeTransaction, SmartAccount};
use dualkey_crypto::{
    combine, combine_public_keys, compress_public_key, current_timestamp, decrypt_share,
    encrypt_share, generate_recovery_key, generate_server_share, hash_recovery_key,
    parse_public_key, verify_recovery_key, CombinedKey, CryptoError, KeyShare, RecoveryKey,
    ShareRole,
};
use dualkey_storage::{Storage, CF_TRANSACTION_INTENTS};
use dualkey_webauthn::{
    encode_challenge, AssertionResponse, Authenticator, Challenge, ChallengePurpose,
    CredentialVerifier, RegistrationResponse, VerifiedAssertion, WebAuthnError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Intent stored under its challenge id until the challenge is answered
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredIntent {
    intent: TransactionIntent,
    expires_at: u64,
}

/// Split-key wallet service
pub struct WalletService<S, C>
where
    S: Storage,
    C: ChainClient,
{
    storage: Arc<S>,
    chain: Arc<C>,
    verifier: CredentialVerifier<S>,
    directory: WalletDirectory<S>,
    config: WalletConfig,
    master_key: MasterKey,
    /// Serializes key combination per wallet
    wallet_locks: KeyedLocks<Address>,
    /// Serializes key record writes per user
    user_locks: KeyedLocks<Uuid>,
}

impl<S, C> WalletService<S, C>
where
    S: Storage + 'static,
    C: ChainClient + 'static,
{
    /// Create a new wallet service
    ///
    /// The chain client is owned by the caller; the service only borrows
    /// it through the `Arc`.
    pub fn new(
        storage: Arc<S>,
        chain: Arc<C>,
        config: WalletConfig,
        master_key: MasterKey,
    ) -> Self {
        let verifier = CredentialVerifier::new(storage.clone(), config.verifier_config());
        let directory = WalletDirectory::new(
            storage.clone(),
            config.safe.clone(),
            config.threshold,
            config.chain_id,
        );

        Self {
            storage,
            chain,
            verifier,
            directory,
            config,
            master_key,
            wallet_locks: KeyedLocks::new(),
            user_locks: KeyedLocks::new(),
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn directory(&self) -> &WalletDirectory<S> {
        &self.directory
    }

    // ========================================================================
    // Authenticators and authentication
    // ========================================================================

    pub async fn issue_registration_challenge(&self, user_id: Uuid) -> Result<Challenge> {
        self.verifier
            .issue_registration_challenge(user_id)
            .await
            .map_err(WalletError::from_issuance)
    }

    pub async fn register_authenticator(
        &self,
        challenge_id: Uuid,
        user_id: Uuid,
        response: &RegistrationResponse,
    ) -> Result<Authenticator> {
        self.verifier
            .register_authenticator(challenge_id, user_id, response)
            .await
            .map_err(|e| {
                WalletError::from_verification(challenge_id, PipelineStage::ChallengeBound, e)
            })
    }

    pub async fn revoke_authenticator(&self, user_id: Uuid, credential_id: &[u8]) -> Result<()> {
        self.verifier
            .revoke_authenticator(user_id, credential_id)
            .await
            .map_err(WalletError::from_management)
    }

    pub async fn list_authenticators(&self, user_id: Uuid) -> Result<Vec<Authenticator>> {
        self.verifier
            .list_authenticators(user_id)
            .await
            .map_err(WalletError::from_management)
    }

    /// Issue a plain authentication challenge
    ///
    /// `user_id` is `None` for discoverable-credential sign-in.
    pub async fn issue_authentication_challenge(&self, user_id: Option<Uuid>) -> Result<Challenge> {
        self.verifier
            .issue_authentication_challenge(user_id)
            .await
            .map_err(WalletError::from_issuance)
    }

    /// Verify a plain authentication assertion
    pub async fn authenticate(
        &self,
        challenge_id: Uuid,
        assertion: &AssertionResponse,
    ) -> Result<AuthenticatedUser> {
        let verified = self
            .verify(challenge_id, assertion, ChallengePurpose::Authentication)
            .await?;

        Ok(AuthenticatedUser {
            user_id: verified.user_id,
            credential_id: verified.credential_id,
            sign_count: verified.sign_count,
        })
    }

    // ========================================================================
    // Key records and wallets
    // ========================================================================

    /// Set up split-key signing for an authenticated user
    ///
    /// The device generated its share locally and sends only the public
    /// half. Creates the key record and the slot-0 wallet. The returned
    /// recovery key is the only copy.
    pub async fn register_wallet(
        &self,
        challenge_id: Uuid,
        assertion: &AssertionResponse,
        device_public_key: &[u8],
        name: Option<String>,
    ) -> Result<WalletRegistration> {
        // Step 1: Authenticate
        let user = self.authenticate(challenge_id, assertion).await?;
        let user_id = user.user_id;

        info!(user_id = %user_id, "Registering wallet");

        let device_public_key = parse_public_key(device_public_key)
            .map_err(|e| WalletError::InvalidDevicePublicKey(e.to_string()))?;

        let _guard = self.user_locks.lock(&user_id).await;

        // Step 2: One key record per user
        if find_key_record(self.storage.as_ref(), &user_id)
            .await?
            .is_some()
        {
            return Err(WalletError::AlreadyRegistered(user_id));
        }

        // Step 3: Server share and combined owner
        let server_share =
            generate_server_share().map_err(WalletError::key_material(PipelineStage::KeyCombined))?;
        let owner_address = owner_from_public_keys(&device_public_key, &server_share)?;

        // Step 4: Encrypt server share, create recovery key
        let encrypted_server_share = encrypt_share(&server_share, &self.master_key, &user_id)
            .map_err(WalletError::key_material(PipelineStage::KeyCombined))?;
        drop(server_share);

        let recovery_key =
            generate_recovery_key().map_err(WalletError::key_material(PipelineStage::KeyCombined))?;
        let recovery_hash = hash_recovery_key(&recovery_key)
            .map_err(WalletError::key_material(PipelineStage::KeyCombined))?;

        // Step 5: Record and first wallet in one batch, so a rejected name or
        // a lost race leaves nothing behind
        let record = KeyRecord {
            user_id,
            device_public_key: compress_public_key(&device_public_key).to_vec(),
            owner_address,
            encrypted_server_share,
            recovery_hash,
            created_at: current_timestamp(),
            rotated_at: None,
        };
        let wallet = self
            .directory
            .create_wallet_with(user_id, owner_address, name, None, |batch| {
                stage_new_key_record(batch, &record)
            })
            .await
            .map_err(registration_conflict(user_id))?;

        info!(
            user_id = %user_id,
            owner = %owner_address,
            wallet = %wallet.address,
            "Wallet registered"
        );

        Ok(WalletRegistration {
            wallet,
            owner_address,
            recovery_key,
        })
    }

    /// Create another wallet for an authenticated user
    pub async fn create_wallet(
        &self,
        challenge_id: Uuid,
        assertion: &AssertionResponse,
        name: Option<String>,
        chain_id: Option<u64>,
    ) -> Result<Wallet> {
        let user = self.authenticate(challenge_id, assertion).await?;
        let record = load_key_record(self.storage.as_ref(), &user.user_id).await?;

        self.directory
            .create_wallet(user.user_id, record.owner_address, name, chain_id)
            .await
    }

    pub async fn list_wallets(&self, user_id: Uuid) -> Result<Vec<Wallet>> {
        self.directory.list_wallets(user_id).await
    }

    pub async fn set_default_wallet(&self, user_id: Uuid, address: Address) -> Result<Wallet> {
        self.directory.set_default(user_id, address).await
    }

    pub async fn rename_wallet(&self, user_id: Uuid, address: Address, name: &str) -> Result<Wallet> {
        self.directory.rename_wallet(user_id, address, name).await
    }

    pub async fn select_wallet(&self, user_id: Uuid, selector: WalletSelector) -> Result<Wallet> {
        self.directory.select(user_id, selector).await
    }

    /// Counterfactual address under the configured Safe deployment
    pub fn derive_address(&self, owners: &[Address], salt_nonce: U256) -> Result<Address> {
        Ok(derive_address(
            owners,
            self.config.threshold,
            &self.config.safe,
            salt_nonce,
        )?)
    }

    /// Whether bytecode exists at `address` right now
    pub async fn is_deployed(&self, address: Address) -> Result<bool> {
        let code = self
            .chain
            .get_bytecode(address)
            .await
            .map_err(WalletError::chain(PipelineStage::DeploymentChecked, address))?;
        Ok(code.is_some_and(|c| !c.is_empty()))
    }

    /// Replace the server share after the device share was lost
    ///
    /// Requires a fresh assertion and the user's current recovery key. The
    /// new share is paired with `new_device_public_key`, which changes the
    /// owner address; wallets derived for the previous owner keep their
    /// on-chain owner until migrated. A new recovery key replaces the one
    /// presented.
    pub async fn rotate_server_share(
        &self,
        challenge_id: Uuid,
        assertion: &AssertionResponse,
        recovery_key: &str,
        new_device_public_key: &[u8],
    ) -> Result<KeyRotation> {
        // Step 1: Authenticate
        let user = self.authenticate(challenge_id, assertion).await?;
        let user_id = user.user_id;

        let new_device_public_key = parse_public_key(new_device_public_key)
            .map_err(|e| WalletError::InvalidDevicePublicKey(e.to_string()))?;

        let _guard = self.user_locks.lock(&user_id).await;
        let mut record = load_key_record(self.storage.as_ref(), &user_id).await?;

        // Step 2: Recovery key
        match verify_recovery_key(recovery_key, &record.recovery_hash) {
            Ok(()) => {}
            Err(CryptoError::RecoveryKeyMismatch) | Err(CryptoError::MalformedRecoveryKey) => {
                warn!(
                    target: "security",
                    user_id = %user_id,
                    "Recovery key rejected"
                );
                return Err(WalletError::RecoveryKeyRejected);
            }
            Err(e) => {
                return Err(WalletError::KeyMaterial {
                    stage: PipelineStage::KeyCombined,
                    source: e,
                })
            }
        }

        // Step 3: New server share, owner and recovery key
        let server_share =
            generate_server_share().map_err(WalletError::key_material(PipelineStage::KeyCombined))?;
        let owner_address = owner_from_public_keys(&new_device_public_key, &server_share)?;
        let encrypted_server_share = encrypt_share(&server_share, &self.master_key, &user_id)
            .map_err(WalletError::key_material(PipelineStage::KeyCombined))?;
        drop(server_share);

        let new_recovery_key: RecoveryKey =
            generate_recovery_key().map_err(WalletError::key_material(PipelineStage::KeyCombined))?;
        let recovery_hash = hash_recovery_key(&new_recovery_key)
            .map_err(WalletError::key_material(PipelineStage::KeyCombined))?;

        // Step 4: Replace the record
        let previous_owner = record.owner_address;
        record.device_public_key = compress_public_key(&new_device_public_key).to_vec();
        record.owner_address = owner_address;
        record.encrypted_server_share = encrypted_server_share;
        record.recovery_hash = recovery_hash;
        record.rotated_at = Some(current_timestamp());
        save_key_record(self.storage.as_ref(), &record).await?;

        info!(
            user_id = %user_id,
            previous_owner = %previous_owner,
            owner = %owner_address,
            "Server share rotated"
        );

        Ok(KeyRotation {
            previous_owner,
            owner_address,
            recovery_key: new_recovery_key,
        })
    }

    // ========================================================================
    // Authorization pipeline
    // ========================================================================

    /// Bind a challenge to a transaction (`REQUESTED -> CHALLENGE_BOUND`)
    ///
    /// The challenge and the intent are both stored before this returns.
    pub async fn request_transaction(
        &self,
        user_id: Uuid,
        request: TransactionRequest,
    ) -> Result<TransactionChallenge> {
        let wallet = self
            .directory
            .get_owned_wallet(user_id, request.wallet)
            .await?;

        let intent = TransactionIntent {
            user_id,
            wallet: wallet.address,
            to: request.to,
            value: request.value,
            data: request.data,
            chain_id: wallet.chain_id,
            created_at: current_timestamp(),
        };

        let challenge = self
            .verifier
            .issue_transaction_challenge(user_id, intent.binding_hash())
            .await
            .map_err(WalletError::from_issuance)?;

        let stored = StoredIntent {
            intent: intent.clone(),
            expires_at: challenge.expires_at,
        };
        self.storage
            .put(CF_TRANSACTION_INTENTS, &challenge.challenge_id, &stored)
            .await?;

        info!(
            stage = %PipelineStage::ChallengeBound,
            challenge_id = %challenge.challenge_id,
            wallet = %wallet.address,
            to = %intent.to,
            value = %intent.value,
            "Transaction challenge issued"
        );

        Ok(TransactionChallenge {
            encoded_challenge: encode_challenge(&challenge),
            challenge,
            intent,
        })
    }

    /// Authorize and submit a transaction
    ///
    /// `request` must be the exact transaction the challenge was bound to.
    /// `device_share` is combined with the server share only while the
    /// wallet lock is held and is never stored.
    pub async fn authorize_transaction(
        &self,
        challenge_id: Uuid,
        request: &TransactionRequest,
        assertion: &AssertionResponse,
        device_share: &KeyShare,
    ) -> Result<AuthorizationReceipt> {
        let mut stages = vec![PipelineStage::Requested, PipelineStage::ChallengeBound];

        // Step 1: Verify the assertion (consumes the challenge)
        let verified = match self
            .verify(challenge_id, assertion, ChallengePurpose::Transaction)
            .await
        {
            Ok(verified) => verified,
            Err(e) => {
                // The challenge is spent, so its intent can never be authorized
                self.storage
                    .delete(CF_TRANSACTION_INTENTS, &challenge_id)
                    .await?;
                return Err(e);
            }
        };
        stages.push(PipelineStage::CredentialVerified);

        // Step 2: Re-fetch the intent and compare it with what is submitted
        let stored: StoredIntent = self
            .storage
            .take(CF_TRANSACTION_INTENTS, &challenge_id)
            .await?
            .ok_or(WalletError::Challenge {
                stage: PipelineStage::CredentialVerified,
                challenge_id,
                source: WebAuthnError::ChallengeExpired,
            })?;
        let intent = stored.intent;
        let presented = intent.with_request(request);

        if presented.canonical_bytes() != intent.canonical_bytes()
            || verified.challenge.binding != Some(presented.binding_hash())
            || intent.user_id != verified.user_id
        {
            warn!(
                target: "security",
                challenge_id = %challenge_id,
                wallet = %request.wallet,
                "Submitted transaction differs from the challenged one"
            );
            return Err(WalletError::TransactionDataMismatch {
                wallet: request.wallet,
                challenge_id,
            });
        }

        let wallet = self
            .directory
            .get_owned_wallet(intent.user_id, intent.wallet)
            .await?;
        let address = wallet.address;

        // Step 3: Combine shares under the wallet lock. The combined key is
        // rebuilt in step 5 rather than held across the chain reads.
        let _guard = self.wallet_locks.lock(&address).await;

        let record = load_key_record(self.storage.as_ref(), &intent.user_id).await?;
        let combined_owner = {
            let combined = combine_shares(&self.master_key, &record, device_share)?;
            owner_address(&combined.public_key())
        };

        if combined_owner != wallet.owner {
            warn!(
                target: "security",
                challenge_id = %challenge_id,
                wallet = %address,
                "Combined key does not own the wallet"
            );
            return Err(WalletError::ShareMismatch { wallet: address });
        }
        stages.push(PipelineStage::KeyCombined);
        info!(stage = %PipelineStage::KeyCombined, wallet = %address, "Key shares combined");

        // Step 4: Probe deployment and read the Safe nonce
        let account = self.account_for(&wallet)?;
        let plan = self.plan_deployment(&account).await?;
        let safe_nonce = match plan {
            Some(_) => U256::ZERO,
            None => self
                .chain
                .get_nonce(address)
                .await
                .map_err(WalletError::chain(PipelineStage::DeploymentChecked, address))?,
        };
        stages.push(PipelineStage::DeploymentChecked);
        info!(
            stage = %PipelineStage::DeploymentChecked,
            wallet = %address,
            deployed = plan.is_none(),
            nonce = %safe_nonce,
            "Deployment checked"
        );

        // Step 5: Sign; the combined key is dropped at the end of the statement
        let safe_tx = SafeTransaction::call(intent.to, intent.value, intent.data.clone(), safe_nonce);
        let safe_tx_hash = safe_tx.safe_tx_hash(wallet.chain_id, &address);
        let signature = combine_shares(&self.master_key, &record, device_share)?
            .sign_prehash(&safe_tx_hash.0)
            .map_err(WalletError::key_material(PipelineStage::KeyCombined))?;

        // Step 6: Deploy (if needed) and submit
        let (deployment, attached) = match plan {
            None => (DeploymentOutcome::AlreadyDeployed, None),
            Some(call) => match self.config.deployment_mode {
                DeploymentMode::Atomic => (DeploymentOutcome::Atomic, Some(call)),
                DeploymentMode::Separate => {
                    let transaction_hash = self.submit_deployment(&wallet, call).await?;
                    (DeploymentOutcome::Separate { transaction_hash }, None)
                }
            },
        };

        let submission = Submission {
            kind: SubmissionKind::Execution,
            chain_id: wallet.chain_id,
            wallet: address,
            to: address,
            value: U256::ZERO,
            data: safe_tx.exec_transaction_calldata(&signature),
            deployment: attached,
        };
        let transaction_hash = self
            .chain
            .submit_transaction(&submission)
            .await
            .map_err(WalletError::chain(PipelineStage::Submitted, address))?;
        stages.push(PipelineStage::Submitted);

        info!(
            stage = %PipelineStage::Submitted,
            challenge_id = %challenge_id,
            wallet = %address,
            transaction_hash = %transaction_hash,
            "Transaction submitted"
        );

        Ok(AuthorizationReceipt {
            wallet: address,
            transaction_hash,
            safe_tx_hash,
            safe_nonce,
            deployment,
            stages,
        })
    }

    /// Deploy a wallet on its own
    ///
    /// Idempotent: a wallet with bytecode reports `AlreadyDeployed` and
    /// nothing is submitted.
    pub async fn deploy_wallet(
        &self,
        challenge_id: Uuid,
        assertion: &AssertionResponse,
        address: Address,
    ) -> Result<DeploymentReceipt> {
        let user = self.authenticate(challenge_id, assertion).await?;
        let wallet = self.directory.get_owned_wallet(user.user_id, address).await?;

        let _guard = self.wallet_locks.lock(&address).await;

        let account = self.account_for(&wallet)?;
        let outcome = match self.plan_deployment(&account).await? {
            None => DeploymentOutcome::AlreadyDeployed,
            Some(call) => DeploymentOutcome::Separate {
                transaction_hash: self.submit_deployment(&wallet, call).await?,
            },
        };

        info!(wallet = %address, outcome = ?outcome, "Wallet deployment handled");
        Ok(DeploymentReceipt {
            wallet: address,
            outcome,
        })
    }

    /// Delete intents whose challenges have expired unanswered
    pub async fn prune_expired_intents(&self) -> Result<usize> {
        let now = current_timestamp();
        let intents: Vec<(Vec<u8>, StoredIntent)> = self
            .storage
            .scan(CF_TRANSACTION_INTENTS)
            .await?;

        let mut batch = self.storage.batch();
        let mut pruned = 0;
        for (key, stored) in intents {
            if now >= stored.expires_at {
                batch.delete_raw(CF_TRANSACTION_INTENTS, key)?;
                pruned += 1;
            }
        }
        batch.commit().await?;

        if pruned > 0 {
            info!(pruned, "Pruned expired transaction intents");
        }
        Ok(pruned)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Verify an assertion and check the challenge was issued for `purpose`
    async fn verify(
        &self,
        challenge_id: Uuid,
        assertion: &AssertionResponse,
        purpose: ChallengePurpose,
    ) -> Result<VerifiedAssertion> {
        let verified = self
            .verifier
            .verify_assertion(challenge_id, assertion)
            .await
            .map_err(|e| {
                WalletError::from_verification(challenge_id, PipelineStage::ChallengeBound, e)
            })?;

        if verified.challenge.purpose != purpose {
            return Err(WalletError::Challenge {
                stage: PipelineStage::ChallengeBound,
                challenge_id,
                source: WebAuthnError::ChallengeMismatch(format!(
                    "challenge issued for {:?}, presented for {:?}",
                    verified.challenge.purpose, purpose
                )),
            });
        }
        Ok(verified)
    }

    /// The wallet's Safe, re-derived from its directory entry
    fn account_for(&self, wallet: &Wallet) -> Result<SmartAccount> {
        let account = self
            .directory
            .derive_account(wallet.owner, wallet.salt_nonce, wallet.chain_id)?;

        if account.address != wallet.address {
            return Err(WalletError::Deployment {
                wallet: wallet.address,
                reason: format!(
                    "directory entry does not match Safe deployment (derived {})",
                    account.address
                ),
            });
        }
        Ok(account)
    }

    /// Factory call needed to deploy `account`, or `None` if it has code
    ///
    /// Fails with `NeedsFunds` when deployment is unsponsored and the
    /// wallet holds less than the configured minimum.
    async fn plan_deployment(&self, account: &SmartAccount) -> Result<Option<DeploymentCall>> {
        let address = account.address;
        let code = self
            .chain
            .get_bytecode(address)
            .await
            .map_err(WalletError::chain(PipelineStage::DeploymentChecked, address))?;
        let account = account.clone().with_probe(code.as_ref().map(|c| &c[..]));

        if account.deployed {
            return Ok(None);
        }

        if !self.config.sponsored_deployment {
            let available = self
                .chain
                .get_balance(address)
                .await
                .map_err(WalletError::chain(PipelineStage::DeploymentChecked, address))?;
            let required = self.config.min_deployment_balance;

            if available < required {
                info!(
                    wallet = %address,
                    required = %required,
                    available = %available,
                    "Wallet needs funds before deployment"
                );
                return Err(WalletError::NeedsFunds {
                    wallet: address,
                    required,
                    available,
                });
            }
        }

        Ok(Some(DeploymentCall {
            factory: self.config.safe.factory,
            calldata: account.deployment_calldata(&self.config.safe)?,
        }))
    }

    async fn submit_deployment(&self, wallet: &Wallet, call: DeploymentCall) -> Result<B256> {
        let submission = Submission {
            kind: SubmissionKind::Deployment,
            chain_id: wallet.chain_id,
            wallet: wallet.address,
            to: call.factory,
            value: U256::ZERO,
            data: call.calldata,
            deployment: None,
        };

        let transaction_hash = self
            .chain
            .submit_transaction(&submission)
            .await
            .map_err(|e| match e {
                ChainError::Reverted(reason) => WalletError::Deployment {
                    wallet: wallet.address,
                    reason,
                },
                e => WalletError::Submission {
                    stage: PipelineStage::DeploymentChecked,
                    wallet: wallet.address,
                    source: e,
                },
            })?;

        info!(
            wallet = %wallet.address,
            transaction_hash = %transaction_hash,
            "Deployment submitted"
        );
        Ok(transaction_hash)
    }
}

/// Decrypt the server share and add the device share to it
///
/// Callers keep the result within one synchronous block, so the combined
/// key never lives across an await.
fn combine_shares(
    master_key: &MasterKey,
    record: &KeyRecord,
    device_share: &KeyShare,
) -> Result<CombinedKey> {
    let server_share = decrypt_share(
        &record.encrypted_server_share,
        master_key,
        &record.user_id,
    )
    .map_err(WalletError::key_material(PipelineStage::KeyCombined))?;
    combine(device_share, &server_share)
        .map_err(WalletError::key_material(PipelineStage::KeyCombined))
}

/// Owner address of `device_public_key + server_share * G`
fn owner_from_public_keys(
    device_public_key: &k256::PublicKey,
    server_share: &KeyShare,
) -> Result<Address> {
    debug_assert_eq!(server_share.role(), ShareRole::Server);

    let server_public_key = server_share
        .public_key()
        .map_err(WalletError::key_material(PipelineStage::KeyCombined))?;
    let combined = combine_public_keys(device_public_key, &server_public_key)
        .map_err(WalletError::key_material(PipelineStage::KeyCombined))?;
    Ok(owner_address(&combined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{errors::Disposition, testing::MockChain};
    use dualkey_account::SafeDeployment;
    use dualkey_crypto::{generate_device_share, KeyShare};
    use dualkey_storage::RocksDbStorage;
    use dualkey_webauthn::testing::SoftAuthenticator;

    const RP_ID: &str = "wallet.example";
    const ORIGIN: &str = "https://wallet.example";

    struct Harness {
        service: WalletService<RocksDbStorage, MockChain>,
        chain: Arc<MockChain>,
        authenticator: SoftAuthenticator,
        device_share: KeyShare,
        user_id: Uuid,
    }

    fn config() -> WalletConfig {
        let safe = SafeDeployment::from_creation_code(
            Address::repeat_byte(0xfa),
            Address::repeat_byte(0x5a),
            Address::repeat_byte(0xfb),
            &[0x60, 0x80, 0x60, 0x40, 0x52],
        )
        .unwrap();
        WalletConfig::new(RP_ID, ORIGIN, safe)
    }

    async fn harness(config: WalletConfig) -> Harness {
        let storage = Arc::new(RocksDbStorage::open_test().unwrap());
        let chain = Arc::new(MockChain::new());
        let service = WalletService::new(
            storage,
            chain.clone(),
            config,
            MasterKey::new([7u8; 32]),
        );

        let user_id = Uuid::new_v4();
        let authenticator = SoftAuthenticator::new(RP_ID, ORIGIN);
        let challenge = service.issue_registration_challenge(user_id).await.unwrap();
        let response = authenticator.register(&encode_challenge(&challenge)).unwrap();
        service
            .register_authenticator(challenge.challenge_id, user_id, &response)
            .await
            .unwrap();

        Harness {
            service,
            chain,
            authenticator,
            device_share: generate_device_share().unwrap(),
            user_id,
        }
    }

    impl Harness {
        async fn login(&mut self) -> (Uuid, AssertionResponse) {
            let challenge = self
                .service
                .issue_authentication_challenge(Some(self.user_id))
                .await
                .unwrap();
            let assertion = self.authenticator.assert(&encode_challenge(&challenge));
            (challenge.challenge_id, assertion)
        }

        async fn register(&mut self) -> WalletRegistration {
            let (challenge_id, assertion) = self.login().await;
            let device_public_key =
                compress_public_key(&self.device_share.public_key().unwrap());
            self.service
                .register_wallet(challenge_id, &assertion, &device_public_key, None)
                .await
                .unwrap()
        }

        async fn send(&mut self, request: TransactionRequest) -> Result<AuthorizationReceipt> {
            let bound = self
                .service
                .request_transaction(self.user_id, request.clone())
                .await?;
            let assertion = self.authenticator.assert(&bound.encoded_challenge);
            self.service
                .authorize_transaction(
                    bound.challenge.challenge_id,
                    &request,
                    &assertion,
                    &self.device_share,
                )
                .await
        }
    }

    fn payment(wallet: Address) -> TransactionRequest {
        TransactionRequest {
            wallet,
            to: Address::repeat_byte(0xbe),
            value: U256::from(1000u64),
            data: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_register_wallet_creates_default_slot_zero() {
        let mut h = harness(config()).await;
        let registration = h.register().await;

        assert_eq!(registration.wallet.salt_nonce, 0);
        assert!(registration.wallet.is_default);
        assert_eq!(registration.wallet.owner, registration.owner_address);
        assert!(!registration.recovery_key.expose().is_empty());

        let expected = h
            .service
            .derive_address(&[registration.owner_address], U256::ZERO)
            .unwrap();
        assert_eq!(registration.wallet.address, expected);

        let wallets = h.service.list_wallets(h.user_id).await.unwrap();
        assert_eq!(wallets, vec![registration.wallet]);
    }

    #[tokio::test]
    async fn test_register_wallet_twice_rejected() {
        let mut h = harness(config()).await;
        h.register().await;

        let (challenge_id, assertion) = h.login().await;
        let device_public_key = compress_public_key(&h.device_share.public_key().unwrap());
        let result = h
            .service
            .register_wallet(challenge_id, &assertion, &device_public_key, None)
            .await;
        assert!(matches!(result, Err(WalletError::AlreadyRegistered(_))));
    }

    #[tokio::test]
    async fn test_rejected_wallet_name_leaves_no_key_record() {
        let mut h = harness(config()).await;
        let device_public_key = compress_public_key(&h.device_share.public_key().unwrap());

        let (challenge_id, assertion) = h.login().await;
        let result = h
            .service
            .register_wallet(challenge_id, &assertion, &device_public_key, Some("   ".into()))
            .await;
        assert!(matches!(result, Err(WalletError::InvalidName(_))));

        assert!(find_key_record(h.service.storage.as_ref(), &h.user_id)
            .await
            .unwrap()
            .is_none());
        assert!(h.service.list_wallets(h.user_id).await.unwrap().is_empty());

        // Nothing was half-written, so registering again works
        let registration = h.register().await;
        assert_eq!(registration.wallet.salt_nonce, 0);
        assert!(registration.wallet.is_default);
    }

    #[tokio::test]
    async fn test_create_wallet_uses_next_slot() {
        let mut h = harness(config()).await;
        let first = h.register().await.wallet;

        let (challenge_id, assertion) = h.login().await;
        let second = h
            .service
            .create_wallet(challenge_id, &assertion, Some("Trading".into()), None)
            .await
            .unwrap();

        assert_eq!(second.salt_nonce, 1);
        assert_ne!(second.address, first.address);
        assert_eq!(second.owner, first.owner);
        assert!(!second.is_default);
    }

    #[tokio::test]
    async fn test_atomic_deployment_with_first_transaction() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;
        assert!(!h.service.is_deployed(wallet.address).await.unwrap());

        let receipt = h.send(payment(wallet.address)).await.unwrap();

        assert_eq!(receipt.deployment, DeploymentOutcome::Atomic);
        assert_eq!(receipt.safe_nonce, U256::ZERO);
        assert_eq!(
            receipt.stages,
            vec![
                PipelineStage::Requested,
                PipelineStage::ChallengeBound,
                PipelineStage::CredentialVerified,
                PipelineStage::KeyCombined,
                PipelineStage::DeploymentChecked,
                PipelineStage::Submitted,
            ]
        );

        let submissions = h.chain.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].kind, SubmissionKind::Execution);
        assert!(submissions[0].deployment.is_some());
        assert!(h.service.is_deployed(wallet.address).await.unwrap());

        // Deployed now: no deployment, nonce read from chain
        let receipt = h.send(payment(wallet.address)).await.unwrap();
        assert_eq!(receipt.deployment, DeploymentOutcome::AlreadyDeployed);
        assert_eq!(receipt.safe_nonce, U256::from(1u64));
        assert!(h.chain.submissions()[1].deployment.is_none());
    }

    #[tokio::test]
    async fn test_separate_deployment_submits_factory_call_first() {
        let mut config = config();
        config.deployment_mode = DeploymentMode::Separate;
        let factory = config.safe.factory;
        let mut h = harness(config).await;
        let wallet = h.register().await.wallet;

        let receipt = h.send(payment(wallet.address)).await.unwrap();
        assert!(matches!(
            receipt.deployment,
            DeploymentOutcome::Separate { .. }
        ));

        let submissions = h.chain.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].kind, SubmissionKind::Deployment);
        assert_eq!(submissions[0].to, factory);
        assert_eq!(submissions[1].kind, SubmissionKind::Execution);
        assert_eq!(submissions[1].to, wallet.address);
    }

    #[tokio::test]
    async fn test_signature_recovers_wallet_owner() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;
        h.chain.deploy(wallet.address);

        let receipt = h.send(payment(wallet.address)).await.unwrap();
        let data = &h.chain.submissions()[0].data;

        // Signature is the last dynamic argument: r || s || v, padded to 96
        let signature = &data[data.len() - 96..data.len() - 31];
        let recovery_id = k256::ecdsa::RecoveryId::from_byte(signature[64] - 27).unwrap();
        let sig = k256::ecdsa::Signature::from_slice(&signature[..64]).unwrap();
        let recovered = k256::ecdsa::VerifyingKey::recover_from_prehash(
            receipt.safe_tx_hash.as_slice(),
            &sig,
            recovery_id,
        )
        .unwrap();
        assert_eq!(
            owner_address(&k256::PublicKey::from(&recovered)),
            wallet.owner
        );
    }

    #[tokio::test]
    async fn test_modified_transaction_rejected() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;

        let original = payment(wallet.address);
        let bound = h
            .service
            .request_transaction(h.user_id, original.clone())
            .await
            .unwrap();
        let assertion = h.authenticator.assert(&bound.encoded_challenge);

        let mut tampered = original.clone();
        tampered.to = Address::repeat_byte(0xee);
        let result = h
            .service
            .authorize_transaction(
                bound.challenge.challenge_id,
                &tampered,
                &assertion,
                &h.device_share,
            )
            .await;

        match result {
            Err(e @ WalletError::TransactionDataMismatch { .. }) => {
                assert_eq!(e.disposition(), Disposition::Rejected);
            }
            other => panic!("expected TransactionDataMismatch, got {:?}", other),
        }
        assert!(h.chain.submissions().is_empty());

        // Challenge and intent are both spent
        let assertion = h.authenticator.assert(&bound.encoded_challenge);
        let retry = h
            .service
            .authorize_transaction(
                bound.challenge.challenge_id,
                &original,
                &assertion,
                &h.device_share,
            )
            .await;
        assert!(matches!(retry, Err(WalletError::Challenge { .. })));
    }

    #[tokio::test]
    async fn test_challenge_cannot_authorize_twice() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;
        let request = payment(wallet.address);

        let bound = h
            .service
            .request_transaction(h.user_id, request.clone())
            .await
            .unwrap();
        let assertion = h.authenticator.assert(&bound.encoded_challenge);
        h.service
            .authorize_transaction(
                bound.challenge.challenge_id,
                &request,
                &assertion,
                &h.device_share,
            )
            .await
            .unwrap();

        let replay = h
            .service
            .authorize_transaction(
                bound.challenge.challenge_id,
                &request,
                &assertion,
                &h.device_share,
            )
            .await
            .unwrap_err();
        assert_eq!(replay.disposition(), Disposition::RestartCeremony);
        assert_eq!(h.chain.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_authentication_challenge_cannot_authorize_transaction() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;

        let (challenge_id, assertion) = h.login().await;
        let result = h
            .service
            .authorize_transaction(
                challenge_id,
                &payment(wallet.address),
                &assertion,
                &h.device_share,
            )
            .await;
        assert!(matches!(result, Err(WalletError::Challenge { .. })));
    }

    #[tokio::test]
    async fn test_combined_shares_sign_for_wallet_owner() {
        use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

        let mut h = harness(config()).await;
        let registration = h.register().await;
        let record = load_key_record(h.service.storage.as_ref(), &h.user_id)
            .await
            .unwrap();

        let prehash = [0x5au8; 32];
        let signature = combine_shares(&h.service.master_key, &record, &h.device_share)
            .unwrap()
            .sign_prehash(&prehash)
            .unwrap();
        let recovered = VerifyingKey::recover_from_prehash(
            &prehash,
            &Signature::try_from(&signature[..64]).unwrap(),
            RecoveryId::try_from(signature[64] - 27).unwrap(),
        )
        .unwrap();
        assert_eq!(owner_address(&recovered.into()), registration.owner_address);

        let stranger = generate_device_share().unwrap();
        let other = combine_shares(&h.service.master_key, &record, &stranger).unwrap();
        assert_ne!(owner_address(&other.public_key()), registration.owner_address);
    }

    #[tokio::test]
    async fn test_wrong_device_share_rejected() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;
        h.device_share = generate_device_share().unwrap();

        let result = h.send(payment(wallet.address)).await;
        assert!(matches!(result, Err(WalletError::ShareMismatch { .. })));
        assert!(h.chain.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_unfunded_deployment_needs_funds() {
        let mut config = config();
        config.min_deployment_balance = U256::from(10u64).pow(U256::from(16u64));
        let mut h = harness(config).await;
        let wallet = h.register().await.wallet;

        let err = h.send(payment(wallet.address)).await.unwrap_err();
        assert!(matches!(err, WalletError::NeedsFunds { .. }));
        assert_eq!(err.disposition(), Disposition::FundAndRetry);
        assert!(h.chain.submissions().is_empty());

        h.chain
            .fund(wallet.address, U256::from(10u64).pow(U256::from(17u64)));
        assert!(h.send(payment(wallet.address)).await.is_ok());
    }

    #[tokio::test]
    async fn test_sponsored_deployment_skips_balance() {
        let mut config = config();
        config.min_deployment_balance = U256::from(10u64).pow(U256::from(16u64));
        config.sponsored_deployment = true;
        let mut h = harness(config).await;
        let wallet = h.register().await.wallet;

        let receipt = h.send(payment(wallet.address)).await.unwrap();
        assert_eq!(receipt.deployment, DeploymentOutcome::Atomic);
    }

    #[tokio::test]
    async fn test_submission_failure_is_retryable() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;
        h.chain
            .fail_next_submission(ChainError::Rejected("nonce too low".into()));

        let err = h.send(payment(wallet.address)).await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::Submission {
                stage: PipelineStage::Submitted,
                ..
            }
        ));
        assert_eq!(err.disposition(), Disposition::Retryable);
    }

    #[tokio::test]
    async fn test_deploy_wallet_is_idempotent() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;

        let (challenge_id, assertion) = h.login().await;
        let receipt = h
            .service
            .deploy_wallet(challenge_id, &assertion, wallet.address)
            .await
            .unwrap();
        assert!(matches!(receipt.outcome, DeploymentOutcome::Separate { .. }));

        let (challenge_id, assertion) = h.login().await;
        let receipt = h
            .service
            .deploy_wallet(challenge_id, &assertion, wallet.address)
            .await
            .unwrap();
        assert_eq!(receipt.outcome, DeploymentOutcome::AlreadyDeployed);
        assert_eq!(h.chain.submissions().len(), 1);
    }

    #[tokio::test]
    async fn test_reverted_deployment_is_fatal() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;
        h.chain
            .fail_next_submission(ChainError::Reverted("GS000".into()));

        let (challenge_id, assertion) = h.login().await;
        let err = h
            .service
            .deploy_wallet(challenge_id, &assertion, wallet.address)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Deployment { .. }));
        assert_eq!(err.disposition(), Disposition::Fatal);
    }

    #[tokio::test]
    async fn test_rotate_server_share() {
        let mut h = harness(config()).await;
        let registration = h.register().await;
        let recovery_key = registration.recovery_key.expose().to_string();

        let new_device_share = generate_device_share().unwrap();
        let new_public_key = compress_public_key(&new_device_share.public_key().unwrap());

        // Wrong recovery key
        let (challenge_id, assertion) = h.login().await;
        let wrong = RecoveryKey::generate().unwrap();
        let result = h
            .service
            .rotate_server_share(challenge_id, &assertion, wrong.expose(), &new_public_key)
            .await;
        assert!(matches!(result, Err(WalletError::RecoveryKeyRejected)));

        let (challenge_id, assertion) = h.login().await;
        let rotation = h
            .service
            .rotate_server_share(challenge_id, &assertion, &recovery_key, &new_public_key)
            .await
            .unwrap();
        assert_eq!(rotation.previous_owner, registration.owner_address);
        assert_ne!(rotation.owner_address, registration.owner_address);

        // Old recovery key is spent
        let (challenge_id, assertion) = h.login().await;
        let result = h
            .service
            .rotate_server_share(challenge_id, &assertion, &recovery_key, &new_public_key)
            .await;
        assert!(matches!(result, Err(WalletError::RecoveryKeyRejected)));

        // New wallets belong to the new owner and sign with the new device share
        let (challenge_id, assertion) = h.login().await;
        let wallet = h
            .service
            .create_wallet(challenge_id, &assertion, None, None)
            .await
            .unwrap();
        assert_eq!(wallet.owner, rotation.owner_address);

        h.device_share = new_device_share;
        assert!(h.send(payment(wallet.address)).await.is_ok());
    }

    #[tokio::test]
    async fn test_request_for_foreign_wallet_rejected() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;

        let result = h
            .service
            .request_transaction(Uuid::new_v4(), payment(wallet.address))
            .await;
        assert!(matches!(result, Err(WalletError::WalletNotFound(_))));
    }

    #[tokio::test]
    async fn test_prune_expired_intents() {
        let mut h = harness(config()).await;
        let wallet = h.register().await.wallet;
        let request = payment(wallet.address);

        let live = h
            .service
            .request_transaction(h.user_id, request.clone())
            .await
            .unwrap();
        let stale = StoredIntent {
            intent: live.intent.clone(),
            expires_at: current_timestamp() - 1,
        };
        h.service
            .storage
            .put(CF_TRANSACTION_INTENTS, &Uuid::new_v4(), &stale)
            .await
            .unwrap();

        assert_eq!(h.service.prune_expired_intents().await.unwrap(), 1);
        assert_eq!(h.service.prune_expired_intents().await.unwrap(), 0);

        // The live intent survives
        let assertion = h.authenticator.assert(&live.encoded_challenge);
        h.service
            .authorize_transaction(
                live.challenge.challenge_id,
                &request,
                &assertion,
                &h.device_share,
            )
            .await
            .unwrap();
    }
}
