//! Multi-wallet directory.
//!
//! Each user owns a sequence of wallets. Wallet `n` lives in slot `n` and is
//! derived with salt nonce `n`, so re-deriving a slot always reproduces its
//! address. Exactly one wallet per user carries the default flag; the
//! directory enforces this with a per-user lock and single-batch writes.

use crate::{errors::*, locks::KeyedLocks, types::*};
use alloy_primitives::{Address, U256};
use dualkey_account::{SafeDeployment, SmartAccount};
use dualkey_crypto::current_timestamp;
use dualkey_storage::{
    Batch, BatchExt, Storage, CF_WALLETS, CF_WALLETS_BY_ADDRESS, CF_WALLET_SLOTS,
};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Longest accepted wallet name (characters)
pub const MAX_WALLET_NAME_LEN: usize = 64;

/// Per-user wallet directory
pub struct WalletDirectory<S: Storage> {
    storage: Arc<S>,
    deployment: SafeDeployment,
    threshold: u64,
    default_chain_id: u64,
    user_locks: KeyedLocks<Uuid>,
}

impl<S: Storage> WalletDirectory<S> {
    pub fn new(
        storage: Arc<S>,
        deployment: SafeDeployment,
        threshold: u64,
        default_chain_id: u64,
    ) -> Self {
        Self {
            storage,
            deployment,
            threshold,
            default_chain_id,
            user_locks: KeyedLocks::new(),
        }
    }

    /// Counterfactual account for an owner and slot
    pub fn derive_account(&self, owner: Address, slot: u64, chain_id: u64) -> Result<SmartAccount> {
        Ok(SmartAccount::counterfactual(
            vec![owner],
            self.threshold,
            &self.deployment,
            U256::from(slot),
            chain_id,
        )?)
    }

    /// Allocate the user's next slot and record a wallet derived from it
    ///
    /// The first wallet a user creates becomes the default.
    pub async fn create_wallet(
        &self,
        user_id: Uuid,
        owner: Address,
        name: Option<String>,
        chain_id: Option<u64>,
    ) -> Result<Wallet> {
        self.create_wallet_with(user_id, owner, name, chain_id, |_| Ok(()))
            .await
    }

    /// [`create_wallet`](Self::create_wallet) with `stage` adding writes and
    /// commit preconditions to the wallet's batch
    ///
    /// `stage` runs only once the name is valid and the address derived, and
    /// its writes land together with the wallet or not at all.
    pub async fn create_wallet_with<F>(
        &self,
        user_id: Uuid,
        owner: Address,
        name: Option<String>,
        chain_id: Option<u64>,
        stage: F,
    ) -> Result<Wallet>
    where
        F: FnOnce(&mut dyn Batch) -> Result<()> + Send,
    {
        let _guard = self.user_locks.lock(&user_id).await;

        let slot: u64 = self
            .storage
            .get(CF_WALLET_SLOTS, &user_id)
            .await?
            .unwrap_or(0);

        let name = match name {
            Some(name) => validate_name(&name)?,
            None => format!("Wallet {}", slot + 1),
        };
        let chain_id = chain_id.unwrap_or(self.default_chain_id);
        let account = self.derive_account(owner, slot, chain_id)?;

        let wallet = Wallet {
            address: account.address,
            user_id,
            name,
            chain_id,
            salt_nonce: slot,
            owner,
            is_default: slot == 0,
            created_at: current_timestamp(),
        };

        // Entry, address index and slot counter land together
        let mut batch = self.storage.batch();
        stage(batch.as_mut())?;
        batch.put(CF_WALLETS, &(user_id, slot), &wallet)?;
        batch.put(CF_WALLETS_BY_ADDRESS, &wallet.address, &(user_id, slot))?;
        batch.put(CF_WALLET_SLOTS, &user_id, &(slot + 1))?;
        batch.commit().await?;

        info!(
            user_id = %user_id,
            wallet = %wallet.address,
            slot,
            chain_id,
            "Wallet created"
        );
        Ok(wallet)
    }

    /// Wallets of a user, ordered by slot
    pub async fn list_wallets(&self, user_id: Uuid) -> Result<Vec<Wallet>> {
        let entries: Vec<(Vec<u8>, Wallet)> = self
            .storage
            .get_by_prefix(CF_WALLETS, &user_id)
            .await?;

        // Slot keys are little-endian, so byte order is not slot order
        let mut wallets: Vec<Wallet> = entries.into_iter().map(|(_, w)| w).collect();
        wallets.sort_by_key(|w| w.salt_nonce);
        Ok(wallets)
    }

    pub async fn get_wallet(&self, address: Address) -> Result<Wallet> {
        let key: (Uuid, u64) = self
            .storage
            .get(CF_WALLETS_BY_ADDRESS, &address)
            .await?
            .ok_or(WalletError::WalletNotFound(address))?;

        self.storage
            .get(CF_WALLETS, &key)
            .await?
            .ok_or(WalletError::WalletNotFound(address))
    }

    /// A wallet, provided `user_id` owns it
    ///
    /// Someone else's wallet reads as not found.
    pub async fn get_owned_wallet(&self, user_id: Uuid, address: Address) -> Result<Wallet> {
        let wallet = self.get_wallet(address).await?;
        if wallet.user_id != user_id {
            return Err(WalletError::WalletNotFound(address));
        }
        Ok(wallet)
    }

    /// Make `address` the user's only default wallet
    pub async fn set_default(&self, user_id: Uuid, address: Address) -> Result<Wallet> {
        let _guard = self.user_locks.lock(&user_id).await;

        let wallets = self.list_wallets(user_id).await?;
        if !wallets.iter().any(|w| w.address == address) {
            return Err(WalletError::WalletNotFound(address));
        }

        let mut batch = self.storage.batch();
        let mut selected = None;
        for mut wallet in wallets {
            let is_default = wallet.address == address;
            if wallet.is_default != is_default {
                wallet.is_default = is_default;
                batch.put(CF_WALLETS, &(user_id, wallet.salt_nonce), &wallet)?;
            }
            if is_default {
                selected = Some(wallet);
            }
        }
        batch.commit().await?;

        info!(user_id = %user_id, wallet = %address, "Default wallet changed");
        selected.ok_or(WalletError::WalletNotFound(address))
    }

    pub async fn rename_wallet(
        &self,
        user_id: Uuid,
        address: Address,
        name: &str,
    ) -> Result<Wallet> {
        let name = validate_name(name)?;
        let _guard = self.user_locks.lock(&user_id).await;

        let mut wallet = self.get_owned_wallet(user_id, address).await?;
        wallet.name = name;
        self.storage
            .put(CF_WALLETS, &(user_id, wallet.salt_nonce), &wallet)
            .await?;

        Ok(wallet)
    }

    /// Resolve "the current wallet" for callers that do not name one
    pub async fn select(&self, user_id: Uuid, selector: WalletSelector) -> Result<Wallet> {
        if let WalletSelector::Address(address) = selector {
            return self.get_owned_wallet(user_id, address).await;
        }

        let wallets = self.list_wallets(user_id).await?;
        if wallets.is_empty() {
            return Err(WalletError::NoWallets(user_id));
        }

        let found = match selector {
            WalletSelector::Default => wallets
                .iter()
                .find(|w| w.is_default)
                .or_else(|| wallets.last()),
            WalletSelector::Newest => wallets.last(),
            WalletSelector::Slot(slot) => wallets.iter().find(|w| w.salt_nonce == slot),
            WalletSelector::Address(_) => None,
        };

        found.cloned().ok_or(WalletError::NoWallets(user_id))
    }
}

/// Trimmed, non-empty, bounded, no control characters
fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(WalletError::InvalidName("name is empty".to_string()));
    }
    if name.chars().count() > MAX_WALLET_NAME_LEN {
        return Err(WalletError::InvalidName(format!(
            "name exceeds {} characters",
            MAX_WALLET_NAME_LEN
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(WalletError::InvalidName(
            "name contains control characters".to_string(),
        ));
    }
    Ok(name.to_string())
}
