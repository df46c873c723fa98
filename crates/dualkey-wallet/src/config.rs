//! Wallet service configuration.

use alloy_primitives::{Address, B256, U256};
use anyhow::{bail, Context, Result};
use dualkey_account::SafeDeployment;
use dualkey_crypto::MASTER_KEY_SIZE;
use dualkey_webauthn::{VerifierConfig, DEFAULT_CHALLENGE_TTL_SECONDS};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr};
use zeroize::Zeroizing;

/// Safe v1.3.0 `GnosisSafeProxyFactory` (canonical deployment)
pub const SAFE_PROXY_FACTORY_V130: &str = "0xa6B71E26C5e0845f74c812102Ca7114b6a896AB2";

/// Safe v1.3.0 `GnosisSafe` singleton (canonical deployment)
pub const SAFE_SINGLETON_V130: &str = "0xd9Db270c1B5E3Bd161E8c8503c55cEABeE709552";

/// Safe v1.3.0 `CompatibilityFallbackHandler` (canonical deployment)
pub const SAFE_FALLBACK_HANDLER_V130: &str = "0xf48f2B2d2a534e402487b3ee7C18c33Aec0Fe5e4";

/// Service master key; wraps every server share
pub type MasterKey = Zeroizing<[u8; MASTER_KEY_SIZE]>;

/// How an undeployed wallet gets deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Deployment travels with the first transaction
    Atomic,
    /// Factory call submitted before the first transaction
    Separate,
}

impl FromStr for DeploymentMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "atomic" => Ok(DeploymentMode::Atomic),
            "separate" => Ok(DeploymentMode::Separate),
            other => bail!("unknown deployment mode: {}", other),
        }
    }
}

/// Wallet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// WebAuthn relying party ID
    pub rp_id: String,

    /// Origins accepted in client data
    pub allowed_origins: Vec<String>,

    /// Challenge lifetime (seconds)
    pub challenge_ttl_seconds: u64,

    /// Require the UV flag on every assertion
    pub require_user_verification: bool,

    /// Chain wallets are created on unless the caller picks another
    pub chain_id: u64,

    /// Safe contracts wallets are derived against
    pub safe: SafeDeployment,

    /// Safe threshold (one combined owner, so 1)
    pub threshold: u64,

    pub deployment_mode: DeploymentMode,

    /// A paymaster or relayer covers deployment gas
    pub sponsored_deployment: bool,

    /// Balance an unsponsored wallet needs before deployment (wei)
    pub min_deployment_balance: U256,

    /// Path to RocksDB database
    pub database_path: PathBuf,
}

impl WalletConfig {
    /// Configuration with defaults for everything but the relying party
    /// and Safe deployment
    pub fn new(rp_id: impl Into<String>, origin: impl Into<String>, safe: SafeDeployment) -> Self {
        Self {
            rp_id: rp_id.into(),
            allowed_origins: vec![origin.into()],
            challenge_ttl_seconds: DEFAULT_CHALLENGE_TTL_SECONDS,
            require_user_verification: true,
            chain_id: 1,
            safe,
            threshold: 1,
            deployment_mode: DeploymentMode::Atomic,
            sponsored_deployment: false,
            min_deployment_balance: U256::ZERO,
            database_path: PathBuf::from("./data/dualkey.db"),
        }
    }

    /// Load configuration from environment variables
    ///
    /// `DUALKEY_SAFE_PROXY_INIT_CODE_HASH` or
    /// `DUALKEY_SAFE_PROXY_CREATION_CODE` is required; everything else has
    /// a default.
    pub fn from_env() -> Result<Self> {
        let rp_id = std::env::var("DUALKEY_RP_ID").unwrap_or_else(|_| "localhost".to_string());

        let allowed_origins = std::env::var("DUALKEY_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect::<Vec<_>>();
        if allowed_origins.is_empty() {
            bail!("DUALKEY_ORIGINS must list at least one origin");
        }

        let challenge_ttl_seconds = std::env::var("DUALKEY_CHALLENGE_TTL_SECONDS")
            .unwrap_or_else(|_| DEFAULT_CHALLENGE_TTL_SECONDS.to_string())
            .parse()
            .context("DUALKEY_CHALLENGE_TTL_SECONDS")?;

        let require_user_verification = std::env::var("DUALKEY_REQUIRE_UV")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .context("DUALKEY_REQUIRE_UV")?;

        let chain_id = std::env::var("DUALKEY_CHAIN_ID")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .context("DUALKEY_CHAIN_ID")?;

        let factory = env_address("DUALKEY_SAFE_FACTORY", SAFE_PROXY_FACTORY_V130)?;
        let singleton = env_address("DUALKEY_SAFE_SINGLETON", SAFE_SINGLETON_V130)?;
        let fallback_handler =
            env_address("DUALKEY_SAFE_FALLBACK_HANDLER", SAFE_FALLBACK_HANDLER_V130)?;

        let safe = match (
            std::env::var("DUALKEY_SAFE_PROXY_INIT_CODE_HASH"),
            std::env::var("DUALKEY_SAFE_PROXY_CREATION_CODE"),
        ) {
            (Ok(hash), _) => SafeDeployment {
                factory,
                singleton,
                fallback_handler,
                proxy_init_code_hash: B256::from_str(hash.trim())
                    .context("DUALKEY_SAFE_PROXY_INIT_CODE_HASH")?,
            },
            (Err(_), Ok(code)) => {
                let code = hex::decode(code.trim().trim_start_matches("0x"))
                    .context("DUALKEY_SAFE_PROXY_CREATION_CODE")?;
                SafeDeployment::from_creation_code(factory, singleton, fallback_handler, &code)?
            }
            (Err(_), Err(_)) => bail!(
                "DUALKEY_SAFE_PROXY_INIT_CODE_HASH or DUALKEY_SAFE_PROXY_CREATION_CODE required"
            ),
        };

        let threshold = std::env::var("DUALKEY_SAFE_THRESHOLD")
            .unwrap_or_else(|_| "1".to_string())
            .parse()
            .context("DUALKEY_SAFE_THRESHOLD")?;

        let deployment_mode = std::env::var("DUALKEY_DEPLOYMENT_MODE")
            .unwrap_or_else(|_| "atomic".to_string())
            .parse()?;

        let sponsored_deployment = std::env::var("DUALKEY_SPONSORED_DEPLOYMENT")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .context("DUALKEY_SPONSORED_DEPLOYMENT")?;

        let min_deployment_balance = U256::from_str(
            &std::env::var("DUALKEY_MIN_DEPLOYMENT_BALANCE").unwrap_or_else(|_| "0".to_string()),
        )
        .context("DUALKEY_MIN_DEPLOYMENT_BALANCE")?;

        let database_path = std::env::var("DUALKEY_DATABASE_PATH")
            .unwrap_or_else(|_| "./data/dualkey.db".to_string())
            .into();

        Ok(Self {
            rp_id,
            allowed_origins,
            challenge_ttl_seconds,
            require_user_verification,
            chain_id,
            safe,
            threshold,
            deployment_mode,
            sponsored_deployment,
            min_deployment_balance,
            database_path,
        })
    }

    /// Settings for the credential verifier
    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            rp_id: self.rp_id.clone(),
            allowed_origins: self.allowed_origins.clone(),
            challenge_ttl_seconds: self.challenge_ttl_seconds,
            require_user_verification: self.require_user_verification,
        }
    }
}

/// Load the service master key (`DUALKEY_MASTER_KEY`, 64 hex chars)
pub fn master_key_from_env() -> Result<MasterKey> {
    let hex_key = Zeroizing::new(
        std::env::var("DUALKEY_MASTER_KEY")
            .context("DUALKEY_MASTER_KEY environment variable required")?,
    );
    parse_master_key(&hex_key)
}

/// Parse a hex master key
pub fn parse_master_key(hex_key: &str) -> Result<MasterKey> {
    let bytes = Zeroizing::new(hex::decode(hex_key.trim()).context("master key is not hex")?);
    if bytes.len() != MASTER_KEY_SIZE {
        bail!("master key must be 32 bytes (64 hex chars)");
    }
    let mut key = Zeroizing::new([0u8; MASTER_KEY_SIZE]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn env_address(name: &str, default: &str) -> Result<Address> {
    let value = std::env::var(name).unwrap_or_else(|_| default.to_string());
    Address::from_str(value.trim()).with_context(|| format!("{} is not an address", name))
}
