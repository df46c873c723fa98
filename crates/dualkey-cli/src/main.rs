/*!
 * dualkey operator CLI
 *
 * Offline tooling for operators of a dualkey deployment:
 * 1. Derive a Safe's counterfactual address from its owners and salt
 * 2. Compute the owner address of a device/server share pair
 * 3. Generate a recovery key and the hash that gets stored
 * 4. Decode a COSE credential public key
 * 5. Validate the service configuration in the environment
 *
 * Usage:
 *   cargo run -p dualkey-cli -- derive-address --owner 0x... --salt-nonce 1
 *   cargo run -p dualkey-cli -- owner-address <device-pub> <server-pub>
 *   cargo run -p dualkey-cli -- generate-recovery-key
 *   cargo run -p dualkey-cli -- inspect-cose <hex>
 *   cargo run -p dualkey-cli -- check-config
 */

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dualkey_wallet::config::{
    SAFE_FALLBACK_HANDLER_V130, SAFE_PROXY_FACTORY_V130, SAFE_SINGLETON_V130,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dualkey")]
#[command(about = "Operator tooling for dualkey split-key wallets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a Safe's counterfactual address
    DeriveAddress {
        /// Owner address (repeat for several owners)
        #[arg(short, long = "owner", required = true)]
        owners: Vec<String>,

        /// Signature threshold
        #[arg(short, long, default_value_t = 1)]
        threshold: u64,

        /// Salt nonce (the wallet slot)
        #[arg(short, long, default_value = "0")]
        salt_nonce: String,

        /// Proxy factory address
        #[arg(long, env = "DUALKEY_SAFE_FACTORY", default_value = SAFE_PROXY_FACTORY_V130)]
        factory: String,

        /// Safe singleton address
        #[arg(long, env = "DUALKEY_SAFE_SINGLETON", default_value = SAFE_SINGLETON_V130)]
        singleton: String,

        /// Fallback handler set by `setup`
        #[arg(long, env = "DUALKEY_SAFE_FALLBACK_HANDLER", default_value = SAFE_FALLBACK_HANDLER_V130)]
        fallback_handler: String,

        /// keccak256(proxyCreationCode ++ uint256(singleton))
        #[arg(long, env = "DUALKEY_SAFE_PROXY_INIT_CODE_HASH", conflicts_with = "creation_code")]
        init_code_hash: Option<String>,

        /// Factory's proxyCreationCode() (hex)
        #[arg(long, env = "DUALKEY_SAFE_PROXY_CREATION_CODE")]
        creation_code: Option<String>,
    },
    /// Owner address of a device and server public key pair
    OwnerAddress {
        /// Device share public key (SEC1 hex)
        device_public_key: String,

        /// Server share public key (SEC1 hex)
        server_public_key: String,
    },
    /// Generate a recovery key and its storable hash
    GenerateRecoveryKey,
    /// Decode a COSE_Key credential public key
    InspectCose {
        /// CBOR-encoded COSE key (hex)
        cose_key: String,
    },
    /// Load and validate configuration from the environment
    CheckConfig {
        /// Also open the RocksDB database
        #[arg(long)]
        open_database: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dualkey=info,security=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DeriveAddress {
            owners,
            threshold,
            salt_nonce,
            factory,
            singleton,
            fallback_handler,
            init_code_hash,
            creation_code,
        } => commands::address::derive_address(commands::address::DeriveArgs {
            owners: &owners,
            threshold,
            salt_nonce: &salt_nonce,
            factory: &factory,
            singleton: &singleton,
            fallback_handler: &fallback_handler,
            init_code_hash: init_code_hash.as_deref(),
            creation_code: creation_code.as_deref(),
        })?,

        Commands::OwnerAddress {
            device_public_key,
            server_public_key,
        } => commands::address::owner_address(&device_public_key, &server_public_key)?,

        Commands::GenerateRecoveryKey => commands::recovery::generate_recovery_key()?,

        Commands::InspectCose { cose_key } => commands::cose::inspect_cose(&cose_key)?,

        Commands::CheckConfig { open_database } => {
            commands::config::check_config(open_database).await?
        }
    }

    Ok(())
}
