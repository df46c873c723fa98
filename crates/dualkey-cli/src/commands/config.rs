/*!
 * Configuration check
 */

use anyhow::{Context, Result};
use colored::*;
use dualkey_storage::RocksDbStorage;
use dualkey_wallet::{master_key_from_env, WalletConfig};

pub async fn check_config(open_database: bool) -> Result<()> {
    println!("{}", "=== Configuration ===".bold().cyan());

    let config = WalletConfig::from_env()?;
    master_key_from_env()?;

    println!("  RP ID:              {}", config.rp_id);
    println!("  Origins:            {}", config.allowed_origins.join(", "));
    println!("  Challenge TTL:      {}s", config.challenge_ttl_seconds);
    println!("  Require UV:         {}", config.require_user_verification);
    println!("  Chain ID:           {}", config.chain_id);
    println!("  Safe factory:       {}", config.safe.factory);
    println!("  Safe singleton:     {}", config.safe.singleton);
    println!("  Fallback handler:   {}", config.safe.fallback_handler);
    println!("  Init code hash:     {}", config.safe.proxy_init_code_hash);
    println!("  Threshold:          {}", config.threshold);
    println!("  Deployment mode:    {:?}", config.deployment_mode);
    println!("  Sponsored deploys:  {}", config.sponsored_deployment);
    println!("  Min deploy balance: {}", config.min_deployment_balance);
    println!("  Master key:         {}", "loaded".green());

    if open_database {
        RocksDbStorage::open(&config.database_path).with_context(|| {
            format!("failed to open database at {}", config.database_path.display())
        })?;
        println!(
            "  Database:           {}",
            config.database_path.display().to_string().green()
        );
    }

    tracing::info!("Configuration valid");
    println!("\n{}", "✓ Configuration valid".green());
    Ok(())
}
