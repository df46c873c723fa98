/*!
 * Address commands
 */

use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use colored::*;
use dualkey_account::{derive_address as derive, owner_address as owner, SafeDeployment};
use dualkey_crypto::{combine_public_keys, parse_public_key};
use std::str::FromStr;

use super::decode_hex;

pub struct DeriveArgs<'a> {
    pub owners: &'a [String],
    pub threshold: u64,
    pub salt_nonce: &'a str,
    pub factory: &'a str,
    pub singleton: &'a str,
    pub fallback_handler: &'a str,
    pub init_code_hash: Option<&'a str>,
    pub creation_code: Option<&'a str>,
}

pub fn derive_address(args: DeriveArgs<'_>) -> Result<()> {
    let owners = args
        .owners
        .iter()
        .map(|o| parse_address("owner", o))
        .collect::<Result<Vec<_>>>()?;
    let salt_nonce = U256::from_str(args.salt_nonce.trim()).context("invalid salt nonce")?;

    let factory = parse_address("factory", args.factory)?;
    let singleton = parse_address("singleton", args.singleton)?;
    let fallback_handler = parse_address("fallback handler", args.fallback_handler)?;

    let deployment = match (args.init_code_hash, args.creation_code) {
        (Some(hash), _) => SafeDeployment {
            factory,
            singleton,
            fallback_handler,
            proxy_init_code_hash: B256::from_str(hash.trim()).context("invalid init code hash")?,
        },
        (None, Some(code)) => {
            let code = decode_hex("creation code", code)?;
            SafeDeployment::from_creation_code(factory, singleton, fallback_handler, &code)?
        }
        (None, None) => anyhow::bail!("--init-code-hash or --creation-code is required"),
    };

    let address = derive(&owners, args.threshold, &deployment, salt_nonce)?;

    println!("{}", "=== Counterfactual Safe ===".bold().cyan());
    for owner in &owners {
        println!("  Owner:          {}", owner);
    }
    println!("  Threshold:      {}", args.threshold);
    println!("  Salt nonce:     {}", salt_nonce);
    println!("  Factory:        {}", deployment.factory);
    println!("  Init code hash: {}", deployment.proxy_init_code_hash);
    println!("\n  Address: {}", address.to_string().green().bold());

    Ok(())
}

pub fn owner_address(device_public_key: &str, server_public_key: &str) -> Result<()> {
    let device = parse_public_key(&decode_hex("device public key", device_public_key)?)
        .context("invalid device public key")?;
    let server = parse_public_key(&decode_hex("server public key", server_public_key)?)
        .context("invalid server public key")?;

    let combined = combine_public_keys(&device, &server)?;
    println!("{}", owner(&combined).to_string().green().bold());

    Ok(())
}

fn parse_address(label: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim()).with_context(|| format!("invalid {} address: {}", label, value))
}
