/*!
 * COSE key inspection
 */

use anyhow::{Context, Result};
use colored::*;
use dualkey_webauthn::{cose::parse_cose_key, CredentialPublicKey};

use super::decode_hex;

pub fn inspect_cose(cose_hex: &str) -> Result<()> {
    let bytes = decode_hex("COSE key", cose_hex)?;
    let key = parse_cose_key(&bytes).context("COSE key rejected")?;

    println!("{}", "=== Credential Public Key ===".bold().cyan());
    println!(
        "  Algorithm: {} (COSE {})",
        key.algorithm_name(),
        key.cose_algorithm()
    );
    match &key {
        CredentialPublicKey::Es256 { sec1 } => {
            println!("  Curve:     P-256");
            println!("  SEC1:      {}", hex::encode(sec1));
        }
        CredentialPublicKey::EdDsa { public_key } => {
            println!("  Curve:     Ed25519");
            println!("  Key:       {}", hex::encode(public_key));
        }
    }

    Ok(())
}
