/*!
 * Recovery key generation
 */

use anyhow::Result;
use colored::*;
use dualkey_crypto::{generate_recovery_key as generate, hash_recovery_key};

pub fn generate_recovery_key() -> Result<()> {
    let key = generate()?;
    let hash = hash_recovery_key(&key)?;

    println!("{}", "=== Recovery Key ===".bold().cyan());
    println!(
        "{}",
        "Shown once. Hand it to the user; store only the hash.".yellow()
    );
    println!("\n  Key:    {}", key.expose().bold());
    println!("  Salt:   {}", hex::encode(hash.salt));
    println!("  Digest: {}", hex::encode(hash.digest));

    Ok(())
}
