/*!
 * Command implementations
 */

pub mod address;
pub mod config;
pub mod cose;
pub mod recovery;

use anyhow::{Context, Result};

/// Decode hex with or without a `0x` prefix
pub fn decode_hex(label: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim().trim_start_matches("0x"))
        .with_context(|| format!("{} is not valid hex", label))
}
