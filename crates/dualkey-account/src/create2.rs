//! CREATE2 address derivation for Safe proxies.

use crate::{errors::*, safe::*};
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;

/// keccak256(0xff ++ deployer ++ salt ++ init_code_hash)[12..]
pub fn create2_address(deployer: &Address, salt: &B256, init_code_hash: &B256) -> Address {
    deployer.create2(salt, init_code_hash)
}

/// Hash of the proxy init code: creation code followed by the
/// ABI-encoded singleton constructor argument
pub fn proxy_init_code_hash(creation_code: &[u8], singleton: &Address) -> B256 {
    keccak256([creation_code, singleton.into_word().as_slice()].concat())
}

/// Final factory salt: keccak256(keccak256(initializer) ++ uint256(salt_nonce))
///
/// Binding the initializer hash into the salt means two different owner
/// sets can never land on the same address even with the same nonce.
pub fn safe_salt(initializer: &[u8], salt_nonce: U256) -> B256 {
    keccak256((keccak256(initializer), salt_nonce).abi_encode_packed())
}

/// Counterfactual address of a Safe with the given owners and salt nonce
///
/// Pure: the result is the wallet's address from the moment of creation,
/// whether or not the proxy has been deployed.
pub fn derive_address(
    owners: &[Address],
    threshold: u64,
    deployment: &SafeDeployment,
    salt_nonce: U256,
) -> Result<Address> {
    let initializer = setup_initializer(owners, threshold, &deployment.fallback_handler)?;
    let salt = safe_salt(&initializer, salt_nonce);
    Ok(create2_address(
        &deployment.factory,
        &salt,
        &deployment.proxy_init_code_hash,
    ))
}
