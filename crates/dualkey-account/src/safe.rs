//! Safe v1.3.0 factory and setup encoding.

use crate::{
    contracts::{ISafe, ISafeProxyFactory},
    create2::proxy_init_code_hash,
    errors::*,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The deployed Safe contracts a wallet is derived against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeDeployment {
    /// `SafeProxyFactory` address (the CREATE2 deployer)
    pub factory: Address,
    /// Safe singleton (master copy) the proxy delegates to
    pub singleton: Address,
    /// Fallback handler set during `setup`; zero for none
    pub fallback_handler: Address,
    /// keccak256(proxy creation code ++ uint256(singleton))
    pub proxy_init_code_hash: B256,
}

impl SafeDeployment {
    /// Build a deployment description from the factory's proxy creation code
    pub fn from_creation_code(
        factory: Address,
        singleton: Address,
        fallback_handler: Address,
        proxy_creation_code: &[u8],
    ) -> Result<Self> {
        if proxy_creation_code.is_empty() {
            return Err(AddressDerivationError::InvalidCreationCode(
                "creation code is empty".to_string(),
            ));
        }

        Ok(Self {
            factory,
            singleton,
            fallback_handler,
            proxy_init_code_hash: proxy_init_code_hash(proxy_creation_code, &singleton),
        })
    }
}

/// Check an owner set and threshold the way `Safe.setup` would
pub fn validate_owners(owners: &[Address], threshold: u64) -> Result<()> {
    if owners.is_empty() {
        return Err(AddressDerivationError::EmptyOwners);
    }

    let sentinel = Address::with_last_byte(1);
    let mut seen = HashSet::with_capacity(owners.len());
    for owner in owners {
        if *owner == Address::ZERO || *owner == sentinel {
            return Err(AddressDerivationError::InvalidOwner(*owner));
        }
        if !seen.insert(*owner) {
            return Err(AddressDerivationError::DuplicateOwner(*owner));
        }
    }

    if threshold == 0 || threshold > owners.len() as u64 {
        return Err(AddressDerivationError::InvalidThreshold {
            threshold,
            owners: owners.len(),
        });
    }

    Ok(())
}

/// Encode the `setup` initializer calldata
///
/// `to`, `data`, `paymentToken`, `payment` and `paymentReceiver` are zeroed.
/// Owner order is preserved: the initializer, and therefore the address,
/// depends on it.
pub fn setup_initializer(
    owners: &[Address],
    threshold: u64,
    fallback_handler: &Address,
) -> Result<Bytes> {
    validate_owners(owners, threshold)?;

    let call = ISafe::setupCall {
        _owners: owners.to_vec(),
        _threshold: U256::from(threshold),
        to: Address::ZERO,
        data: Bytes::new(),
        fallbackHandler: *fallback_handler,
        paymentToken: Address::ZERO,
        payment: U256::ZERO,
        paymentReceiver: Address::ZERO,
    };
    Ok(call.abi_encode().into())
}

/// Encode the factory call that deploys the proxy
pub fn create_proxy_calldata(singleton: &Address, initializer: &[u8], salt_nonce: U256) -> Bytes {
    ISafeProxyFactory::createProxyWithNonceCall {
        _singleton: *singleton,
        initializer: Bytes::copy_from_slice(initializer),
        saltNonce: salt_nonce,
    }
    .abi_encode()
    .into()
}
