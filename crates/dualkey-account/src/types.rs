//! Smart account records.

use crate::{create2::derive_address, errors::*, safe::*};
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// A Safe smart account, deployed or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartAccount {
    /// Counterfactual address (computed, never assigned)
    pub address: Address,
    pub owners: Vec<Address>,
    pub threshold: u64,
    pub salt_nonce: U256,
    pub chain_id: u64,
    /// Result of a bytecode probe made during the current request.
    /// Never persist this as ground truth.
    pub deployed: bool,
}

impl SmartAccount {
    /// Derive the account for an owner set and salt nonce
    ///
    /// `deployed` starts false; set it from a fresh bytecode probe.
    pub fn counterfactual(
        owners: Vec<Address>,
        threshold: u64,
        deployment: &SafeDeployment,
        salt_nonce: U256,
        chain_id: u64,
    ) -> Result<Self> {
        let address = derive_address(&owners, threshold, deployment, salt_nonce)?;
        Ok(Self {
            address,
            owners,
            threshold,
            salt_nonce,
            chain_id,
            deployed: false,
        })
    }

    /// Record the outcome of a bytecode probe
    pub fn with_probe(mut self, bytecode: Option<&[u8]>) -> Self {
        self.deployed = bytecode.is_some_and(|code| !code.is_empty());
        self
    }

    /// Initializer calldata passed to the factory
    pub fn initializer(&self, deployment: &SafeDeployment) -> Result<Bytes> {
        setup_initializer(&self.owners, self.threshold, &deployment.fallback_handler)
    }

    /// Factory calldata that deploys this account
    pub fn deployment_calldata(&self, deployment: &SafeDeployment) -> Result<Bytes> {
        let initializer = self.initializer(deployment)?;
        Ok(create_proxy_calldata(
            &deployment.singleton,
            &initializer,
            self.salt_nonce,
        ))
    }
}
