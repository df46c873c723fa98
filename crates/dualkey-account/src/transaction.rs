//! Safe transactions and their EIP-712 hash.

use crate::contracts::{ISafe, SafeTx};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{eip712_domain, Eip712Domain, SolCall, SolStruct};
use serde::{Deserialize, Serialize};

/// Safe call type
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[default]
    Call = 0,
    DelegateCall = 1,
}

/// A transaction executed through a Safe
///
/// Gas refund parameters are zero: the relayer or sponsor pays gas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    /// Safe nonce at signing time
    pub nonce: U256,
}

impl SafeTransaction {
    /// Plain call with zeroed gas parameters
    pub fn call(to: Address, value: U256, data: Bytes, nonce: U256) -> Self {
        Self {
            to,
            value,
            data,
            operation: Operation::Call,
            nonce,
        }
    }

    /// Safe v1.3.0 domain: `EIP712Domain(uint256 chainId,address verifyingContract)`
    pub fn domain(chain_id: u64, safe: &Address) -> Eip712Domain {
        eip712_domain! {
            chain_id: chain_id,
            verifying_contract: *safe,
        }
    }

    pub fn domain_separator(chain_id: u64, safe: &Address) -> B256 {
        Self::domain(chain_id, safe).separator()
    }

    /// hashStruct(SafeTx)
    pub fn struct_hash(&self) -> B256 {
        self.typed().eip712_hash_struct()
    }

    /// The hash each owner signs: keccak256(0x19 0x01 ++ domain ++ struct)
    pub fn safe_tx_hash(&self, chain_id: u64, safe: &Address) -> B256 {
        self.typed().eip712_signing_hash(&Self::domain(chain_id, safe))
    }

    /// Calldata for `execTransaction` carrying packed owner signatures
    pub fn exec_transaction_calldata(&self, signatures: &[u8]) -> Bytes {
        ISafe::execTransactionCall {
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            operation: self.operation as u8,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            signatures: Bytes::copy_from_slice(signatures),
        }
        .abi_encode()
        .into()
    }

    fn typed(&self) -> SafeTx {
        SafeTx {
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            operation: self.operation as u8,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            nonce: self.nonce,
        }
    }
}
