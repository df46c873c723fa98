//! In-memory chain client for tests.

use crate::chain::*;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

/// Placeholder runtime code written for deployed wallets
pub const MOCK_WALLET_CODE: [u8; 4] = [0x60, 0x80, 0x60, 0x40];

#[derive(Default)]
struct ChainState {
    code: HashMap<Address, Bytes>,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, U256>,
    submissions: Vec<Submission>,
    fail_next: Option<ChainError>,
}

/// Chain that deploys and executes by bookkeeping
///
/// A deployment submission, or an execution carrying a deployment, puts
/// code at the wallet address. Each execution bumps the wallet's Safe
/// nonce.
#[derive(Default)]
pub struct MockChain {
    state: Mutex<ChainState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put code at `address` as if it were deployed
    pub fn deploy(&self, address: Address) {
        self.state()
            .code
            .insert(address, Bytes::from_static(&MOCK_WALLET_CODE));
    }

    pub fn fund(&self, address: Address, amount: U256) {
        self.state().balances.insert(address, amount);
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Make the next submission fail with `error`
    pub fn fail_next_submission(&self, error: ChainError) {
        self.state().fail_next = Some(error);
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_bytecode(&self, address: Address) -> Result<Option<Bytes>, ChainError> {
        Ok(self.state().code.get(&address).cloned())
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        Ok(self
            .state()
            .balances
            .get(&address)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn get_nonce(&self, address: Address) -> Result<U256, ChainError> {
        let state = self.state();
        if !state.code.contains_key(&address) {
            return Err(ChainError::Reverted(format!("no contract at {}", address)));
        }
        Ok(state.nonces.get(&address).copied().unwrap_or(U256::ZERO))
    }

    async fn submit_transaction(&self, submission: &Submission) -> Result<B256, ChainError> {
        let mut state = self.state();
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }

        let deploys = submission.kind == SubmissionKind::Deployment
            || submission.deployment.is_some();
        if deploys {
            state
                .code
                .insert(submission.wallet, Bytes::from_static(&MOCK_WALLET_CODE));
        }

        if submission.kind == SubmissionKind::Execution {
            if !state.code.contains_key(&submission.wallet) {
                return Err(ChainError::Reverted("wallet not deployed".to_string()));
            }
            let nonce = state.nonces.entry(submission.wallet).or_insert(U256::ZERO);
            *nonce += U256::from(1u64);
        }

        let index = state.submissions.len() as u64;
        let mut preimage = submission.data.to_vec();
        preimage.extend_from_slice(&index.to_be_bytes());
        state.submissions.push(submission.clone());

        Ok(keccak256(preimage))
    }
}
