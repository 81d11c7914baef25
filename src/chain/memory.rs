//! In-memory chain for dry runs
//!
//! Keeps stored prices in a map, produces one block per submission and
//! applies batches atomically. Optionally fails the next N submissions.

use anyhow::{bail, Result};
use async_trait::async_trait;
use ethers::types::H256;
use ethers::utils::keccak256;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{PriceChain, Signer, SubmissionReceipt, TransactionCall};
use crate::types::{Pair, StoredPrice};

#[derive(Default)]
struct ChainState {
    prices: HashMap<Pair, StoredPrice>,
    block_number: u64,
    submissions: Vec<TransactionCall>,
    failures_left: u32,
}

#[derive(Default)]
pub struct InMemoryChain {
    state: Mutex<ChainState>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored price
    pub fn with_price(mut self, pair: Pair, price: StoredPrice) -> Self {
        self.state.get_mut().prices.insert(pair, price);
        self
    }

    /// Reject the next `count` submissions
    pub async fn fail_next(&self, count: u32) {
        self.state.lock().await.failures_left = count;
    }

    pub async fn stored(&self, pair: &Pair) -> Option<StoredPrice> {
        self.state.lock().await.prices.get(pair).copied()
    }

    /// Every successfully finalized call, in order
    pub async fn submissions(&self) -> Vec<TransactionCall> {
        self.state.lock().await.submissions.clone()
    }

    pub async fn block_number(&self) -> u64 {
        self.state.lock().await.block_number
    }
}

fn apply(call: &TransactionCall, block_number: u64, prices: &mut HashMap<Pair, StoredPrice>) {
    match call {
        TransactionCall::SetPrice(update) => {
            prices.insert(
                update.pair.clone(),
                StoredPrice {
                    amount: update.amount,
                    decimals: update.decimals,
                    block_number,
                },
            );
        }
        TransactionCall::BatchAll(calls) => {
            for call in calls {
                apply(call, block_number, prices);
            }
        }
    }
}

#[async_trait]
impl PriceChain for InMemoryChain {
    async fn read_stored_price(&self, pair: &Pair) -> Result<Option<StoredPrice>> {
        Ok(self.state.lock().await.prices.get(pair).copied())
    }

    async fn sign_and_submit(
        &self,
        call: TransactionCall,
        signer: &Signer,
    ) -> Result<SubmissionReceipt> {
        let mut state = self.state.lock().await;
        if state.failures_left > 0 {
            state.failures_left -= 1;
            bail!("Transaction rejected by dry-run chain");
        }

        state.block_number += 1;
        let block_number = state.block_number;

        apply(&call, block_number, &mut state.prices);

        let tx_hash = H256::from(keccak256(
            format!("{}:{}:{:?}", signer.uri(), block_number, call).as_bytes(),
        ));
        let block_hash = H256::from(keccak256(block_number.to_be_bytes()));
        state.submissions.push(call);

        Ok(SubmissionReceipt {
            block_hash,
            tx_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PriceUpdate;
    use ethers::types::U256;
    use tokio_test::{assert_err, assert_ok};

    fn set(pair: &Pair, amount: u64) -> TransactionCall {
        TransactionCall::SetPrice(PriceUpdate {
            pair: pair.clone(),
            amount: U256::from(amount),
            decimals: 4,
        })
    }

    #[tokio::test]
    async fn submission_stores_prices_at_new_block() {
        let chain = InMemoryChain::new();
        let signer = Signer::from_uri("//Alice").unwrap();
        let a = Pair::new("A", "USD", 4);
        let b = Pair::new("B", "USD", 4);

        chain
            .sign_and_submit(TransactionCall::BatchAll(vec![set(&a, 1), set(&b, 2)]), &signer)
            .await
            .unwrap();

        assert_eq!(chain.block_number().await, 1);
        let stored = chain.read_stored_price(&b).await.unwrap().unwrap();
        assert_eq!(stored.amount, U256::from(2u64));
        assert_eq!(stored.block_number, 1);
        assert_eq!(chain.submissions().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_submission_changes_nothing() {
        let chain = InMemoryChain::new();
        let signer = Signer::from_uri("//Alice").unwrap();
        let a = Pair::new("A", "USD", 4);
        chain.fail_next(1).await;

        assert_err!(chain.sign_and_submit(set(&a, 1), &signer).await);
        assert!(chain.stored(&a).await.is_none());
        assert_ok!(chain.sign_and_submit(set(&a, 1), &signer).await);
        assert_eq!(chain.stored(&a).await.map(|p| p.block_number), Some(1));
    }
}
