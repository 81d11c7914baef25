//! Chain client interface
//!
//! The feeder consumes the blockchain only through [`PriceChain`]: reading
//! the stored price of a pair and signing/submitting price-setting calls.
//! SDK bindings live outside this crate; [`memory::InMemoryChain`] is the
//! dry-run implementation used by the binary and tests.

pub mod memory;

pub use memory::InMemoryChain;

use anyhow::{bail, Result};
use async_trait::async_trait;
use ethers::types::{H256, U256};
use std::fmt;

use crate::types::{Pair, PriceUpdate, StoredPrice};

/// Transaction call understood by the chain's price module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionCall {
    /// Set the price of one pair
    SetPrice(PriceUpdate),
    /// Atomic multi-call: every inner call applies or none does
    BatchAll(Vec<TransactionCall>),
}

impl TransactionCall {
    /// Number of price writes carried by the call
    pub fn price_count(&self) -> usize {
        match self {
            TransactionCall::SetPrice(_) => 1,
            TransactionCall::BatchAll(calls) => calls.iter().map(|c| c.price_count()).sum(),
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, TransactionCall::BatchAll(_))
    }
}

/// Identity that signs every submission
#[derive(Clone, PartialEq, Eq)]
pub struct Signer {
    uri: String,
}

impl Signer {
    /// Build from a secret URI (e.g. `//Alice` or a mnemonic)
    pub fn from_uri(uri: impl Into<String>) -> Result<Self> {
        let uri = uri.into();
        if uri.trim().is_empty() {
            bail!("Signer URI is empty");
        }
        Ok(Self { uri })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("uri", &"<redacted>").finish()
    }
}

/// Finalization data of a submitted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub block_hash: H256,
    pub tx_hash: H256,
}

/// Operations the feeder needs from the chain
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceChain: Send + Sync {
    /// Price currently stored for `pair`, `None` if never published
    async fn read_stored_price(&self, pair: &Pair) -> Result<Option<StoredPrice>>;

    fn build_set_price_call(&self, pair: &Pair, amount: U256, decimals: u8) -> TransactionCall {
        TransactionCall::SetPrice(PriceUpdate {
            pair: pair.clone(),
            amount,
            decimals,
        })
    }

    /// Wrap calls into one atomic call; a single call is returned unchanged.
    fn batch_calls(&self, mut calls: Vec<TransactionCall>) -> TransactionCall {
        if calls.len() == 1 {
            calls.remove(0)
        } else {
            TransactionCall::BatchAll(calls)
        }
    }

    /// Sign, broadcast and wait for finalization.
    async fn sign_and_submit(
        &self,
        call: TransactionCall,
        signer: &Signer,
    ) -> Result<SubmissionReceipt>;
}
