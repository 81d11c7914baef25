//! Oracle Aggregator - Combines price data from multiple sources
//!
//! Queries every supporting source concurrently and averages the answers
//! with integer (floor) division. [`PriceMemo`] deduplicates requests for
//! the same pair within one evaluation cycle: the first requester creates a
//! shared future, every later requester awaits that same future.

use ethers::types::U256;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::FeedError;
use crate::oracle::sources::PriceSource;
use crate::types::{Pair, PairPrice, CANONICAL_DECIMALS};

/// How failing sources affect a pair's average
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AveragePolicy {
    /// Any failing source aborts the pair's average
    #[default]
    Strict,
    /// Failing sources are dropped while at least `min_answers` succeed
    Quorum { min_answers: usize },
}

/// Fetch `pair` from every supporting source and average the results.
pub async fn average_price(
    sources: &[Arc<dyn PriceSource>],
    pair: &Pair,
    policy: AveragePolicy,
) -> Result<PairPrice, FeedError> {
    let supporting: Vec<&Arc<dyn PriceSource>> =
        sources.iter().filter(|s| s.supports(pair)).collect();

    let results = join_all(supporting.iter().map(|source| source.fetch_price(pair))).await;

    let mut prices = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(price) => prices.push(price.price),
            Err(e) => match policy {
                AveragePolicy::Strict => return Err(e),
                AveragePolicy::Quorum { .. } => {
                    tracing::warn!(pair = %pair, error = %e, "Source dropped from average");
                }
            },
        }
    }

    let required = match policy {
        AveragePolicy::Strict => 1,
        AveragePolicy::Quorum { min_answers } => min_answers.max(1),
    };
    if prices.len() < required {
        return Err(FeedError::AverageComputation {
            pair: pair.clone(),
            responses: prices.len(),
            required,
        });
    }

    let total = prices
        .iter()
        .try_fold(U256::zero(), |acc, price| acc.checked_add(*price))
        .ok_or_else(|| FeedError::ScaleOverflow {
            pair: pair.clone(),
            decimals: CANONICAL_DECIMALS,
        })?;
    let mean = total / U256::from(prices.len());

    tracing::debug!(
        pair = %pair,
        price = %mean,
        sources = prices.len(),
        "Average price computed"
    );

    Ok(PairPrice::new(pair.clone(), mean))
}

pub type SharedPrice = Shared<BoxFuture<'static, Result<PairPrice, FeedError>>>;

/// Per-cycle dedup table from pair identity to its in-flight or completed
/// average.
pub struct PriceMemo {
    sources: Arc<[Arc<dyn PriceSource>]>,
    policy: AveragePolicy,
    entries: Mutex<HashMap<Pair, SharedPrice>>,
}

impl PriceMemo {
    pub fn new(sources: Arc<[Arc<dyn PriceSource>]>, policy: AveragePolicy) -> Self {
        Self {
            sources,
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Shared future resolving to the average for `pair`.
    ///
    /// Check-and-insert happens under one lock, so concurrent callers for the
    /// same pair always receive clones of a single future.
    pub async fn average(&self, pair: &Pair) -> SharedPrice {
        let mut entries = self.entries.lock().await;
        entries
            .entry(pair.clone())
            .or_insert_with(|| {
                let sources = self.sources.clone();
                let policy = self.policy;
                let pair = pair.clone();
                async move { average_price(&sources, &pair, policy).await }
                    .boxed()
                    .shared()
            })
            .clone()
    }

    /// Resolve the average for `pair`, sharing work with other callers.
    pub async fn price(&self, pair: &Pair) -> Result<PairPrice, FeedError> {
        self.average(pair).await.await
    }

    /// Number of distinct pairs requested so far
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
