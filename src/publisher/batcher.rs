//! Batching and submission pipeline
//!
//! Update payloads are collected into batches bounded by size and by a wait
//! window opened by the first payload. Each batch becomes one chain call
//! (a plain call for a single payload, an atomic batch otherwise) and is
//! submitted with a bounded number of attempts.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout_at, Instant};

use crate::chain::{PriceChain, Signer, SubmissionReceipt, TransactionCall};
use crate::error::FeedError;
use crate::types::PriceUpdate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum payloads per submission
    pub max_size: usize,
    /// Maximum time a batch stays open after its first payload
    pub max_wait: Duration,
    /// Submission attempts per batch, including the first
    pub max_attempts: u32,
    /// Delay between attempts
    pub retry_backoff: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_size: 5,
            max_wait: Duration::from_secs(1),
            max_attempts: 3,
            retry_backoff: Duration::ZERO,
        }
    }
}

/// Summary of a cycle's submissions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionSummary {
    pub batches: usize,
    pub updates: usize,
}

/// Wait for the next batch.
///
/// Returns `None` once the channel is closed and drained. A batch is flushed
/// when it reaches `max_size`, when `max_wait` has elapsed since its first
/// payload, or when the channel closes.
pub async fn next_batch(
    rx: &mut mpsc::UnboundedReceiver<PriceUpdate>,
    config: &BatchConfig,
) -> Option<Vec<PriceUpdate>> {
    let first = rx.recv().await?;
    let max_size = config.max_size.max(1);
    let deadline = Instant::now() + config.max_wait;

    let mut batch = Vec::with_capacity(max_size);
    batch.push(first);

    while batch.len() < max_size {
        match timeout_at(deadline, rx.recv()).await {
            Ok(Some(update)) => batch.push(update),
            // Channel closed or window elapsed
            Ok(None) | Err(_) => break,
        }
    }

    Some(batch)
}

/// Turn a batch of payloads into one chain call.
pub fn build_call(chain: &dyn PriceChain, batch: &[PriceUpdate]) -> TransactionCall {
    let calls = batch
        .iter()
        .map(|u| chain.build_set_price_call(&u.pair, u.amount, u.decimals))
        .collect();
    chain.batch_calls(calls)
}

/// Sign and submit `call`, retrying the whole submission on failure.
pub async fn submit_with_retry(
    chain: &dyn PriceChain,
    signer: &Signer,
    call: TransactionCall,
    config: &BatchConfig,
) -> Result<SubmissionReceipt, FeedError> {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match chain.sign_and_submit(call.clone(), signer).await {
            Ok(receipt) => {
                tracing::info!(
                    block_hash = ?receipt.block_hash,
                    tx_hash = ?receipt.tx_hash,
                    prices = call.price_count(),
                    "✅ Transaction finalized"
                );
                return Ok(receipt);
            }
            Err(e) if attempt < max_attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %format!("{:#}", e),
                    "Submission failed, retrying"
                );
                if !config.retry_backoff.is_zero() {
                    sleep(config.retry_backoff).await;
                }
            }
            Err(e) => {
                tracing::error!(
                    attempts = attempt,
                    error = %format!("{:#}", e),
                    "❌ Submission failed, giving up"
                );
                return Err(FeedError::ChainSubmission {
                    attempts: attempt,
                    reason: format!("{:#}", e),
                });
            }
        }
    }
}

/// Drain `rx`, submitting batches sequentially until the channel closes.
///
/// Stops at the first batch that exhausts its attempts.
pub async fn run_submissions(
    chain: &dyn PriceChain,
    signer: &Signer,
    mut rx: mpsc::UnboundedReceiver<PriceUpdate>,
    config: &BatchConfig,
) -> Result<SubmissionSummary, FeedError> {
    let mut summary = SubmissionSummary::default();

    while let Some(batch) = next_batch(&mut rx, config).await {
        tracing::debug!(size = batch.len(), "Submitting batch");
        let call = build_call(chain, &batch);
        submit_with_retry(chain, signer, call, config).await?;
        summary.batches += 1;
        summary.updates += batch.len();
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{InMemoryChain, MockPriceChain};
    use crate::types::Pair;
    use ethers::types::{H256, U256};
    use std::sync::Arc;

    fn update(i: u64) -> PriceUpdate {
        PriceUpdate {
            pair: Pair::new(format!("T{}", i), "USD", 4),
            amount: U256::from(i),
            decimals: 4,
        }
    }

    fn signer() -> Signer {
        Signer::from_uri("//Alice").unwrap()
    }

    #[tokio::test]
    async fn test_seven_updates_make_two_batches() {
        let chain = Arc::new(InMemoryChain::new());
        let (tx, rx) = mpsc::unbounded_channel();
        for i in 0..7 {
            tx.send(update(i)).unwrap();
        }
        drop(tx);

        let summary = run_submissions(chain.as_ref(), &signer(), rx, &BatchConfig::default())
            .await
            .unwrap();

        assert_eq!(summary, SubmissionSummary { batches: 2, updates: 7 });
        let submissions = chain.submissions().await;
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0].price_count(), 5);
        assert_eq!(submissions[1].price_count(), 2);
        assert!(submissions.iter().all(|s| s.is_batch()));
    }

    #[tokio::test]
    async fn test_single_update_is_not_wrapped() {
        let chain = InMemoryChain::new();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(update(1)).unwrap();
        drop(tx);

        run_submissions(&chain, &signer(), rx, &BatchConfig::default())
            .await
            .unwrap();

        assert_eq!(
            chain.submissions().await,
            vec![TransactionCall::SetPrice(update(1))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_window_flushes_partial_batch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = BatchConfig::default();

        tx.send(update(1)).unwrap();
        tx.send(update(2)).unwrap();
        let late = tokio::spawn(async move {
            sleep(Duration::from_secs(5)).await;
            tx.send(update(3)).unwrap();
        });

        let first = next_batch(&mut rx, &config).await.unwrap();
        assert_eq!(first, vec![update(1), update(2)]);

        let second = next_batch(&mut rx, &config).await.unwrap();
        assert_eq!(second, vec![update(3)]);
        late.await.unwrap();
        assert!(next_batch(&mut rx, &config).await.is_none());
    }

    #[tokio::test]
    async fn test_retry_exhaustion_tries_three_times() {
        let mut chain = MockPriceChain::new();
        chain
            .expect_build_set_price_call()
            .returning(|pair, amount, decimals| {
                TransactionCall::SetPrice(PriceUpdate {
                    pair: pair.clone(),
                    amount,
                    decimals,
                })
            });
        chain
            .expect_batch_calls()
            .returning(|mut calls| calls.remove(0));
        chain
            .expect_sign_and_submit()
            .times(3)
            .returning(|_, _| Err(anyhow::anyhow!("finalization timed out")));

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(update(1)).unwrap();
        drop(tx);

        let err = run_submissions(&chain, &signer(), rx, &BatchConfig::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            FeedError::ChainSubmission {
                attempts: 3,
                reason: "finalization timed out".to_string(),
            }
        );
        assert!(err.is_cycle_fatal());
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failure() {
        let chain = InMemoryChain::new();
        chain.fail_next(2).await;

        let receipt = submit_with_retry(
            &chain,
            &signer(),
            TransactionCall::SetPrice(update(1)),
            &BatchConfig::default(),
        )
        .await
        .unwrap();

        assert_ne!(receipt.tx_hash, H256::zero());
        assert_eq!(chain.submissions().await.len(), 1);
    }
}
