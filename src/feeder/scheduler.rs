//! Interval scheduler
//!
//! Fires a cycle immediately and then every `interval`. When a tick arrives
//! while a cycle is still running, [`OverlapPolicy`] decides whether the old
//! cycle is aborted and replaced or the tick is dropped.

use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, MissedTickBehavior};

use super::{CycleReport, Feeder};
use crate::error::FeedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Abort the running cycle and start a new one
    Supersede,
    /// Keep the running cycle and drop the tick
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub overlap: OverlapPolicy,
    /// Return the error of a cycle whose submission failed
    pub halt_on_submission_failure: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            overlap: OverlapPolicy::Supersede,
            halt_on_submission_failure: true,
        }
    }
}

type CycleResult = Result<CycleReport, FeedError>;
type CycleHandle = JoinHandle<CycleResult>;

/// Await the running cycle, or pend forever when there is none.
async fn wait_cycle(running: &mut Option<CycleHandle>) -> Result<CycleResult, JoinError> {
    match running.as_mut() {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

pub struct Scheduler {
    feeder: Arc<Feeder>,
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(feeder: Arc<Feeder>, config: ScheduleConfig) -> Self {
        Self { feeder, config }
    }

    /// Run until the process is interrupted.
    pub async fn run(self) -> Result<(), FeedError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run cycles until `shutdown` resolves or a fatal cycle error occurs.
    /// A zero interval is rejected with a configuration error.
    pub async fn run_until<S>(self, shutdown: S) -> Result<(), FeedError>
    where
        S: Future<Output = ()>,
    {
        if self.config.interval.is_zero() {
            return Err(FeedError::Configuration(
                "schedule interval must be greater than zero".to_string(),
            ));
        }
        tokio::pin!(shutdown);

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut running: Option<CycleHandle> = None;

        tracing::info!(
            interval_ms = self.config.interval.as_millis() as u64,
            overlap = ?self.config.overlap,
            "⏱️ Scheduler started"
        );

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown requested");
                    break Ok(());
                }

                _ = ticker.tick() => {
                    if let Some(handle) = running.as_ref() {
                        match self.config.overlap {
                            OverlapPolicy::Skip => {
                                tracing::warn!("Previous cycle still running, tick skipped");
                                continue;
                            }
                            OverlapPolicy::Supersede => {
                                tracing::warn!("Previous cycle still running, superseding it");
                                handle.abort();
                            }
                        }
                    }
                    let feeder = self.feeder.clone();
                    running = Some(tokio::spawn(async move { feeder.run_cycle().await }));
                }

                joined = wait_cycle(&mut running) => {
                    running = None;
                    match joined {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) if e.is_cycle_fatal() && self.config.halt_on_submission_failure => {
                            tracing::error!(error = %e, "❌ Cycle failed, stopping");
                            break Err(e);
                        }
                        Ok(Err(e)) => {
                            tracing::error!(error = %e, "❌ Cycle failed, waiting for next tick");
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => {
                            tracing::error!(error = %e, "Cycle task panicked");
                        }
                    }
                }
            }
        };

        if let Some(handle) = running.take() {
            handle.abort();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{InMemoryChain, Signer};
    use crate::feeder::{FeedEntry, FeedPlan};
    use crate::oracle::testing::FakeSource;
    use crate::oracle::AveragePolicy;
    use crate::publisher::BatchConfig;
    use crate::types::{canonical_one, Pair, PublishConfig, PublishablePair};
    use std::sync::atomic::Ordering;

    fn single_pair_feeder(source: FakeSource, chain: Arc<InMemoryChain>) -> Arc<Feeder> {
        let plan = FeedPlan::new(vec![FeedEntry::Direct(PublishablePair::new(
            Pair::new("A", "B", 4),
            PublishConfig::new(4, 1u64),
        ))])
        .unwrap();
        Arc::new(Feeder::new(
            vec![source.into_arc()],
            chain,
            Signer::from_uri("//Alice").unwrap(),
            plan,
            AveragePolicy::Strict,
            BatchConfig::default(),
        ))
    }

    fn config(overlap: OverlapPolicy) -> ScheduleConfig {
        ScheduleConfig {
            interval: Duration::from_secs(60),
            overlap,
            halt_on_submission_failure: true,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_supersede_aborts_running_cycle() {
        let source = FakeSource::new("slow").hanging();
        let calls = source.calls();
        let dropped = source.dropped();
        let feeder = single_pair_feeder(source, Arc::new(InMemoryChain::new()));

        // Ticks at 0s, 60s, 120s
        Scheduler::new(feeder, config(OverlapPolicy::Supersede))
            .run_until(tokio::time::sleep(Duration::from_secs(150)))
            .await
            .unwrap();
        // Let aborted tasks unwind
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two superseded plus the one aborted on shutdown
        assert_eq!(dropped.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_keeps_running_cycle() {
        let source = FakeSource::new("slow").hanging();
        let calls = source.calls();
        let feeder = single_pair_feeder(source, Arc::new(InMemoryChain::new()));

        Scheduler::new(feeder, config(OverlapPolicy::Skip))
            .run_until(tokio::time::sleep(Duration::from_secs(150)))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_run_every_interval() {
        let pair = Pair::new("A", "B", 4);
        let source = FakeSource::new("fast").with_price(pair.clone(), canonical_one());
        let calls = source.calls();
        let chain = Arc::new(InMemoryChain::new());
        let feeder = single_pair_feeder(source, chain.clone());

        Scheduler::new(feeder, config(OverlapPolicy::Supersede))
            .run_until(tokio::time::sleep(Duration::from_secs(150)))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Only the first cycle writes; the price never changes afterwards
        assert_eq!(chain.submissions().await.len(), 1);
        assert_eq!(
            chain.stored(&pair).await.map(|p| p.amount),
            Some(ethers::types::U256::from(10_000u64))
        );
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let source = FakeSource::new("fast");
        let calls = source.calls();
        let feeder = single_pair_feeder(source, Arc::new(InMemoryChain::new()));

        let mut config = config(OverlapPolicy::Supersede);
        config.interval = Duration::ZERO;
        let err = Scheduler::new(feeder, config)
            .run_until(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, FeedError::Configuration(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_halts_scheduler() {
        let pair = Pair::new("A", "B", 4);
        let source = FakeSource::new("fast").with_price(pair, canonical_one());
        let chain = Arc::new(InMemoryChain::new());
        chain.fail_next(3).await;
        let feeder = single_pair_feeder(source, chain);

        let err = Scheduler::new(feeder, config(OverlapPolicy::Supersede))
            .run_until(std::future::pending())
            .await
            .unwrap_err();

        assert!(matches!(err, FeedError::ChainSubmission { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_failure_can_be_tolerated() {
        let pair = Pair::new("A", "B", 4);
        let source = FakeSource::new("fast").with_price(pair.clone(), canonical_one());
        let chain = Arc::new(InMemoryChain::new());
        chain.fail_next(3).await;
        let feeder = single_pair_feeder(source, chain.clone());

        let mut config = config(OverlapPolicy::Supersede);
        config.halt_on_submission_failure = false;
        Scheduler::new(feeder, config)
            .run_until(tokio::time::sleep(Duration::from_secs(90)))
            .await
            .unwrap();

        // The second cycle succeeds
        assert!(chain.stored(&pair).await.is_some());
    }
}
