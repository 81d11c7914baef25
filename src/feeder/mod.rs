//! Feeder - one evaluation cycle over the configured pair set
//!
//! A cycle fetches every raw pair once, derives dependent pairs as their
//! inputs arrive, checks each candidate against chain state and submits the
//! resulting writes in batches. All per-cycle state (memo table, price board,
//! channels) is created when the cycle starts and dropped with it; dropping
//! the cycle future aborts every task it spawned.

pub mod scheduler;

pub use scheduler::{OverlapPolicy, ScheduleConfig, Scheduler};

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::chain::{PriceChain, Signer};
use crate::error::FeedError;
use crate::oracle::resolver::{resolve, validate_sources};
use crate::oracle::{AveragePolicy, PriceBoard, PriceMemo, PriceSource, PublishablePairSource};
use crate::publisher::{evaluate, run_submissions, BatchConfig};
use crate::types::{Pair, PriceUpdate, PublishConfig, PublishablePair, PublishablePairPrice};

/// One publishable entry of the pair set
#[derive(Debug, Clone)]
pub enum FeedEntry {
    /// Fetched from the price sources and published as is
    Direct(PublishablePair),
    /// Computed from other pairs
    Derived(PublishablePairSource),
}

impl FeedEntry {
    pub fn target(&self) -> &PublishablePair {
        match self {
            FeedEntry::Direct(pair) => pair,
            FeedEntry::Derived(source) => &source.target,
        }
    }
}

/// Pair set of the legacy deployment: `DOCK/USD` and the gas price in DOCK
/// per million gas units.
pub fn default_entries() -> Vec<FeedEntry> {
    let dock_usd = Pair::new("DOCK", "USD", 4);
    let eth_usd = Pair::new("ETH", "USD", 4);

    vec![
        FeedEntry::Direct(PublishablePair::new(
            dock_usd.clone(),
            PublishConfig::new(4, 100u64),
        )),
        FeedEntry::Derived(PublishablePairSource::quotient(
            PublishablePair::new(Pair::new("GAS", "DOCK", 3), PublishConfig::new(3, 1_000u64)),
            vec![eth_usd, Pair::eth_gas(18)],
            vec![dock_usd],
            1_000_000u64,
        )),
    ]
}

/// Validated pair set with its derived fetch plan
#[derive(Debug, Clone)]
pub struct FeedPlan {
    entries: Vec<FeedEntry>,
    raw_pairs: Vec<Pair>,
    derived_targets: Vec<Pair>,
}

impl FeedPlan {
    /// Validate `entries` and compute the raw pairs every cycle fetches.
    pub fn new(entries: Vec<FeedEntry>) -> Result<Self, FeedError> {
        let derived: Vec<PublishablePairSource> = entries
            .iter()
            .filter_map(|e| match e {
                FeedEntry::Derived(source) => Some(source.clone()),
                FeedEntry::Direct(_) => None,
            })
            .collect();
        validate_sources(&derived)?;

        let mut seen = HashSet::new();
        for entry in &entries {
            let pair = &entry.target().pair;
            if !seen.insert(pair.clone()) {
                return Err(FeedError::Configuration(format!(
                    "pair {} is configured more than once",
                    pair.id()
                )));
            }
        }

        let derived_targets: Vec<Pair> = derived.iter().map(|s| s.target.pair.clone()).collect();
        let targets: HashSet<&Pair> = derived_targets.iter().collect();

        let raw_pairs: BTreeSet<Pair> = entries
            .iter()
            .filter_map(|e| match e {
                FeedEntry::Direct(pair) => Some(pair.pair.clone()),
                FeedEntry::Derived(_) => None,
            })
            .chain(
                derived
                    .iter()
                    .flat_map(|s| s.deps())
                    .filter(|dep| !targets.contains(dep)),
            )
            .collect();

        Ok(Self {
            entries,
            raw_pairs: raw_pairs.into_iter().collect(),
            derived_targets,
        })
    }

    pub fn entries(&self) -> &[FeedEntry] {
        &self.entries
    }

    /// Unique pairs fetched from the sources each cycle
    pub fn raw_pairs(&self) -> &[Pair] {
        &self.raw_pairs
    }

    /// Every pair published on the cycle's price board
    fn producers(&self) -> impl Iterator<Item = Pair> + '_ {
        self.raw_pairs.iter().chain(&self.derived_targets).cloned()
    }
}

/// Outcome of one cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Raw pairs averaged successfully
    pub fetched: usize,
    /// Raw pairs or candidates dropped on error
    pub failed: usize,
    /// Candidates checked against chain state
    pub candidates: usize,
    /// Writes submitted
    pub updates: usize,
    pub batches: usize,
}

#[derive(Default)]
struct CycleCounters {
    fetched: AtomicUsize,
    failed: AtomicUsize,
    candidates: AtomicUsize,
}

impl CycleCounters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Runs evaluation cycles over a fixed plan
pub struct Feeder {
    sources: Arc<[Arc<dyn PriceSource>]>,
    chain: Arc<dyn PriceChain>,
    signer: Signer,
    plan: FeedPlan,
    policy: AveragePolicy,
    batch: BatchConfig,
}

impl Feeder {
    pub fn new(
        sources: Vec<Arc<dyn PriceSource>>,
        chain: Arc<dyn PriceChain>,
        signer: Signer,
        plan: FeedPlan,
        policy: AveragePolicy,
        batch: BatchConfig,
    ) -> Self {
        Self {
            sources: sources.into(),
            chain,
            signer,
            plan,
            policy,
            batch,
        }
    }

    pub fn plan(&self) -> &FeedPlan {
        &self.plan
    }

    /// Run one full cycle: fetch, derive, decide and submit.
    ///
    /// Per-pair failures are logged and counted. A submission that exhausts
    /// its attempts ends the cycle with the error.
    pub async fn run_cycle(&self) -> Result<CycleReport, FeedError> {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            cycle = %id,
            raw_pairs = self.plan.raw_pairs.len(),
            entries = self.plan.entries.len(),
            "🔄 Cycle started"
        );

        let memo = Arc::new(PriceMemo::new(self.sources.clone(), self.policy));
        let board = Arc::new(PriceBoard::new(self.plan.producers()));
        let counters = Arc::new(CycleCounters::default());
        let (candidate_tx, candidate_rx) = mpsc::unbounded_channel::<PublishablePairPrice>();
        let (update_tx, update_rx) = mpsc::unbounded_channel::<PriceUpdate>();

        // Subscribe every derivation before anything is published so each
        // one sees every update of its dependencies
        let mut derivations = Vec::new();
        for entry in &self.plan.entries {
            if let FeedEntry::Derived(source) = entry {
                let updates = board.subscribe(&source.deps()).await;
                derivations.push((Arc::new(source.clone()), updates));
            }
        }

        let mut tasks = JoinSet::new();

        // Raw pairs feed the board for derivations
        for pair in self.plan.raw_pairs.iter().cloned() {
            let memo = memo.clone();
            let board = board.clone();
            let counters = counters.clone();
            tasks.spawn(async move {
                match memo.price(&pair).await {
                    Ok(price) => {
                        CycleCounters::bump(&counters.fetched);
                        board.publish(price).await;
                    }
                    Err(e) => {
                        CycleCounters::bump(&counters.failed);
                        tracing::warn!(pair = %pair, error = %e, "⚠️ Price unavailable this cycle");
                    }
                }
                board.finish(&pair).await;
            });
        }

        for entry in &self.plan.entries {
            if let FeedEntry::Direct(target) = entry {
                let memo = memo.clone();
                let target = target.clone();
                let tx = candidate_tx.clone();
                tasks.spawn(async move {
                    // Failure already reported by the raw pair task
                    if let Ok(price) = memo.price(&target.pair).await {
                        let _ = tx.send(PublishablePairPrice::new(target, price.price));
                    }
                });
            }
        }

        for (source, updates) in derivations {
            let board = board.clone();
            let tx = candidate_tx.clone();
            tasks.spawn(async move {
                resolve(source, board, updates, tx).await;
            });
        }
        drop(candidate_tx);

        tasks.spawn(decide_all(
            self.chain.clone(),
            candidate_rx,
            update_tx,
            counters.clone(),
        ));

        let summary =
            run_submissions(self.chain.as_ref(), &self.signer, update_rx, &self.batch).await?;

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(cycle = %id, error = %e, "Cycle task panicked");
            }
        }

        let report = CycleReport {
            id,
            started_at,
            finished_at: Utc::now(),
            fetched: counters.fetched.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            candidates: counters.candidates.load(Ordering::Relaxed),
            updates: summary.updates,
            batches: summary.batches,
        };

        tracing::info!(
            cycle = %id,
            fetched = report.fetched,
            failed = report.failed,
            candidates = report.candidates,
            updates = report.updates,
            batches = report.batches,
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "🏁 Cycle finished"
        );

        Ok(report)
    }
}

/// Evaluate candidates concurrently as they arrive, forwarding writes.
async fn decide_all(
    chain: Arc<dyn PriceChain>,
    mut candidates: mpsc::UnboundedReceiver<PublishablePairPrice>,
    updates: mpsc::UnboundedSender<PriceUpdate>,
    counters: Arc<CycleCounters>,
) {
    let mut evaluations = JoinSet::new();

    loop {
        tokio::select! {
            candidate = candidates.recv() => {
                let Some(candidate) = candidate else { break };
                CycleCounters::bump(&counters.candidates);

                let chain = chain.clone();
                let updates = updates.clone();
                let counters = counters.clone();
                evaluations.spawn(async move {
                    match evaluate(chain.as_ref(), &candidate).await {
                        Ok(Some(update)) => {
                            let _ = updates.send(update);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            CycleCounters::bump(&counters.failed);
                            tracing::warn!(pair = %candidate.pair, error = %e, "⚠️ Update check failed");
                        }
                    }
                });
            }
            Some(joined) = evaluations.join_next() => {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Update check panicked");
                }
            }
        }
    }

    while let Some(joined) = evaluations.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Update check panicked");
        }
    }
}
