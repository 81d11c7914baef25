//! Dependency resolver for derived publishable pairs
//!
//! A [`PublishablePairSource`] is a publishable pair whose value is a pure
//! function of other pairs' prices. The resolver waits until every dependency
//! has a value this cycle, derives, and derives again whenever any dependency
//! updates (combine-latest), always using the newest value of each.

use ethers::types::U256;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::FeedError;
use crate::oracle::board::PriceBoard;
use crate::types::{canonical_one, Pair, PairPrice, PublishablePair, PublishablePairPrice};

/// Custom derivation over the latest canonical price of each dependency, in
/// dependency order. `None` means no output for this snapshot.
pub type DeriveFn = Arc<dyn Fn(&[U256]) -> Option<U256> + Send + Sync>;

#[derive(Clone)]
pub enum Derivation {
    /// `multiplier * Π numerators / Π denominators`
    Quotient {
        numerators: Vec<Pair>,
        denominators: Vec<Pair>,
        multiplier: U256,
    },
    Custom { deps: Vec<Pair>, derive: DeriveFn },
}

impl Derivation {
    pub fn custom<F>(deps: Vec<Pair>, derive: F) -> Self
    where
        F: Fn(&[U256]) -> Option<U256> + Send + Sync + 'static,
    {
        Derivation::Custom {
            deps,
            derive: Arc::new(derive),
        }
    }

    /// Dependencies in the order derive receives them
    pub fn deps(&self) -> Vec<Pair> {
        match self {
            Derivation::Quotient {
                numerators,
                denominators,
                ..
            } => numerators.iter().chain(denominators).cloned().collect(),
            Derivation::Custom { deps, .. } => deps.clone(),
        }
    }

    fn apply(&self, latest: &[U256]) -> Option<U256> {
        match self {
            Derivation::Quotient {
                numerators,
                multiplier,
                ..
            } => {
                let one = canonical_one();
                let (nums, dens) = latest.split_at(numerators.len());
                let mut acc = one.checked_mul(*multiplier)?;
                for n in nums {
                    acc = acc.checked_mul(*n)? / one;
                }
                for d in dens {
                    if d.is_zero() {
                        return None;
                    }
                    acc = acc.checked_mul(one)? / *d;
                }
                Some(acc)
            }
            Derivation::Custom { derive, .. } => derive(latest),
        }
    }
}

impl fmt::Debug for Derivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Derivation::Quotient {
                numerators,
                denominators,
                multiplier,
            } => f
                .debug_struct("Quotient")
                .field("numerators", numerators)
                .field("denominators", denominators)
                .field("multiplier", multiplier)
                .finish(),
            Derivation::Custom { deps, .. } => {
                f.debug_struct("Custom").field("deps", deps).finish_non_exhaustive()
            }
        }
    }
}

/// A publishable pair computed from other pairs
#[derive(Debug, Clone)]
pub struct PublishablePairSource {
    pub target: PublishablePair,
    pub derivation: Derivation,
}

impl PublishablePairSource {
    pub fn new(target: PublishablePair, derivation: Derivation) -> Self {
        Self { target, derivation }
    }

    /// `target = multiplier * Π numerators / Π denominators`
    pub fn quotient(
        target: PublishablePair,
        numerators: Vec<Pair>,
        denominators: Vec<Pair>,
        multiplier: impl Into<U256>,
    ) -> Self {
        Self::new(
            target,
            Derivation::Quotient {
                numerators,
                denominators,
                multiplier: multiplier.into(),
            },
        )
    }

    pub fn deps(&self) -> Vec<Pair> {
        self.derivation.deps()
    }

    /// Derive the target price from the latest price of each dependency.
    pub fn derive(&self, latest: &[U256]) -> Option<PublishablePairPrice> {
        if latest.len() != self.deps().len() {
            return None;
        }
        self.derivation
            .apply(latest)
            .map(|price| PublishablePairPrice::new(self.target.clone(), price))
    }
}

/// Run one derived pair for the cycle.
///
/// `updates` must be a board subscription to the source's dependencies taken
/// before any of them is published, otherwise intermediate values are lost to
/// the latest-only replay. Every derived value is sent to `out` and published
/// on the board under the target pair so other derivations can depend on it.
/// Returns the number of derivations emitted; zero when some dependency never
/// produced a value.
pub async fn resolve(
    source: Arc<PublishablePairSource>,
    board: Arc<PriceBoard>,
    mut updates: mpsc::UnboundedReceiver<PairPrice>,
    out: mpsc::UnboundedSender<PublishablePairPrice>,
) -> usize {
    let deps = source.deps();
    let target = source.target.pair.clone();
    let mut latest: HashMap<Pair, U256> = HashMap::new();
    let mut emitted = 0;

    while let Some(update) = updates.recv().await {
        latest.insert(update.pair, update.price);

        let snapshot: Option<Vec<U256>> = deps.iter().map(|d| latest.get(d).copied()).collect();
        let Some(snapshot) = snapshot else {
            continue;
        };

        match source.derive(&snapshot) {
            Some(derived) => {
                tracing::debug!(pair = %target, price = %derived.price, "Derived price");
                board
                    .publish(PairPrice::new(target.clone(), derived.price))
                    .await;
                emitted += 1;
                if out.send(derived).is_err() {
                    break;
                }
            }
            None => tracing::warn!(
                pair = %target,
                inputs = ?snapshot,
                "Derivation produced no value (zero denominator or overflow)"
            ),
        }
    }

    if emitted == 0 {
        let missing: Vec<String> = deps
            .iter()
            .filter(|d| !latest.contains_key(*d))
            .map(|d| d.to_string())
            .collect();
        tracing::warn!(pair = %target, missing = ?missing, "No derived price this cycle");
    }

    board.finish(&target).await;
    emitted
}

/// Reject derivation graphs with duplicate targets or cycles.
pub fn validate_sources(sources: &[PublishablePairSource]) -> Result<(), FeedError> {
    let mut graph: HashMap<Pair, Vec<Pair>> = HashMap::new();
    for source in sources {
        let deps = source.deps();
        if deps.is_empty() {
            return Err(FeedError::Configuration(format!(
                "derived pair {} has no dependencies",
                source.target.pair.id()
            )));
        }
        if graph.insert(source.target.pair.clone(), deps).is_some() {
            return Err(FeedError::Configuration(format!(
                "derived pair {} is defined more than once",
                source.target.pair.id()
            )));
        }
    }

    fn visit(
        pair: &Pair,
        graph: &HashMap<Pair, Vec<Pair>>,
        visiting: &mut HashSet<Pair>,
        done: &mut HashSet<Pair>,
    ) -> Result<(), FeedError> {
        if done.contains(pair) {
            return Ok(());
        }
        if !visiting.insert(pair.clone()) {
            return Err(FeedError::Configuration(format!(
                "derived pair {} depends on itself",
                pair.id()
            )));
        }
        for dep in graph.get(pair).into_iter().flatten() {
            visit(dep, graph, visiting, done)?;
        }
        visiting.remove(pair);
        done.insert(pair.clone());
        Ok(())
    }

    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    for target in graph.keys() {
        visit(target, &graph, &mut visiting, &mut done)?;
    }
    Ok(())
}
