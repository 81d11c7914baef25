//! Oracle module - Multi-source price aggregation
//!
//! Fetches prices from the configured sources, averages them per pair and
//! derives publishable prices from other computed prices.

pub mod aggregator;
pub mod board;
pub mod resolver;
pub mod sources;

pub use aggregator::{average_price, AveragePolicy, PriceMemo};
pub use board::PriceBoard;
pub use resolver::{Derivation, PublishablePairSource};
pub use sources::{PriceSource, ReqwestTransport};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use ethers::types::U256;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::sources::PriceSource;
    use crate::error::FeedError;
    use crate::types::{Pair, PairPrice};

    /// In-process source with fixed prices and call accounting
    pub struct FakeSource {
        name: &'static str,
        prices: HashMap<Pair, U256>,
        gas_only: bool,
        hang: bool,
        calls: Arc<AtomicUsize>,
        dropped: Arc<AtomicUsize>,
    }

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl FakeSource {
        pub fn new(name: &'static str) -> Self {
            Self {
                name,
                prices: HashMap::new(),
                gas_only: false,
                hang: false,
                calls: Arc::new(AtomicUsize::new(0)),
                dropped: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn with_price(mut self, pair: Pair, price: U256) -> Self {
            self.prices.insert(pair, price);
            self
        }

        /// Serve only the gas pair; by default the gas pair is refused
        pub fn gas_only(mut self) -> Self {
            self.gas_only = true;
            self
        }

        /// Never answer; counts fetch futures dropped before completion
        pub fn hanging(mut self) -> Self {
            self.hang = true;
            self
        }

        pub fn calls(&self) -> Arc<AtomicUsize> {
            self.calls.clone()
        }

        pub fn dropped(&self) -> Arc<AtomicUsize> {
            self.dropped.clone()
        }

        pub fn into_arc(self) -> Arc<dyn PriceSource> {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl PriceSource for FakeSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports(&self, pair: &Pair) -> bool {
            self.gas_only == pair.is_gas()
        }

        async fn fetch_price(&self, pair: &Pair) -> Result<PairPrice, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                let _guard = DropCounter(self.dropped.clone());
                std::future::pending::<()>().await;
            }
            tokio::task::yield_now().await;
            self.prices
                .get(pair)
                .map(|price| PairPrice::new(pair.clone(), *price))
                .ok_or_else(|| FeedError::fetch(self.name, pair, "no price"))
        }
    }
}
