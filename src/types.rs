//! Core types used throughout the feeder
//!
//! Defines pairs, publish settings and fixed-point prices. Every fetched price
//! is carried at the canonical 18-decimal scale and only rescaled to a pair's
//! publish precision when it is compared against chain state.

use ethers::types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Internal fixed-point precision of every computed price.
pub const CANONICAL_DECIMALS: u8 = 18;

/// Symbol of the Ethereum gas price "asset".
pub const GAS_SYMBOL: &str = "ETH-GAS";

/// Symbol the gas price is quoted in.
pub const GAS_QUOTE_SYMBOL: &str = "ETH";

/// `10^exp` as a U256, `None` when it does not fit.
pub fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// Moves `value` from `from` decimals to `to` decimals.
///
/// Scaling down divides (floor), scaling up multiplies. Returns `None` only
/// when scaling up overflows.
pub fn rescale(value: U256, from: u8, to: u8) -> Option<U256> {
    use std::cmp::Ordering;

    match to.cmp(&from) {
        Ordering::Equal => Some(value),
        Ordering::Less => match pow10(u32::from(from - to)) {
            Some(divisor) => Some(value / divisor),
            // Divisor beyond U256 range: every representable value floors to zero
            None => Some(U256::zero()),
        },
        Ordering::Greater => value.checked_mul(pow10(u32::from(to - from))?),
    }
}

/// One canonical unit, i.e. `1.0` at 18 decimals.
pub fn canonical_one() -> U256 {
    U256::exp10(CANONICAL_DECIMALS as usize)
}

/// A tracked price pair. Identity is the full `(from, to, decimals)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pair {
    pub from: String,
    pub to: String,
    pub decimals: u8,
}

impl Pair {
    pub fn new(from: impl Into<String>, to: impl Into<String>, decimals: u8) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            decimals,
        }
    }

    /// The Ethereum gas price pair served by gas oracles.
    pub fn eth_gas(decimals: u8) -> Self {
        Self::new(GAS_SYMBOL, GAS_QUOTE_SYMBOL, decimals)
    }

    /// Whether this is the gas price pair (decimals are not considered).
    pub fn is_gas(&self) -> bool {
        self.same_symbols(GAS_SYMBOL, GAS_QUOTE_SYMBOL)
    }

    pub fn same_symbols(&self, from: &str, to: &str) -> bool {
        self.from == from && self.to == to
    }

    /// Unique id in `FROM/TO/DECIMALS` form
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.from, self.to, self.decimals)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

/// Precision and update threshold used when writing a pair on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublishConfig {
    /// Decimals of the published amount
    pub decimals: u8,
    /// Minimum absolute difference (at `decimals`) that triggers a write
    pub min_diff: U256,
}

impl PublishConfig {
    pub fn new(decimals: u8, min_diff: impl Into<U256>) -> Self {
        Self {
            decimals,
            min_diff: min_diff.into(),
        }
    }
}

/// A pair eligible for on-chain writing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublishablePair {
    pub pair: Pair,
    pub publish_config: PublishConfig,
}

impl PublishablePair {
    pub fn new(pair: Pair, publish_config: PublishConfig) -> Self {
        Self {
            pair,
            publish_config,
        }
    }
}

impl fmt::Display for PublishablePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pair)
    }
}

/// Averaged price of a raw pair at the canonical scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairPrice {
    pub pair: Pair,
    pub price: U256,
}

impl PairPrice {
    pub fn new(pair: Pair, price: U256) -> Self {
        Self { pair, price }
    }

    /// Price expressed at the pair's own declared decimals.
    pub fn at_pair_decimals(&self) -> Option<U256> {
        rescale(self.price, CANONICAL_DECIMALS, self.pair.decimals)
    }
}

/// Candidate price for a publishable pair at the canonical scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishablePairPrice {
    pub pair: PublishablePair,
    pub price: U256,
}

impl PublishablePairPrice {
    pub fn new(pair: PublishablePair, price: U256) -> Self {
        Self { pair, price }
    }
}

/// Price currently stored on-chain for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredPrice {
    pub amount: U256,
    pub decimals: u8,
    pub block_number: u64,
}

/// Write-transaction payload produced by the update decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceUpdate {
    pub pair: Pair,
    pub amount: U256,
    pub decimals: u8,
}

impl fmt::Display for PriceUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {} (decimals {})", self.pair, self.amount, self.decimals)
    }
}
