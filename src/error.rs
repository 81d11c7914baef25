//! Error taxonomy of the feeder pipeline

use thiserror::Error;

use crate::types::Pair;

/// Errors raised while fetching, deriving, deciding and publishing prices.
///
/// Variants carry owned strings so one failure can be shared by every
/// consumer of a deduplicated fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("{source_name} failed to fetch {pair}: {reason}")]
    Fetch {
        source_name: String,
        pair: Pair,
        reason: String,
    },

    #[error("cannot average {pair}: {responses} successful responses, {required} required")]
    AverageComputation {
        pair: Pair,
        responses: usize,
        required: usize,
    },

    #[error("{source_name} only serves {expected}, got {pair}")]
    InvalidPair {
        source_name: String,
        pair: Pair,
        expected: String,
    },

    #[error("failed to read stored price for {pair}: {reason}")]
    ChainQuery { pair: Pair, reason: String },

    #[error("price submission failed after {attempts} attempts: {reason}")]
    ChainSubmission { attempts: u32, reason: String },

    #[error("amount for {pair} does not fit at {decimals} decimals")]
    ScaleOverflow { pair: Pair, decimals: u8 },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FeedError {
    pub fn fetch(source_name: &str, pair: &Pair, reason: impl std::fmt::Display) -> Self {
        FeedError::Fetch {
            source_name: source_name.to_string(),
            pair: pair.clone(),
            reason: reason.to_string(),
        }
    }

    /// Submission errors end the whole cycle; every other error only drops
    /// the affected pair.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, FeedError::ChainSubmission { .. })
    }
}

pub type FeedResult<T> = Result<T, FeedError>;
