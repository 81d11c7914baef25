//! Update decision
//!
//! Compares a candidate price against the stored on-chain value at the pair's
//! publish precision. The only side effect is the chain read in [`evaluate`].

use ethers::types::U256;

use crate::chain::PriceChain;
use crate::error::FeedError;
use crate::types::{rescale, PriceUpdate, PublishablePairPrice, StoredPrice, CANONICAL_DECIMALS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateDecision {
    /// Write this payload on-chain
    Update(PriceUpdate),
    /// Stored value is close enough; `diff` is at publish decimals
    Skip { diff: U256 },
}

/// Decide whether `candidate` must be written given the `stored` price.
pub fn decide_update(
    candidate: &PublishablePairPrice,
    stored: Option<&StoredPrice>,
) -> Result<UpdateDecision, FeedError> {
    let pair = &candidate.pair.pair;
    let publish = candidate.pair.publish_config;
    let overflow = || FeedError::ScaleOverflow {
        pair: pair.clone(),
        decimals: publish.decimals,
    };

    let next = rescale(candidate.price, CANONICAL_DECIMALS, publish.decimals).ok_or_else(overflow)?;
    let update = PriceUpdate {
        pair: pair.clone(),
        amount: next,
        decimals: publish.decimals,
    };

    let Some(stored) = stored else {
        return Ok(UpdateDecision::Update(update));
    };

    let current = rescale(stored.amount, stored.decimals, publish.decimals).ok_or_else(overflow)?;
    let diff = if next > current {
        next - current
    } else {
        current - next
    };

    if diff >= publish.min_diff {
        Ok(UpdateDecision::Update(update))
    } else {
        Ok(UpdateDecision::Skip { diff })
    }
}

/// Read the stored price of the candidate's pair and decide.
///
/// Returns the write payload when an update is needed.
pub async fn evaluate(
    chain: &dyn PriceChain,
    candidate: &PublishablePairPrice,
) -> Result<Option<PriceUpdate>, FeedError> {
    let pair = &candidate.pair.pair;
    let publish = candidate.pair.publish_config;

    let stored = chain
        .read_stored_price(pair)
        .await
        .map_err(|e| FeedError::ChainQuery {
            pair: pair.clone(),
            reason: format!("{:#}", e),
        })?;

    let decision = decide_update(candidate, stored.as_ref())?;

    match (&decision, stored) {
        (_, None) => tracing::info!(
            pair = %pair,
            price = %candidate.price,
            "No stored on-chain price found"
        ),
        (UpdateDecision::Update(update), Some(stored)) => tracing::info!(
            pair = %pair,
            new_amount = %update.amount,
            stored_amount = %stored.amount,
            stored_decimals = stored.decimals,
            stored_block = stored.block_number,
            min_diff = %publish.min_diff,
            "Difference reaches threshold"
        ),
        (UpdateDecision::Skip { diff }, Some(stored)) => tracing::info!(
            pair = %pair,
            stored_amount = %stored.amount,
            stored_decimals = stored.decimals,
            diff = %diff,
            min_diff = %publish.min_diff,
            "Difference below threshold"
        ),
    }

    match decision {
        UpdateDecision::Update(update) => {
            tracing::info!(update = %update, "📈 Updating");
            Ok(Some(update))
        }
        UpdateDecision::Skip { .. } => {
            tracing::info!(pair = %pair, "Skipping");
            Ok(None)
        }
    }
}
