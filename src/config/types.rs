//! Pair entries of the configuration file

use serde::Deserialize;

use crate::oracle::PublishablePairSource;
use crate::types::{Pair, PublishConfig, PublishablePair};

/// On-chain precision and update threshold of a configured pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PublishSettings {
    pub decimals: u8,
    #[serde(default)]
    pub min_diff: u64,
}

impl From<PublishSettings> for PublishConfig {
    fn from(settings: PublishSettings) -> Self {
        PublishConfig::new(settings.decimals, settings.min_diff)
    }
}

/// A pair fetched from the price sources and published as is
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PairConfig {
    pub from: String,
    pub to: String,
    pub decimals: u8,
    pub publish: PublishSettings,
}

impl PairConfig {
    pub fn to_publishable(&self) -> PublishablePair {
        PublishablePair::new(
            Pair::new(&self.from, &self.to, self.decimals),
            self.publish.into(),
        )
    }
}

fn default_multiplier() -> u64 {
    1
}

/// A pair computed as `multiplier * Π numerators / Π denominators`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DerivedPairConfig {
    pub from: String,
    pub to: String,
    pub decimals: u8,
    pub publish: PublishSettings,
    #[serde(default)]
    pub numerators: Vec<Pair>,
    #[serde(default)]
    pub denominators: Vec<Pair>,
    #[serde(default = "default_multiplier")]
    pub multiplier: u64,
}

impl DerivedPairConfig {
    pub fn to_source(&self) -> PublishablePairSource {
        PublishablePairSource::quotient(
            PublishablePair::new(
                Pair::new(&self.from, &self.to, self.decimals),
                self.publish.into(),
            ),
            self.numerators.clone(),
            self.denominators.clone(),
            self.multiplier,
        )
    }
}
