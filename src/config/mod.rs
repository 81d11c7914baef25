//! Configuration management for the feeder
//!
//! Loads from optional config files, `FEEDER__*` environment variables and
//! the legacy deployment variables, with `.env` support.

mod types;

pub use types::*;

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::chain::Signer;
use crate::error::FeedError;
use crate::feeder::scheduler::{OverlapPolicy, ScheduleConfig};
use crate::feeder::{default_entries, FeedEntry, FeedPlan};
use crate::oracle::AveragePolicy;
use crate::publisher::BatchConfig;

/// Signer used by the dry-run chain when none is configured
const DRY_RUN_SIGNER: &str = "//Alice";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeederConfig {
    pub runtime: RuntimeConfig,
    pub chain: ChainConfig,
    pub schedule: ScheduleSettings,
    pub sources: SourcesConfig,
    pub aggregation: AggregationConfig,
    pub batching: BatchingConfig,
    pub logging: LoggingConfig,
    /// Pairs fetched and published directly
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
    /// Pairs derived from other pairs
    #[serde(default)]
    pub derived: Vec<DerivedPairConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Version tag for logging
    pub tag: String,
    /// Publish to the in-memory chain instead of a live node
    pub dry_run: bool,
}

#[derive(Clone, Deserialize)]
pub struct ChainConfig {
    /// Node RPC endpoint
    pub endpoint: String,
    /// Secret URI of the initiator account
    pub signer_uri: String,
}

impl std::fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConfig")
            .field("endpoint", &self.endpoint)
            .field("signer_uri", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleSettings {
    /// Interval between cycles in milliseconds
    pub interval_ms: u64,
    /// What to do when a tick fires while a cycle is still running
    pub overlap: OverlapPolicy,
    /// Stop the scheduler when a cycle's submission fails
    pub halt_on_submission_failure: bool,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// HTTP timeout per request in milliseconds
    pub timeout_ms: u64,
    /// Log every individual source price at info level
    pub log_prices: bool,
    pub binance_enabled: bool,
    pub cryptocompare_enabled: bool,
    pub coingecko_enabled: bool,
    pub coinmarketcap_enabled: bool,
    pub coinmarketcap_api_key: Option<String>,
    pub etherchain_enabled: bool,
    pub gas_station_enabled: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            log_prices: false,
            binance_enabled: true,
            cryptocompare_enabled: true,
            coingecko_enabled: true,
            coinmarketcap_enabled: false,
            coinmarketcap_api_key: None,
            etherchain_enabled: true,
            gas_station_enabled: true,
        }
    }
}

impl std::fmt::Debug for SourcesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcesConfig")
            .field("timeout_ms", &self.timeout_ms)
            .field("log_prices", &self.log_prices)
            .field("binance_enabled", &self.binance_enabled)
            .field("cryptocompare_enabled", &self.cryptocompare_enabled)
            .field("coingecko_enabled", &self.coingecko_enabled)
            .field("coinmarketcap_enabled", &self.coinmarketcap_enabled)
            .field(
                "coinmarketcap_api_key",
                &self.coinmarketcap_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("etherchain_enabled", &self.etherchain_enabled)
            .field("gas_station_enabled", &self.gas_station_enabled)
            .finish()
    }
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Strict,
    Quorum,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    pub policy: PolicyKind,
    /// Successful answers required under the quorum policy
    pub min_answers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchingConfig {
    pub max_size: usize,
    pub max_wait_ms: u64,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines
    pub json: bool,
}

impl FeederConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (FEEDER__*)
            .add_source(Environment::with_prefix("FEEDER").separator("__"));

        let builder = apply_legacy_env(builder, |name| std::env::var(name).ok())?;
        Self::from_builder(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let defaults = SourcesConfig::default();
        Ok(Config::builder()
            .set_default("runtime.tag", env!("CARGO_PKG_VERSION"))?
            .set_default("runtime.dry_run", true)?
            // Chain defaults
            .set_default("chain.endpoint", "")?
            .set_default("chain.signer_uri", "")?
            // Schedule defaults
            .set_default("schedule.interval_ms", 300_000)?
            .set_default("schedule.overlap", "supersede")?
            .set_default("schedule.halt_on_submission_failure", true)?
            // Source defaults
            .set_default("sources.timeout_ms", defaults.timeout_ms as i64)?
            .set_default("sources.log_prices", defaults.log_prices)?
            .set_default("sources.binance_enabled", defaults.binance_enabled)?
            .set_default("sources.cryptocompare_enabled", defaults.cryptocompare_enabled)?
            .set_default("sources.coingecko_enabled", defaults.coingecko_enabled)?
            .set_default("sources.coinmarketcap_enabled", defaults.coinmarketcap_enabled)?
            .set_default("sources.etherchain_enabled", defaults.etherchain_enabled)?
            .set_default("sources.gas_station_enabled", defaults.gas_station_enabled)?
            // Aggregation defaults
            .set_default("aggregation.policy", "strict")?
            .set_default("aggregation.min_answers", 2)?
            // Batching defaults
            .set_default("batching.max_size", 5)?
            .set_default("batching.max_wait_ms", 1_000)?
            .set_default("batching.max_attempts", 3)?
            .set_default("batching.retry_backoff_ms", 0)?
            // Logging defaults
            .set_default("logging.json", false)?)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to build configuration")?;

        let feeder_config: FeederConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(feeder_config)
    }

    /// Check settings that cannot be expressed in types
    pub fn validate(&self) -> Result<(), FeedError> {
        let fail = |msg: &str| Err(FeedError::Configuration(msg.to_string()));

        if self.schedule.interval_ms == 0 {
            return fail("schedule.interval_ms must be positive");
        }
        if self.batching.max_size == 0 {
            return fail("batching.max_size must be positive");
        }
        if self.batching.max_attempts == 0 {
            return fail("batching.max_attempts must be positive");
        }
        if self.aggregation.policy == PolicyKind::Quorum && self.aggregation.min_answers == 0 {
            return fail("aggregation.min_answers must be positive");
        }
        if !self.runtime.dry_run {
            if self.chain.endpoint.trim().is_empty() {
                return fail("chain endpoint (DOCK_RPC_ENDPOINT) is required");
            }
            if self.chain.signer_uri.trim().is_empty() {
                return fail("signer URI (INITIATOR_ACCOUNT_URI) is required");
            }
        }
        for pair in &self.derived {
            if pair.numerators.is_empty() && pair.denominators.is_empty() {
                return Err(FeedError::Configuration(format!(
                    "derived pair {}/{} has no dependencies",
                    pair.from, pair.to
                )));
            }
        }
        Ok(())
    }

    /// Pair set of every cycle; the default deployment set when none is configured.
    pub fn build_plan(&self) -> Result<FeedPlan, FeedError> {
        let entries: Vec<FeedEntry> = if self.pairs.is_empty() && self.derived.is_empty() {
            default_entries()
        } else {
            self.pairs
                .iter()
                .map(|p| FeedEntry::Direct(p.to_publishable()))
                .chain(self.derived.iter().map(|d| FeedEntry::Derived(d.to_source())))
                .collect()
        };
        FeedPlan::new(entries)
    }

    pub fn average_policy(&self) -> AveragePolicy {
        match self.aggregation.policy {
            PolicyKind::Strict => AveragePolicy::Strict,
            PolicyKind::Quorum => AveragePolicy::Quorum {
                min_answers: self.aggregation.min_answers,
            },
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_size: self.batching.max_size,
            max_wait: Duration::from_millis(self.batching.max_wait_ms),
            max_attempts: self.batching.max_attempts,
            retry_backoff: Duration::from_millis(self.batching.retry_backoff_ms),
        }
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            interval: Duration::from_millis(self.schedule.interval_ms),
            overlap: self.schedule.overlap,
            halt_on_submission_failure: self.schedule.halt_on_submission_failure,
        }
    }

    pub fn signer(&self) -> Result<Signer, FeedError> {
        let uri = match self.chain.signer_uri.trim() {
            "" if self.runtime.dry_run => DRY_RUN_SIGNER,
            uri => uri,
        };
        Signer::from_uri(uri).map_err(|e| FeedError::Configuration(e.to_string()))
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "tag={} dry_run={} interval_ms={} overlap={:?} policy={:?} pairs={} derived={}",
            self.runtime.tag,
            self.runtime.dry_run,
            self.schedule.interval_ms,
            self.schedule.overlap,
            self.average_policy(),
            self.pairs.len(),
            self.derived.len()
        )
    }
}

impl std::fmt::Display for FeederConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

/// Apply the legacy deployment variable names on top of every other
/// source.
fn apply_legacy_env<F>(
    builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let number = |name: &str| -> Result<Option<i64>> {
        non_empty(name)
            .map(|v| {
                v.trim()
                    .parse::<i64>()
                    .with_context(|| format!("{} must be an integer, got '{}'", name, v))
            })
            .transpose()
    };

    Ok(builder
        .set_override_option("chain.endpoint", non_empty("DOCK_RPC_ENDPOINT"))?
        .set_override_option("chain.signer_uri", non_empty("INITIATOR_ACCOUNT_URI"))?
        .set_override_option("schedule.interval_ms", number("WATCH_TIME")?)?
        .set_override_option("aggregation.min_answers", number("MinimumAnswersForPriceFeed")?)?
        .set_override_option("sources.log_prices", non_empty("LOG_PRICE_SOURCES").map(|_| true))?
        .set_override_option("sources.coinmarketcap_api_key", non_empty("CMC_API_KEY"))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_with(
        env: &[(&str, &str)],
        extra: impl FnOnce(ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState>,
    ) -> FeederConfig {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let builder = extra(FeederConfig::defaults().unwrap());
        let builder = apply_legacy_env(builder, |name| env.get(name).cloned()).unwrap();
        FeederConfig::from_builder(builder).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = load_with(&[], |b| b);

        assert!(config.runtime.dry_run);
        assert_eq!(config.schedule.interval_ms, 300_000);
        assert_eq!(config.schedule.overlap, OverlapPolicy::Supersede);
        assert_eq!(config.average_policy(), AveragePolicy::Strict);
        assert_eq!(config.batch_config().max_attempts, 3);
        assert_eq!(config.batch_config().retry_backoff, Duration::ZERO);
        assert!(config.validate().is_ok());
        assert_eq!(config.signer().unwrap().uri(), DRY_RUN_SIGNER);
    }

    #[test]
    fn test_legacy_env_overrides() {
        let config = load_with(
            &[
                ("DOCK_RPC_ENDPOINT", "wss://node.example:443"),
                ("INITIATOR_ACCOUNT_URI", "//Bob"),
                ("WATCH_TIME", "60000"),
                ("MinimumAnswersForPriceFeed", "3"),
                ("LOG_PRICE_SOURCES", "1"),
                ("CMC_API_KEY", "secret"),
            ],
            |b| b,
        );

        assert_eq!(config.chain.endpoint, "wss://node.example:443");
        assert_eq!(config.signer().unwrap().uri(), "//Bob");
        assert_eq!(config.schedule.interval_ms, 60_000);
        assert_eq!(config.aggregation.min_answers, 3);
        assert!(config.sources.log_prices);
        assert_eq!(config.sources.coinmarketcap_api_key.as_deref(), Some("secret"));
        assert!(!format!("{:?}", config.sources).contains("secret"));
    }

    #[test]
    fn test_invalid_watch_time_is_rejected() {
        let builder = FeederConfig::defaults().unwrap();
        let result = apply_legacy_env(builder, |name| {
            (name == "WATCH_TIME").then(|| "five minutes".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_quorum_policy() {
        let config = load_with(&[], |b| {
            b.set_override("aggregation.policy", "quorum")
                .unwrap()
                .set_override("aggregation.min_answers", 2)
                .unwrap()
        });
        assert_eq!(
            config.average_policy(),
            AveragePolicy::Quorum { min_answers: 2 }
        );
    }

    #[test]
    fn test_live_mode_requires_chain_settings() {
        let config = load_with(&[], |b| b.set_override("runtime.dry_run", false).unwrap());
        assert!(matches!(
            config.validate(),
            Err(FeedError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_plan_when_no_pairs_configured() {
        let config = load_with(&[], |b| b);
        let plan = config.build_plan().unwrap();
        assert_eq!(plan.entries().len(), 2);
    }

    #[test]
    fn test_configured_pairs_from_file() {
        let toml = r#"
            [[pairs]]
            from = "DOCK"
            to = "USD"
            decimals = 4
            publish = { decimals = 4, min_diff = 100 }

            [[derived]]
            from = "DOCK"
            to = "EUR"
            decimals = 4
            publish = { decimals = 4, min_diff = 10 }
            numerators = [{ from = "DOCK", to = "USD", decimals = 4 }]
            denominators = [{ from = "EUR", to = "USD", decimals = 4 }]
        "#;
        let config = load_with(&[], |b| {
            b.add_source(File::from_str(toml, config::FileFormat::Toml))
        });

        assert!(config.validate().is_ok());
        assert_eq!(config.derived[0].multiplier, 1);
        let plan = config.build_plan().unwrap();
        assert_eq!(plan.entries().len(), 2);
        assert_eq!(plan.raw_pairs().len(), 2);
    }
}
