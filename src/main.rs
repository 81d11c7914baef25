//! Dockfeed binary
//!
//! Loads configuration, sets up logging and runs the scheduler until the
//! process is interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use dockfeed::chain::{InMemoryChain, PriceChain};
use dockfeed::config::FeederConfig;
use dockfeed::error::FeedError;
use dockfeed::feeder::{Feeder, Scheduler};
use dockfeed::oracle::sources::build_sources;
use dockfeed::oracle::ReqwestTransport;

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = FeederConfig::load()?;
    init_logging(config.logging.json);

    tracing::info!(config = %config, "🚀 Dockfeed starting");
    config.validate()?;

    let chain: Arc<dyn PriceChain> = if config.runtime.dry_run {
        tracing::info!("🧪 [DRY_RUN] Prices are published to an in-memory chain");
        Arc::new(InMemoryChain::new())
    } else {
        return Err(FeedError::Configuration(format!(
            "no chain bindings available for {}; set runtime.dry_run",
            config.chain.endpoint
        ))
        .into());
    };

    let transport = Arc::new(
        ReqwestTransport::new(config.sources.timeout()).context("Failed to build HTTP client")?,
    );
    let sources = build_sources(&config.sources, transport);
    let plan = config.build_plan()?;

    let feeder = Feeder::new(
        sources,
        chain,
        config.signer()?,
        plan,
        config.average_policy(),
        config.batch_config(),
    );

    Scheduler::new(Arc::new(feeder), config.schedule_config())
        .run()
        .await?;

    tracing::info!("👋 Dockfeed stopped");
    Ok(())
}
