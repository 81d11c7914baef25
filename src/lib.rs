//! Dockfeed Library
//!
//! Price-oracle feeder: aggregates crypto and gas prices from several sources
//! and publishes them on-chain when they drift from the stored value.

pub mod chain;
pub mod config;
pub mod error;
pub mod feeder;
pub mod oracle;
pub mod publisher;
pub mod types;

pub use error::{FeedError, FeedResult};
