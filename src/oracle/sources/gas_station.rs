//! ETH Gas Station oracle
//!
//! Serves only the `ETH-GAS/ETH` pair; `average` is quoted in tenths of gwei.

use anyhow::Result;
use ethers::types::U256;
use serde_json::Value;

use super::{canonical_field, PriceApi, PriceRequest, GAS_PAIR};

const GAS_STATION_URL: &str = "https://ethgasstation.info/api/ethgasAPI.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct GasStationApi;

impl PriceApi for GasStationApi {
    fn name(&self) -> &'static str {
        "GasStation"
    }

    fn fixed_pair(&self) -> Option<(&'static str, &'static str)> {
        Some(GAS_PAIR)
    }

    fn request(&self, _from: &str, _to: &str) -> PriceRequest {
        PriceRequest::get(GAS_STATION_URL)
    }

    fn extract_price(&self, _from: &str, _to: &str, body: &Value) -> Result<U256> {
        canonical_field(body, &["average"], 10)
    }
}
