//! Cryptocompare price API

use anyhow::Result;
use ethers::types::U256;
use serde_json::Value;

use super::{canonical_field, PriceApi, PriceRequest};

const CRYPTOCOMPARE_PRICE_URL: &str = "https://min-api.cryptocompare.com/data/price";

#[derive(Debug, Clone, Copy, Default)]
pub struct CryptocompareApi;

impl PriceApi for CryptocompareApi {
    fn name(&self) -> &'static str {
        "Cryptocompare"
    }

    fn request(&self, from: &str, to: &str) -> PriceRequest {
        PriceRequest::get(CRYPTOCOMPARE_PRICE_URL)
            .param("fsym", from)
            .param("tsyms", to)
    }

    fn extract_price(&self, _from: &str, to: &str, body: &Value) -> Result<U256> {
        // {"USD":0.01234}
        canonical_field(body, &[to], 0)
    }
}
