//! Coinmarketcap quotes API
//!
//! Requires a pro API key sent as a header.

use anyhow::Result;
use ethers::types::U256;
use serde_json::Value;

use super::{canonical_field, PriceApi, PriceRequest};

const COINMARKETCAP_QUOTES_URL: &str =
    "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest";
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

#[derive(Clone)]
pub struct CoinmarketcapApi {
    api_key: String,
}

impl CoinmarketcapApi {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }
}

impl std::fmt::Debug for CoinmarketcapApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinmarketcapApi")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl PriceApi for CoinmarketcapApi {
    fn name(&self) -> &'static str {
        "Coinmarketcap"
    }

    fn request(&self, from: &str, to: &str) -> PriceRequest {
        PriceRequest::get(COINMARKETCAP_QUOTES_URL)
            .param("symbol", from)
            .param("convert", to)
            .header(API_KEY_HEADER, self.api_key.clone())
    }

    fn extract_price(&self, from: &str, to: &str, body: &Value) -> Result<U256> {
        canonical_field(body, &["data", from, "quote", to, "price"], 0)
    }
}
