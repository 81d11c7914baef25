//! Coingecko simple price API
//!
//! Coingecko identifies coins by lowercase ids rather than tickers.

use anyhow::Result;
use ethers::types::U256;
use serde_json::Value;

use super::{canonical_field, PriceApi, PriceRequest};

const COINGECKO_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

#[derive(Debug, Clone, Copy, Default)]
pub struct CoingeckoApi;

impl PriceApi for CoingeckoApi {
    fn name(&self) -> &'static str {
        "Coingecko"
    }

    fn symbol_replacements(&self) -> &'static [(&'static str, &'static str)] {
        &[("ETH", "ethereum")]
    }

    fn request(&self, from: &str, to: &str) -> PriceRequest {
        PriceRequest::get(COINGECKO_PRICE_URL)
            .param("ids", from.to_lowercase())
            .param("vs_currencies", to.to_lowercase())
    }

    fn extract_price(&self, from: &str, to: &str, body: &Value) -> Result<U256> {
        // {"ethereum":{"usd":1834.2}}
        canonical_field(body, &[&from.to_lowercase(), &to.to_lowercase()], 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::sources::testing::StaticTransport;
    use crate::oracle::sources::{HttpSource, PriceSource};
    use crate::types::Pair;
    use serde_json::json;

    #[tokio::test]
    async fn substitutes_eth_with_coin_id() {
        let transport = StaticTransport::ok(json!({"ethereum": {"usd": 1834.25}}));
        let source = HttpSource::new(CoingeckoApi, transport.clone());
        let pair = Pair::new("ETH", "USD", 4);

        let price = source.fetch_price(&pair).await.unwrap();

        assert_eq!(price.pair, pair);
        assert_eq!(
            price.price,
            U256::from(183_425u64) * U256::exp10(16)
        );
        assert_eq!(
            transport.last_request().query,
            vec![
                ("ids".to_string(), "ethereum".to_string()),
                ("vs_currencies".to_string(), "usd".to_string())
            ]
        );
    }
}
