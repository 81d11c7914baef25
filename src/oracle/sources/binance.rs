//! Binance spot ticker price API
//!
//! Quotes `{from}{to}` symbols; Binance lists USD markets against USDT.

use anyhow::Result;
use ethers::types::U256;
use serde_json::Value;

use super::{canonical_field, PriceApi, PriceRequest};

const BINANCE_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/price";

#[derive(Debug, Clone, Copy, Default)]
pub struct BinanceApi;

impl PriceApi for BinanceApi {
    fn name(&self) -> &'static str {
        "Binance"
    }

    fn symbol_replacements(&self) -> &'static [(&'static str, &'static str)] {
        &[("USD", "USDT")]
    }

    fn request(&self, from: &str, to: &str) -> PriceRequest {
        PriceRequest::get(BINANCE_TICKER_URL).param("symbol", format!("{}{}", from, to))
    }

    fn extract_price(&self, _from: &str, _to: &str, body: &Value) -> Result<U256> {
        // {"symbol":"DOCKUSDT","price":"0.01234000"}
        canonical_field(body, &["price"], 0)
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
    async fn substitutes_usd_but_returns_requested_pair() {
        let transport = StaticTransport::ok(json!({"symbol": "DOCKUSDT", "price": "0.01500000"}));
        let source = HttpSource::new(BinanceApi, transport.clone());
        let pair = Pair::new("DOCK", "USD", 4);

        let price = source.fetch_price(&pair).await.unwrap();

        assert_eq!(price.pair, pair);
        assert_eq!(price.price, U256::from(15_000_000_000_000_000u64));
        let request = transport.last_request();
        assert_eq!(request.url, BINANCE_TICKER_URL);
        assert_eq!(request.query, vec![("symbol".to_string(), "DOCKUSDT".to_string())]);
    }

    #[tokio::test]
    async fn missing_price_field_is_fetch_error() {
        let transport = StaticTransport::ok(json!({"code": -1121, "msg": "Invalid symbol."}));
        let source = HttpSource::new(BinanceApi, transport);

        let err = source.fetch_price(&Pair::new("NOPE", "USD", 4)).await.unwrap_err();
        match err {
            crate::error::FeedError::Fetch { source_name, pair, .. } => {
                assert_eq!(source_name, "Binance");
                assert_eq!(pair, Pair::new("NOPE", "USD", 4));
            }
            other => panic!("expected fetch error, got {:?}", other),
        }
    }
}
