//! EtherChain gas price oracle
//!
//! Serves only the `ETH-GAS/ETH` pair; `currentBaseFee` is quoted in gwei.

use anyhow::Result;
use ethers::types::U256;
use serde_json::Value;

use super::{canonical_field, PriceApi, PriceRequest, GAS_PAIR};

const ETHERCHAIN_ORACLE_URL: &str = "https://www.etherchain.org/api/gasPriceOracle";

#[derive(Debug, Clone, Copy, Default)]
pub struct EtherChainApi;

impl PriceApi for EtherChainApi {
    fn name(&self) -> &'static str {
        "EtherChain"
    }

    fn fixed_pair(&self) -> Option<(&'static str, &'static str)> {
        Some(GAS_PAIR)
    }

    fn request(&self, _from: &str, _to: &str) -> PriceRequest {
        PriceRequest::get(ETHERCHAIN_ORACLE_URL)
    }

    fn extract_price(&self, _from: &str, _to: &str, body: &Value) -> Result<U256> {
        canonical_field(body, &["currentBaseFee"], 9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use crate::oracle::sources::testing::StaticTransport;
    use crate::oracle::sources::{HttpSource, PriceSource};
    use crate::types::Pair;
    use serde_json::json;

    #[tokio::test]
    async fn base_fee_is_scaled_from_gwei() {
        let transport = StaticTransport::ok(json!({"currentBaseFee": 30, "recommendedBaseFee": 61.2}));
        let source = HttpSource::new(EtherChainApi, transport.clone());

        let price = source.fetch_price(&Pair::eth_gas(18)).await.unwrap();

        assert_eq!(price.price, U256::from(30_000_000_000u64));
        let request = transport.last_request();
        assert_eq!(request.url, ETHERCHAIN_ORACLE_URL);
        assert!(request.query.is_empty());
    }

    #[tokio::test]
    async fn rejects_non_gas_pair_without_requesting() {
        let transport = StaticTransport::ok(json!({"currentBaseFee": 30}));
        let source = HttpSource::new(EtherChainApi, transport.clone());

        let err = source.fetch_price(&Pair::new("ETH", "USD", 2)).await.unwrap_err();

        assert!(matches!(err, FeedError::InvalidPair { .. }));
        assert_eq!(transport.request_count(), 0);
        assert!(!source.supports(&Pair::new("ETH", "USD", 2)));
        assert!(source.supports(&Pair::eth_gas(9)));
    }
}
