//! Price source implementations (Binance, Cryptocompare, Coingecko,
//! Coinmarketcap, EtherChain, GasStation)
//!
//! Every source is a [`PriceApi`]: a pure description of the outbound GET
//! request plus a response parser. [`HttpSource`] wraps an api with symbol
//! substitution, the gas-pair guard and canonical scaling so the variants only
//! describe what differs between upstream APIs.

mod binance;
mod coingecko;
mod coinmarketcap;
mod cryptocompare;
mod etherchain;
mod gas_station;

pub use binance::BinanceApi;
pub use coingecko::CoingeckoApi;
pub use coinmarketcap::CoinmarketcapApi;
pub use cryptocompare::CryptocompareApi;
pub use etherchain::EtherChainApi;
pub use gas_station::GasStationApi;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use ethers::types::U256;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::SourcesConfig;
use crate::error::FeedError;
use crate::types::{pow10, Pair, PairPrice, CANONICAL_DECIMALS, GAS_QUOTE_SYMBOL, GAS_SYMBOL};

/// Trait for price source clients
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Get the source name
    fn name(&self) -> &'static str;

    /// Whether the source can quote this pair at all
    fn supports(&self, _pair: &Pair) -> bool {
        true
    }

    /// Fetch the price of a single pair, normalized to the canonical scale.
    /// The returned pair is always the caller's pair, never a substituted one.
    async fn fetch_price(&self, pair: &Pair) -> Result<PairPrice, FeedError>;
}

/// Outbound HTTP GET request description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(&'static str, String)>,
}

impl PriceRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Description of one upstream price API.
pub trait PriceApi: Send + Sync {
    fn name(&self) -> &'static str;

    /// Symbol substitutions applied to `from`/`to` before building a request.
    /// Symbols absent from the table are used unchanged.
    fn symbol_replacements(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// The only `(from, to)` the api serves, for sources without a pair parameter.
    fn fixed_pair(&self) -> Option<(&'static str, &'static str)> {
        None
    }

    /// Build the request for already-substituted symbols.
    fn request(&self, from: &str, to: &str) -> PriceRequest;

    /// Extract the price from a response body at the canonical scale.
    fn extract_price(&self, from: &str, to: &str, body: &Value) -> Result<U256>;
}

/// Executes GET requests and decodes JSON bodies.
#[async_trait]
pub trait JsonTransport: Send + Sync {
    async fn get_json(&self, request: &PriceRequest) -> Result<Value>;
}

/// reqwest-backed transport with a bounded request timeout
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl JsonTransport for ReqwestTransport {
    async fn get_json(&self, request: &PriceRequest) -> Result<Value> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Request to {} failed", request.url))?;

        if !response.status().is_success() {
            bail!("{} returned HTTP {}", request.url, response.status());
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to decode JSON from {}", request.url))
    }
}

/// Adapter turning a [`PriceApi`] into a [`PriceSource`].
pub struct HttpSource<A> {
    api: A,
    transport: Arc<dyn JsonTransport>,
    log_prices: bool,
}

impl<A: PriceApi> HttpSource<A> {
    pub fn new(api: A, transport: Arc<dyn JsonTransport>) -> Self {
        Self {
            api,
            transport,
            log_prices: false,
        }
    }

    /// Log every individual price at info level instead of debug
    pub fn with_price_logging(mut self, enabled: bool) -> Self {
        self.log_prices = enabled;
        self
    }

    fn replace_symbol<'a>(&self, symbol: &'a str) -> &'a str {
        self.api
            .symbol_replacements()
            .iter()
            .find(|(key, _)| *key == symbol)
            .map(|(_, replacement)| *replacement)
            .unwrap_or(symbol)
    }
}

#[async_trait]
impl<A: PriceApi> PriceSource for HttpSource<A> {
    fn name(&self) -> &'static str {
        self.api.name()
    }

    fn supports(&self, pair: &Pair) -> bool {
        match self.api.fixed_pair() {
            Some((from, to)) => pair.same_symbols(from, to),
            None => !pair.is_gas(),
        }
    }

    async fn fetch_price(&self, pair: &Pair) -> Result<PairPrice, FeedError> {
        if let Some((from, to)) = self.api.fixed_pair() {
            if !pair.same_symbols(from, to) {
                return Err(FeedError::InvalidPair {
                    source_name: self.name().to_string(),
                    pair: pair.clone(),
                    expected: format!("{}/{}", from, to),
                });
            }
        }

        let from = self.replace_symbol(&pair.from);
        let to = self.replace_symbol(&pair.to);
        let request = self.api.request(from, to);

        let body = self
            .transport
            .get_json(&request)
            .await
            .map_err(|e| FeedError::fetch(self.name(), pair, format!("{:#}", e)))?;

        let price = self
            .api
            .extract_price(from, to, &body)
            .map_err(|e| FeedError::fetch(self.name(), pair, format!("{:#}", e)))?;

        if self.log_prices {
            tracing::info!(source = %self.name(), pair = %pair, price = %price, "Source price");
        } else {
            tracing::debug!(source = %self.name(), pair = %pair, price = %price, "Source price");
        }

        Ok(PairPrice::new(pair.clone(), price))
    }
}

/// Walk `path` through nested JSON objects.
pub(crate) fn json_field<'a>(body: &'a Value, path: &[&str]) -> Result<&'a Value> {
    let mut current = body;
    for (depth, key) in path.iter().enumerate() {
        current = current
            .get(*key)
            .with_context(|| format!("Missing field '{}' in response", path[..=depth].join(".")))?;
    }
    Ok(current)
}

/// Parse a JSON number or numeric string without going through floats.
pub(crate) fn decimal_from_json(value: &Value) -> Result<Decimal> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => bail!("Expected a numeric value, got {}", other),
    };

    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .with_context(|| format!("Non-numeric price '{}'", text))
}

/// Convert `value / 10^shift` to canonical fixed-point units (floor).
pub(crate) fn to_canonical(value: Decimal, shift: u32) -> Result<U256> {
    if value.is_sign_negative() && !value.is_zero() {
        bail!("Negative price {}", value);
    }

    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let exponent = value.scale() + shift;
    let canonical = u32::from(CANONICAL_DECIMALS);

    if exponent <= canonical {
        let factor = pow10(canonical - exponent).context("Price scale overflow")?;
        mantissa
            .checked_mul(factor)
            .with_context(|| format!("Price {} overflows canonical scale", value))
    } else {
        Ok(match pow10(exponent - canonical) {
            Some(divisor) => mantissa / divisor,
            None => U256::zero(),
        })
    }
}

/// Read a numeric field and convert it to canonical units.
pub(crate) fn canonical_field(body: &Value, path: &[&str], shift: u32) -> Result<U256> {
    let value = json_field(body, path)?;
    let decimal = decimal_from_json(value)
        .with_context(|| format!("Invalid field '{}'", path.join(".")))?;
    to_canonical(decimal, shift)
}

/// Build every enabled source over a shared transport.
pub fn build_sources(
    config: &SourcesConfig,
    transport: Arc<dyn JsonTransport>,
) -> Vec<Arc<dyn PriceSource>> {
    fn wrap<A: PriceApi + 'static>(
        api: A,
        transport: &Arc<dyn JsonTransport>,
        log_prices: bool,
    ) -> Arc<dyn PriceSource> {
        Arc::new(HttpSource::new(api, transport.clone()).with_price_logging(log_prices))
    }

    let log = config.log_prices;
    let mut sources: Vec<Arc<dyn PriceSource>> = Vec::new();

    if config.binance_enabled {
        sources.push(wrap(BinanceApi, &transport, log));
    }
    if config.cryptocompare_enabled {
        sources.push(wrap(CryptocompareApi, &transport, log));
    }
    if config.coingecko_enabled {
        sources.push(wrap(CoingeckoApi, &transport, log));
    }
    if config.coinmarketcap_enabled {
        match config.coinmarketcap_api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => {
                sources.push(wrap(CoinmarketcapApi::new(key), &transport, log));
            }
            _ => tracing::warn!(
                source = %"Coinmarketcap",
                "Coinmarketcap enabled without an API key, source skipped"
            ),
        }
    }
    if config.etherchain_enabled {
        sources.push(wrap(EtherChainApi, &transport, log));
    }
    if config.gas_station_enabled {
        sources.push(wrap(GasStationApi, &transport, log));
    }

    tracing::info!(
        sources = ?sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "Price sources configured"
    );

    sources
}

/// Pair served by the gas oracles
pub(crate) const GAS_PAIR: (&str, &str) = (GAS_SYMBOL, GAS_QUOTE_SYMBOL);
