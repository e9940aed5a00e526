//! Exchange-rate oracle
//!
//! One HTTP GET per quote against a CoinGecko-style simple price endpoint:
//!
//! ```text
//! GET {endpoint}?ids=solana&vs_currencies=usd  ->  {"solana":{"usd":142.17}}
//! ```
//!
//! Rates are never cached and failures are never retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::{Error, Result};

/// Source of asset -> reference-currency rates
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Current rate of one whole `base_asset` in `quote_currency`
    ///
    /// Always positive on success. Fails with `Error::QuoteUnavailable`.
    async fn fetch_rate(&self, base_asset: &str, quote_currency: &str) -> Result<f64>;
}

/// CoinGecko simple-price client
pub struct CoinGeckoOracle {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl CoinGeckoOracle {
    pub fn new(endpoint: String, timeout: Duration, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }
}

#[async_trait]
impl PriceOracle for CoinGeckoOracle {
    async fn fetch_rate(&self, base_asset: &str, quote_currency: &str) -> Result<f64> {
        debug!("Fetching {}/{} quote", base_asset, quote_currency);

        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("ids", base_asset), ("vs_currencies", quote_currency)]);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::QuoteUnavailable(format!("Quote request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::QuoteUnavailable(format!("Failed to read quote body: {}", e)))?;

        parse_rate(status, &body, base_asset, quote_currency)
    }
}

/// Extract `body[base][quote]` from a simple-price response
pub fn parse_rate(
    status: StatusCode,
    body: &str,
    base_asset: &str,
    quote_currency: &str,
) -> Result<f64> {
    if !status.is_success() {
        return Err(Error::QuoteUnavailable(format!(
            "Quote API error {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )));
    }

    // Only the requested field is read; extras like `usd_24h_change` may be null
    let quotes: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| Error::QuoteUnavailable(format!("Failed to parse quote response: {}", e)))?;

    let rate = quotes
        .get(base_asset)
        .and_then(|q| q.get(quote_currency))
        .and_then(|v| v.as_f64())
        .ok_or_else(|| {
            Error::QuoteUnavailable(format!(
                "Quote response missing {}.{}",
                base_asset, quote_currency
            ))
        })?;

    if !rate.is_finite() || rate <= 0.0 {
        return Err(Error::QuoteUnavailable(format!(
            "Quote for {}/{} is not positive: {}",
            base_asset, quote_currency, rate
        )));
    }

    Ok(rate)
}
