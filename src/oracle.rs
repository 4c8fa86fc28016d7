//! Spot-rate oracle for fiat-to-native conversion.
//!
//! The oracle reads a public HTTPS JSON price feed and reports the current
//! fiat value of one native asset unit. It holds no state and performs no
//! retries: a failed fetch is terminal for the current attempt, and the
//! orchestrator decides whether to rerun the whole flow.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::errors::{PaymentError, Result};

/// Default public spot-price feed.
pub const DEFAULT_FEED_URL: &str = "https://api.coingecko.com/api/v3";

/// Default feed identifier of the native asset.
pub const DEFAULT_ASSET_ID: &str = "solana";

/// Source of spot conversion rates.
///
/// Implementations return the rate as fiat units per one native unit, so
/// `native_amount = fiat_amount / rate`. Injected into the orchestrator so
/// tests can pin deterministic rates.
#[async_trait]
pub trait RateOracle: Send + Sync {
    /// Current spot rate for the given fiat currency code.
    ///
    /// # Errors
    ///
    /// [`PaymentError::RateUnavailable`] when the feed is unreachable or
    /// returns missing, non-numeric, zero, or negative data.
    async fn native_rate(&self, fiat_currency: &str) -> Result<f64>;
}

/// Rate oracle backed by a CoinGecko-shaped public price feed.
///
/// # Examples
///
/// ```
/// use payrail::oracle::SpotFeedOracle;
///
/// let oracle = SpotFeedOracle::new();
/// assert!(oracle.feed_url.starts_with("https://"));
/// ```
#[derive(Clone)]
pub struct SpotFeedOracle {
    /// Base URL of the price feed
    pub feed_url: String,

    /// Feed identifier of the native asset (e.g. "solana")
    pub asset_id: String,

    /// HTTP client used for feed requests
    pub http_client: Client,
}

impl SpotFeedOracle {
    /// Creates an oracle against the default public feed.
    pub fn new() -> Self {
        Self::with_feed(DEFAULT_FEED_URL, DEFAULT_ASSET_ID)
    }

    /// Creates an oracle against a custom feed endpoint.
    pub fn with_feed(feed_url: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            asset_id: asset_id.into(),
            http_client: Client::new(),
        }
    }

    /// Sets a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }
}

impl Default for SpotFeedOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateOracle for SpotFeedOracle {
    async fn native_rate(&self, fiat_currency: &str) -> Result<f64> {
        let currency = fiat_currency.to_ascii_lowercase();
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies={}",
            self.feed_url, self.asset_id, currency
        );

        debug!(asset = %self.asset_id, %currency, "fetching spot rate");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| PaymentError::RateUnavailable(format!("feed unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(PaymentError::RateUnavailable(format!(
                "feed returned status {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| PaymentError::RateUnavailable(format!("feed returned non-JSON: {}", e)))?;

        parse_spot_rate(&body, &self.asset_id, &currency)
    }
}

/// Extracts and validates the rate from a feed response body.
///
/// The feed answers `{"<asset>": {"<currency>": <rate>}}`.
pub fn parse_spot_rate(body: &Value, asset_id: &str, currency: &str) -> Result<f64> {
    let rate = body
        .get(asset_id)
        .and_then(|asset| asset.get(currency))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            PaymentError::RateUnavailable(format!(
                "feed response missing numeric {}/{} rate",
                asset_id, currency
            ))
        })?;

    if !rate.is_finite() || rate <= 0.0 {
        return Err(PaymentError::RateUnavailable(format!(
            "feed returned unusable rate {}",
            rate
        )));
    }

    Ok(rate)
}
