//! Client for the money-transfer provider, reached through a local proxy.
//!
//! The proxy adds bearer-token authentication server-side so the provider's
//! secret key never reaches this client, and forwards four operations
//! verbatim: profile, supported currencies, rate lookup, and transfer
//! creation (quote + execute). Any non-success response from the proxy is
//! surfaced as [`PaymentError::ProviderRejected`] with the upstream payload
//! attached.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::errors::{PaymentError, Result};

/// Default local proxy endpoint.
pub const DEFAULT_PROXY_URL: &str = "http://localhost:3001/api/wise";

/// Hosted payment page used for redirect handoffs.
pub const HOSTED_PAYMENT_URL: &str = "https://wise.com/pay/transfer";

/// Provider profile owning transfers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    /// Profile identifier
    pub id: u64,

    /// Profile kind (e.g. "personal", "business")
    #[serde(rename = "type")]
    pub profile_type: String,
}

/// Request body for creating a transfer quote.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    /// Profile the quote belongs to
    pub profile: u64,

    /// Source currency code
    pub source: String,

    /// Target currency code
    pub target: String,

    /// Amount in the source currency
    #[serde(rename = "sourceAmount")]
    pub source_amount: f64,

    /// Rate type; the provider expects "FIXED"
    #[serde(rename = "rateType")]
    pub rate_type: String,
}

impl QuoteRequest {
    /// Creates a fixed-rate quote request.
    pub fn new(profile: u64, source: impl Into<String>, target: impl Into<String>, source_amount: f64) -> Self {
        Self {
            profile,
            source: source.into(),
            target: target.into(),
            source_amount,
            rate_type: "FIXED".to_string(),
        }
    }
}

/// A priced quote returned by the provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProviderQuote {
    /// Quote identifier, consumed by transfer creation
    pub id: u64,

    /// Exchange rate the quote locks in
    pub rate: f64,

    /// Amount in the source currency
    #[serde(rename = "sourceAmount")]
    pub source_amount: f64,

    /// Amount the recipient receives in the target currency
    #[serde(rename = "targetAmount")]
    pub target_amount: f64,
}

/// Request body for executing a transfer against a quote.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransferRequest {
    /// Provider-side recipient account identifier
    #[serde(rename = "targetAccount")]
    pub target_account: u64,

    /// Quote to execute
    pub quote: u64,

    /// Caller-generated idempotency key for the transfer
    #[serde(rename = "customerTransactionId")]
    pub customer_transaction_id: String,

    /// Free-form transfer details
    pub details: TransferDetails,
}

/// Detail block of a transfer request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransferDetails {
    /// Reference shown on the recipient's statement
    pub reference: String,
}

/// A transfer accepted by the provider.
///
/// Acceptance only means the provider took the request; settlement
/// completes asynchronously on the provider's side.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProviderTransfer {
    /// Provider-side transfer identifier
    pub id: u64,

    /// Provider-side transfer status at creation time
    #[serde(default)]
    pub status: Option<String>,
}

/// Operations the provider proxy exposes.
///
/// Injected into the provider rail so tests can produce deterministic
/// acceptances and rejections.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Fetches the profile transfers are created under.
    async fn profile(&self) -> Result<ProviderProfile>;

    /// Fetches the currency codes the provider supports.
    async fn currencies(&self) -> Result<Vec<String>>;

    /// Fetches the current rate for a fiat currency pair.
    async fn rate(&self, source: &str, target: &str) -> Result<f64>;

    /// Creates a fixed-rate quote.
    async fn create_quote(&self, request: &QuoteRequest) -> Result<ProviderQuote>;

    /// Executes a transfer against a quote.
    async fn create_transfer(&self, request: &TransferRequest) -> Result<ProviderTransfer>;
}

/// HTTP client for the provider proxy.
#[derive(Clone)]
pub struct HttpProviderClient {
    /// Base URL of the local proxy
    pub proxy_url: String,

    /// HTTP client used for proxy requests
    pub http_client: Client,
}

impl HttpProviderClient {
    /// Creates a client against the default local proxy.
    pub fn new() -> Self {
        Self::with_proxy(DEFAULT_PROXY_URL)
    }

    /// Creates a client against a custom proxy endpoint.
    pub fn with_proxy(proxy_url: impl Into<String>) -> Self {
        Self {
            proxy_url: proxy_url.into(),
            http_client: Client::new(),
        }
    }

    /// Sets a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Checks the response status and deserializes the body.
    async fn read_response<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::ProviderRejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        debug!(%path, "provider proxy GET");
        let response = self
            .http_client
            .get(format!("{}{}", self.proxy_url, path))
            .send()
            .await?;
        Self::read_response(response).await
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!(%path, "provider proxy POST");
        let response = self
            .http_client
            .post(format!("{}{}", self.proxy_url, path))
            .json(body)
            .send()
            .await?;
        Self::read_response(response).await
    }
}

impl Default for HttpProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderApi for HttpProviderClient {
    async fn profile(&self) -> Result<ProviderProfile> {
        let profiles: Vec<ProviderProfile> = self.get_json("/profiles").await?;
        profiles
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::ConfigError("provider returned no profiles".to_string()))
    }

    async fn currencies(&self) -> Result<Vec<String>> {
        let body: Value = self.get_json("/currencies").await?;
        Ok(parse_currencies(&body))
    }

    async fn rate(&self, source: &str, target: &str) -> Result<f64> {
        let body: Value = self
            .get_json(&format!("/rates?source={}&target={}", source, target))
            .await?;
        parse_rate(&body)
    }

    async fn create_quote(&self, request: &QuoteRequest) -> Result<ProviderQuote> {
        self.post_json("/quotes", request).await
    }

    async fn create_transfer(&self, request: &TransferRequest) -> Result<ProviderTransfer> {
        self.post_json("/transfers", request).await
    }
}

/// Extracts currency codes from the provider's currency listing.
///
/// Accepts either a plain array of codes or an array of objects carrying a
/// `code` field, as different provider API versions answer.
pub fn parse_currencies(body: &Value) -> Vec<String> {
    body.as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .as_str()
                        .or_else(|| entry.get("code").and_then(Value::as_str))
                        .map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Extracts the rate from the provider's rate listing.
pub fn parse_rate(body: &Value) -> Result<f64> {
    body.as_array()
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("rate"))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            PaymentError::ProviderRejected {
                status: 200,
                body: "rate response missing numeric rate".to_string(),
            }
        })
}

/// Builds the hosted-payment redirect URL for a handoff.
///
/// # Examples
///
/// ```
/// use payrail::provider::hosted_payment_url;
///
/// let url = hosted_payment_url("acct-99", 150.0, "EUR", "March invoice").unwrap();
/// assert!(url.starts_with("https://wise.com/pay/transfer?"));
/// assert!(url.contains("currency=EUR"));
/// ```
pub fn hosted_payment_url(
    account_ref: &str,
    amount: f64,
    currency: &str,
    reference: &str,
) -> Result<String> {
    let mut url = Url::parse(HOSTED_PAYMENT_URL)?;
    url.query_pairs_mut()
        .append_pair("amount", &amount.to_string())
        .append_pair("currency", currency)
        .append_pair("recipient", account_ref)
        .append_pair("reference", reference);
    Ok(url.into())
}
