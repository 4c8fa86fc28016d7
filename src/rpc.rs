//! Chain RPC access and the balance checker.
//!
//! The chain is reached over HTTPS JSON-RPC. [`ChainRpc`] is the injected
//! capability the rest of the crate depends on; [`HttpChainRpc`] is the
//! production implementation. [`BalanceChecker`] layers the retry policy and
//! the fee-reserve rule on top of the raw balance query.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::errors::{PaymentError, Result};
use crate::types::{BlockhashInfo, LAMPORTS_PER_SOL};

/// Commitment level used for balance and confirmation queries.
pub const DEFAULT_COMMITMENT: &str = "confirmed";

/// Confirmation state of a submitted transaction signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// The node has not seen the signature yet
    Unknown,
    /// Seen but not yet at the required commitment
    Processing,
    /// Confirmed at or beyond the required commitment
    Confirmed,
    /// The transaction executed and failed on chain
    Failed(String),
}

/// Read capabilities of a chain RPC node.
///
/// Balance, reference data, and confirmation reads; the write path
/// (broadcasting a signed payload) belongs to the wallet capability in
/// [`crate::signer`]. Implementations are stateless per call and safe to
/// share across concurrent attempts.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Lamport balance of an account; `None` when the account does not exist.
    async fn balance(&self, account: &str) -> Result<Option<u64>>;

    /// Fresh chain reference data for anchoring a new transfer.
    async fn latest_blockhash(&self) -> Result<BlockhashInfo>;

    /// Current block height, for expiry checks against
    /// [`BlockhashInfo::last_valid_block_height`].
    async fn block_height(&self) -> Result<u64>;

    /// Confirmation state of a submitted signature.
    async fn signature_status(&self, signature: &str) -> Result<SignatureStatus>;
}

/// JSON-RPC 2.0 client for a chain node.
#[derive(Clone)]
pub struct HttpChainRpc {
    /// Node endpoint URL
    pub rpc_url: String,

    /// Commitment level sent with read requests
    pub commitment: String,

    /// HTTP client used for node requests
    pub http_client: Client,
}

impl HttpChainRpc {
    /// Creates a client for the given node endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use payrail::rpc::HttpChainRpc;
    ///
    /// let rpc = HttpChainRpc::new("https://api.mainnet-beta.solana.com");
    /// assert_eq!(rpc.commitment, "confirmed");
    /// ```
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            commitment: DEFAULT_COMMITMENT.to_string(),
            http_client: Client::new(),
        }
    }

    /// Sets the commitment level.
    pub fn with_commitment(mut self, commitment: impl Into<String>) -> Self {
        self.commitment = commitment.into();
        self
    }

    /// Sets a custom HTTP client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Sends one JSON-RPC call and returns the `result` field.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!(%method, "chain rpc call");

        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PaymentError::RpcError(format!(
                "node returned status {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;

        if let Some(error) = body.get("error") {
            return Err(PaymentError::RpcError(format!(
                "{} failed: {}",
                method, error
            )));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| PaymentError::RpcError(format!("{} response missing result", method)))
    }
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn balance(&self, account: &str) -> Result<Option<u64>> {
        let result = self
            .call(
                "getBalance",
                json!([account, {"commitment": self.commitment}]),
            )
            .await?;
        parse_balance(&result)
    }

    async fn latest_blockhash(&self) -> Result<BlockhashInfo> {
        let result = self
            .call(
                "getLatestBlockhash",
                json!([{"commitment": self.commitment}]),
            )
            .await?;
        parse_blockhash(&result)
    }

    async fn block_height(&self) -> Result<u64> {
        let result = self
            .call("getBlockHeight", json!([{"commitment": self.commitment}]))
            .await?;
        result
            .as_u64()
            .ok_or_else(|| PaymentError::RpcError("non-numeric block height".to_string()))
    }

    async fn signature_status(&self, signature: &str) -> Result<SignatureStatus> {
        let result = self
            .call("getSignatureStatuses", json!([[signature]]))
            .await?;
        parse_signature_status(&result)
    }
}

/// Parses a `getBalance` result; a `null` value means the account does not
/// exist on chain.
pub fn parse_balance(result: &Value) -> Result<Option<u64>> {
    match result.get("value") {
        Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| PaymentError::RpcError("non-numeric balance".to_string())),
        None => Err(PaymentError::RpcError(
            "balance response missing value".to_string(),
        )),
    }
}

/// Parses a `getLatestBlockhash` result into [`BlockhashInfo`].
pub fn parse_blockhash(result: &Value) -> Result<BlockhashInfo> {
    let value = result
        .get("value")
        .ok_or_else(|| PaymentError::RpcError("blockhash response missing value".to_string()))?;

    let blockhash = value
        .get("blockhash")
        .and_then(Value::as_str)
        .ok_or_else(|| PaymentError::RpcError("blockhash response missing hash".to_string()))?;

    let last_valid_block_height = value
        .get("lastValidBlockHeight")
        .and_then(Value::as_u64)
        .ok_or_else(|| {
            PaymentError::RpcError("blockhash response missing validity height".to_string())
        })?;

    Ok(BlockhashInfo {
        blockhash: blockhash.to_string(),
        last_valid_block_height,
    })
}

/// Parses a `getSignatureStatuses` result for a single queried signature.
pub fn parse_signature_status(result: &Value) -> Result<SignatureStatus> {
    let entry = result
        .get("value")
        .and_then(Value::as_array)
        .and_then(|statuses| statuses.first())
        .ok_or_else(|| PaymentError::RpcError("status response missing value".to_string()))?;

    if entry.is_null() {
        return Ok(SignatureStatus::Unknown);
    }

    if let Some(err) = entry.get("err") {
        if !err.is_null() {
            return Ok(SignatureStatus::Failed(err.to_string()));
        }
    }

    match entry.get("confirmationStatus").and_then(Value::as_str) {
        Some("confirmed") | Some("finalized") => Ok(SignatureStatus::Confirmed),
        _ => Ok(SignatureStatus::Processing),
    }
}

/// Balance queries with bounded retry and the fee-reserve rule.
///
/// Transient node failures are retried up to three times with a fixed
/// one-second delay. An account the node does not know resolves to a zero
/// balance immediately: that is an answer, not a failure. Three failed
/// attempts abort the payment with [`PaymentError::BalanceQueryFailed`]
/// before any transfer is built.
#[derive(Clone)]
pub struct BalanceChecker {
    rpc: Arc<dyn ChainRpc>,

    /// Maximum query attempts before giving up
    pub max_attempts: u32,

    /// Delay between attempts
    pub retry_delay: Duration,

    /// Lamports held back from the spendable balance to cover fees
    pub fee_reserve_lamports: u64,
}

/// Default lamports reserved for the transaction fee.
pub const DEFAULT_FEE_RESERVE_LAMPORTS: u64 = 5_000;

impl BalanceChecker {
    /// Creates a checker with the default retry policy (3 × 1s) and fee
    /// reserve.
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            rpc,
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
            fee_reserve_lamports: DEFAULT_FEE_RESERVE_LAMPORTS,
        }
    }

    /// Sets the fee reserve in lamports.
    pub fn with_fee_reserve(mut self, lamports: u64) -> Self {
        self.fee_reserve_lamports = lamports;
        self
    }

    /// Sets the delay between retry attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Spendable balance of an account, in native units.
    pub async fn spendable_balance(&self, account: &str) -> Result<f64> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.rpc.balance(account).await {
                Ok(Some(lamports)) => {
                    let balance = lamports as f64 / LAMPORTS_PER_SOL as f64;
                    debug!(%account, balance, "balance query succeeded");
                    return Ok(balance);
                }
                // Not-found is an answer, not a failure: the account simply
                // holds nothing.
                Ok(None) => {
                    debug!(%account, "account not found, treating balance as zero");
                    return Ok(0.0);
                }
                Err(e) => {
                    warn!(%account, attempt, error = %e, "balance query attempt failed");
                    last_error = e.to_string();
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(PaymentError::BalanceQueryFailed(format!(
            "{} attempts exhausted: {}",
            self.max_attempts, last_error
        )))
    }

    /// Verifies the account can cover `native_amount` plus the fee reserve.
    ///
    /// Returns the observed spendable balance on success. Runs before any
    /// transfer is built; a shortfall aborts the attempt with
    /// [`PaymentError::InsufficientFunds`].
    pub async fn ensure_funded(&self, account: &str, native_amount: f64) -> Result<f64> {
        let available = self.spendable_balance(account).await?;
        let reserve = self.fee_reserve_lamports as f64 / LAMPORTS_PER_SOL as f64;
        let required = native_amount + reserve;

        if required > available {
            return Err(PaymentError::InsufficientFunds {
                available,
                required,
            });
        }

        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyRpc {
        attempts: AtomicU32,
        fail_first: u32,
        lamports: Option<u64>,
    }

    #[async_trait]
    impl ChainRpc for FlakyRpc {
        async fn balance(&self, _account: &str) -> Result<Option<u64>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.fail_first {
                return Err(PaymentError::RpcError("node timeout".to_string()));
            }
            Ok(self.lamports)
        }

        async fn latest_blockhash(&self) -> Result<BlockhashInfo> {
            unimplemented!("not used in balance tests")
        }

        async fn block_height(&self) -> Result<u64> {
            unimplemented!("not used in balance tests")
        }

        async fn signature_status(&self, _signature: &str) -> Result<SignatureStatus> {
            unimplemented!("not used in balance tests")
        }
    }

    fn checker(rpc: FlakyRpc) -> BalanceChecker {
        BalanceChecker::new(Arc::new(rpc)).with_retry_delay(Duration::from_millis(0))
    }

    #[test]
    fn test_parse_balance() {
        let result = serde_json::json!({"context": {"slot": 1}, "value": 1_500_000_000u64});
        assert_eq!(parse_balance(&result).unwrap(), Some(1_500_000_000));

        let result = serde_json::json!({"context": {"slot": 1}, "value": null});
        assert_eq!(parse_balance(&result).unwrap(), None);

        let result = serde_json::json!({"context": {"slot": 1}});
        assert!(parse_balance(&result).is_err());
    }

    #[test]
    fn test_parse_blockhash() {
        let result = serde_json::json!({
            "context": {"slot": 1},
            "value": {"blockhash": "9fM1...", "lastValidBlockHeight": 300}
        });
        let info = parse_blockhash(&result).unwrap();
        assert_eq!(info.blockhash, "9fM1...");
        assert_eq!(info.last_valid_block_height, 300);
    }

    #[test]
    fn test_parse_signature_status() {
        let result = serde_json::json!({"value": [null]});
        assert_eq!(
            parse_signature_status(&result).unwrap(),
            SignatureStatus::Unknown
        );

        let result = serde_json::json!({"value": [{"confirmationStatus": "processed", "err": null}]});
        assert_eq!(
            parse_signature_status(&result).unwrap(),
            SignatureStatus::Processing
        );

        let result = serde_json::json!({"value": [{"confirmationStatus": "confirmed", "err": null}]});
        assert_eq!(
            parse_signature_status(&result).unwrap(),
            SignatureStatus::Confirmed
        );

        let result = serde_json::json!({"value": [{"confirmationStatus": "finalized", "err": null}]});
        assert_eq!(
            parse_signature_status(&result).unwrap(),
            SignatureStatus::Confirmed
        );

        let result =
            serde_json::json!({"value": [{"confirmationStatus": "confirmed", "err": {"InstructionError": [0, "Custom"]}}]});
        assert!(matches!(
            parse_signature_status(&result).unwrap(),
            SignatureStatus::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_balance_retries_then_succeeds() {
        let rpc = FlakyRpc {
            attempts: AtomicU32::new(0),
            fail_first: 2,
            lamports: Some(2 * LAMPORTS_PER_SOL),
        };
        let balance = checker(rpc).spendable_balance("payer").await.unwrap();
        assert_eq!(balance, 2.0);
    }

    #[tokio::test]
    async fn test_balance_fails_after_three_attempts() {
        let rpc = FlakyRpc {
            attempts: AtomicU32::new(0),
            fail_first: 10,
            lamports: Some(0),
        };
        let err = checker(rpc).spendable_balance("payer").await.unwrap_err();
        assert!(matches!(err, PaymentError::BalanceQueryFailed(_)));
    }

    #[tokio::test]
    async fn test_unknown_account_resolves_to_zero_without_retry() {
        let rpc = FlakyRpc {
            attempts: AtomicU32::new(0),
            fail_first: 0,
            lamports: None,
        };
        let checker = checker(rpc);
        let balance = checker.spendable_balance("ghost").await.unwrap();
        assert_eq!(balance, 0.0);
    }

    #[tokio::test]
    async fn test_ensure_funded_honors_fee_reserve() {
        let rpc = FlakyRpc {
            attempts: AtomicU32::new(0),
            fail_first: 0,
            lamports: Some(LAMPORTS_PER_SOL),
        };
        let checker = checker(rpc).with_fee_reserve(LAMPORTS_PER_SOL / 2);

        // 1.0 available, 0.5 reserved: 0.4 fits, 0.6 does not.
        assert!(checker.ensure_funded("payer", 0.4).await.is_ok());
    }

    #[tokio::test]
    async fn test_ensure_funded_rejects_shortfall() {
        let rpc = FlakyRpc {
            attempts: AtomicU32::new(0),
            fail_first: 0,
            lamports: Some(LAMPORTS_PER_SOL),
        };
        let err = checker(rpc)
            .ensure_funded("payer", 1.5)
            .await
            .unwrap_err();
        match err {
            PaymentError::InsufficientFunds {
                available,
                required,
            } => {
                assert_eq!(available, 1.0);
                assert!(required > 1.5);
            }
            other => panic!("expected InsufficientFunds, got {other}"),
        }
    }
}
