//! Error types for the payrail library.
//!
//! This module defines all error types that can occur while executing a
//! payment, from pre-flight validation through settlement and recording.

use thiserror::Error;

/// Main error type for payment operations.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Error during HTTP request/response handling
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Error during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Error parsing a URL
    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),

    /// The spot-rate feed is unreachable or returned unusable data
    #[error("Rate unavailable: {0}")]
    RateUnavailable(String),

    /// The balance query failed after exhausting its retries
    #[error("Balance query failed: {0}")]
    BalanceQueryFailed(String),

    /// The payer's spendable balance cannot cover the transfer plus fees
    #[error("Insufficient funds: have {available} native units, need {required}")]
    InsufficientFunds {
        /// Spendable balance observed on the payer account
        available: f64,
        /// Amount required, fee reserve included
        required: f64,
    },

    /// Recipient destination failed address/account validation
    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    /// Invalid payment amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The signer declined or failed to sign the transfer
    #[error("Signer rejected the transfer: {0}")]
    SignerRejected(String),

    /// Chain reference data expired before the submission confirmed
    #[error("Submission expired: {0}")]
    SubmissionExpired(String),

    /// The payment provider refused the transfer request
    #[error("Provider rejected the transfer (status {status}): {body}")]
    ProviderRejected {
        /// HTTP status returned by the provider proxy
        status: u16,
        /// Upstream error payload, verbatim
        body: String,
    },

    /// The payment store could not persist a record or status transition.
    ///
    /// Settlement may already have happened on the external rail when this
    /// surfaces. `reference` carries the external settlement reference when
    /// one is known so the operator can reconcile manually.
    #[error("RECORDING FAILED, manual reconciliation required (external reference: {reference:?}): {message}")]
    RecordingFailed {
        /// External settlement reference, if settlement already occurred
        reference: Option<String>,
        /// Underlying store failure
        message: String,
    },

    /// A settlement instruction was handed to the wrong rail
    #[error("Unsupported rail for this submitter: {0}")]
    UnsupportedRail(String),

    /// Chain RPC node returned an error response
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

/// Result type alias for payment operations.
pub type Result<T> = std::result::Result<T, PaymentError>;

impl PaymentError {
    /// True for failures that occur before any record is written.
    ///
    /// Pre-flight failures abort the attempt with no partial state; the
    /// caller may retry the whole flow from the start.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            PaymentError::RateUnavailable(_)
                | PaymentError::BalanceQueryFailed(_)
                | PaymentError::InsufficientFunds { .. }
                | PaymentError::InvalidRecipient(_)
                | PaymentError::InvalidAmount(_)
        )
    }
}
