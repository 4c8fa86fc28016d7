//! Core type definitions for payment execution.
//!
//! This module contains the data structures shared across the payment flow:
//! requests, conversion quotes, unsigned transfers, payment records, and the
//! settlement outcomes produced by the rails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{PaymentError, Result};

/// Smallest on-chain unit per one native asset unit.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Base URL of the public chain explorer used for settlement links.
pub const EXPLORER_TX_URL: &str = "https://explorer.solana.com/tx";

/// The settlement channel for a payment.
///
/// Chosen once per attempt from the recipient's configuration and immutable
/// for the lifetime of that attempt.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Rail {
    /// Native-asset transfer settled on chain
    OnChain,
    /// Fiat transfer routed through the money-transfer provider
    Provider,
}

impl std::fmt::Display for Rail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rail::OnChain => write!(f, "on-chain"),
            Rail::Provider => write!(f, "provider"),
        }
    }
}

/// A validated request to pay one recipient once.
///
/// Immutable once constructed. `destination` is the chain address for
/// [`Rail::OnChain`] or the provider account reference for
/// [`Rail::Provider`].
///
/// # Examples
///
/// ```
/// use payrail::types::{PaymentRequest, Rail};
///
/// let request = PaymentRequest::new(
///     "emp-7",
///     "11111111111111111111111111111111",
///     Rail::OnChain,
///     250.0,
///     "USD",
///     "March contracting invoice",
/// ).unwrap();
/// assert_eq!(request.fiat_amount, 250.0);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    /// Identifier of the recipient in the directory
    #[serde(rename = "recipientId")]
    pub recipient_id: String,

    /// Rail-specific destination: chain address or provider account reference
    pub destination: String,

    /// Settlement rail for this attempt
    pub rail: Rail,

    /// Amount to pay, in fiat units
    #[serde(rename = "fiatAmount")]
    pub fiat_amount: f64,

    /// ISO currency code of the fiat amount (e.g. "USD")
    #[serde(rename = "fiatCurrency")]
    pub fiat_currency: String,

    /// Human-readable purpose, carried onto the payment record
    pub description: String,
}

impl PaymentRequest {
    /// Creates a validated payment request.
    ///
    /// Fails with [`PaymentError::InvalidAmount`] when the fiat amount is
    /// not a positive finite number, and [`PaymentError::InvalidRecipient`]
    /// when the destination required by the rail is missing.
    pub fn new(
        recipient_id: impl Into<String>,
        destination: impl Into<String>,
        rail: Rail,
        fiat_amount: f64,
        fiat_currency: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        if !fiat_amount.is_finite() || fiat_amount <= 0.0 {
            return Err(PaymentError::InvalidAmount(format!(
                "fiat amount must be positive, got {}",
                fiat_amount
            )));
        }

        let destination = destination.into();
        if destination.trim().is_empty() {
            return Err(PaymentError::InvalidRecipient(format!(
                "recipient has no {} destination configured",
                rail
            )));
        }

        Ok(Self {
            recipient_id: recipient_id.into(),
            destination,
            rail,
            fiat_amount,
            fiat_currency: fiat_currency.into(),
            description: description.into(),
        })
    }
}

/// A fiat-to-native conversion captured at a single point in time.
///
/// Produced fresh for every orchestration run. Rates are time-sensitive:
/// a quote is never cached beyond the run that fetched it, and a retried
/// attempt fetches a new one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConversionQuote {
    /// Fiat amount the quote was computed for
    #[serde(rename = "fiatAmount")]
    pub fiat_amount: f64,

    /// ISO currency code of the fiat amount
    #[serde(rename = "fiatCurrency")]
    pub fiat_currency: String,

    /// Equivalent native-asset amount: `fiat_amount / rate`
    #[serde(rename = "nativeAmount")]
    pub native_amount: f64,

    /// Spot rate used, expressed as fiat units per one native unit
    pub rate: f64,

    /// When the rate was observed
    #[serde(rename = "rateTimestamp")]
    pub rate_timestamp: DateTime<Utc>,
}

impl ConversionQuote {
    /// Computes a quote from a spot rate observed now.
    ///
    /// # Examples
    ///
    /// ```
    /// use payrail::types::ConversionQuote;
    ///
    /// let quote = ConversionQuote::from_rate(100.0, "USD", 20.0);
    /// assert_eq!(quote.native_amount, 5.0);
    /// ```
    pub fn from_rate(fiat_amount: f64, fiat_currency: impl Into<String>, rate: f64) -> Self {
        Self {
            fiat_amount,
            fiat_currency: fiat_currency.into(),
            native_amount: fiat_amount / rate,
            rate,
            rate_timestamp: Utc::now(),
        }
    }
}

/// Chain reference data anchoring a transfer to a validity window.
///
/// A transfer built against this data expires once the chain passes
/// `last_valid_block_height`; it must then be rebuilt with fresh data,
/// never resubmitted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlockhashInfo {
    /// Recent blockhash to embed in the transfer
    pub blockhash: String,

    /// Last block height at which the blockhash remains valid
    #[serde(rename = "lastValidBlockHeight")]
    pub last_valid_block_height: u64,
}

/// An unsigned native-asset transfer, ready for the external signer.
///
/// Exactly one exists per chain-rail attempt. Constructed by the
/// transaction builder from fresh [`BlockhashInfo`]; the signer capability
/// signs and broadcasts it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UnsignedTransfer {
    /// Sender account (base58)
    pub sender: String,

    /// Recipient account (base58)
    pub recipient: String,

    /// Transfer amount in lamports
    pub lamports: u64,

    /// Recent blockhash the transfer is anchored to
    #[serde(rename = "recentBlockhash")]
    pub recent_blockhash: String,

    /// Expiry of the blockhash, as a block height
    #[serde(rename = "lastValidBlockHeight")]
    pub last_valid_block_height: u64,

    /// Account that pays the transaction fee
    #[serde(rename = "feePayer")]
    pub fee_payer: String,
}

/// Lifecycle status of a payment record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Recorded, settlement not yet (or never) confirmed
    Pending,
    /// Settlement observed as confirmed on its rail
    Completed,
    /// Settlement terminally failed
    Failed,
}

impl PaymentStatus {
    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Completed => write!(f, "completed"),
            PaymentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A durable, append-only payment record.
///
/// Created once per orchestration attempt. The only allowed mutations are
/// the `Pending → Completed` and `Pending → Failed` status transitions and
/// attaching an external reference while still `Pending`. The core never
/// deletes a record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    /// Generated record identifier
    pub id: String,

    /// Recipient this payment was for
    #[serde(rename = "recipientId")]
    pub recipient_id: String,

    /// Fiat amount of the payment
    pub amount: f64,

    /// Rail the payment was settled on
    pub rail: Rail,

    /// Current lifecycle status
    pub status: PaymentStatus,

    /// Chain transaction signature or provider transfer id, once known
    #[serde(rename = "externalReference", skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,

    /// When the record was created
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// Human-readable purpose
    pub description: String,
}

impl PaymentRecord {
    /// Public explorer link for a settled on-chain payment.
    ///
    /// `None` for provider-rail records and for records without an external
    /// reference.
    pub fn explorer_url(&self) -> Option<String> {
        match (self.rail, self.external_reference.as_deref()) {
            (Rail::OnChain, Some(reference)) if !reference.is_empty() => {
                Some(format!("{}/{}", EXPLORER_TX_URL, reference))
            }
            _ => None,
        }
    }
}

/// Terminal success outcome of a settlement submission.
///
/// Failure outcomes (`Rejected`, `Expired`, `ProviderRejected`) surface as
/// [`PaymentError`] variants instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Chain rail: the transfer was observed as confirmed on chain
    Confirmed {
        /// Transaction signature proving settlement
        reference: String,
    },

    /// Provider rail: the provider accepted the transfer request.
    ///
    /// Acceptance is not settlement; the record stays `Pending` until an
    /// external reconciler closes it.
    Accepted {
        /// Provider-side transfer identifier
        reference: String,
    },

    /// Provider rail: settlement continues on the provider's hosted page.
    ///
    /// No identifier exists yet; the record stays `Pending` with an empty
    /// reference for manual reconciliation.
    Handoff {
        /// URL the operator completes the transfer at
        redirect_url: String,
    },
}

impl SettlementOutcome {
    /// External settlement reference, when one is known.
    pub fn external_reference(&self) -> Option<&str> {
        match self {
            SettlementOutcome::Confirmed { reference } => Some(reference),
            SettlementOutcome::Accepted { reference } => Some(reference),
            SettlementOutcome::Handoff { .. } => None,
        }
    }

    /// Record status this outcome finalizes to.
    pub fn record_status(&self) -> PaymentStatus {
        match self {
            SettlementOutcome::Confirmed { .. } => PaymentStatus::Completed,
            SettlementOutcome::Accepted { .. } | SettlementOutcome::Handoff { .. } => {
                PaymentStatus::Pending
            }
        }
    }
}

/// Result returned to the caller after a completed orchestration run.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    /// Identifier of the payment record written for this attempt
    pub record_id: String,

    /// Final record status at the end of the run
    pub status: PaymentStatus,

    /// Chain signature or provider transfer id, when settlement produced one
    pub external_reference: Option<String>,

    /// Hosted-payment URL, when the provider rail handed off
    pub redirect_url: Option<String>,

    /// Conversion quote used (chain rail only)
    pub quote: Option<ConversionQuote>,
}
