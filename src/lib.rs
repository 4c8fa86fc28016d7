//! # payrail
//!
//! Payroll payment execution over two rails: on-chain native-asset
//! transfers and fiat transfers routed through a money-transfer provider.
//!
//! The crate coordinates several unreliable external services (a spot-rate
//! feed, a chain RPC node, an external wallet signer, and a provider API
//! behind a local proxy) and guarantees that every attempt leaves a
//! durable, idempotent payment record that never claims settlement which
//! did not actually occur.
//!
//! ## Features
//!
//! - **Rate conversion**: fresh fiat-to-native quotes per attempt from a
//!   public spot-price feed
//! - **Balance verification**: bounded-retry balance queries with a fee
//!   reserve, before any transfer is built
//! - **Chain rail**: unsigned transfer construction, external wallet
//!   signing, and confirmation polling bounded by the blockhash validity
//!   window
//! - **Provider rail**: quote-and-transfer execution or hosted-page
//!   handoff through the provider proxy
//! - **Durable records**: append-only payment records with idempotent
//!   status transitions, over a pluggable document store
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use payrail::oracle::SpotFeedOracle;
//! use payrail::orchestrator::PaymentOrchestrator;
//! use payrail::provider::HttpProviderClient;
//! use payrail::recorder::MemoryStore;
//! use payrail::rpc::HttpChainRpc;
//! use payrail::types::{PaymentRequest, Rail};
//!
//! # use payrail::errors::Result;
//! # use payrail::signer::TransferSigner;
//! # use payrail::types::UnsignedTransfer;
//! # struct Wallet;
//! # #[async_trait::async_trait]
//! # impl TransferSigner for Wallet {
//! #     async fn connect(&self) -> Result<String> { Ok("payer".to_string()) }
//! #     async fn sign_and_submit(&self, _t: &UnsignedTransfer) -> Result<String> {
//! #         Ok("signature".to_string())
//! #     }
//! # }
//! # async fn example() -> Result<()> {
//! let orchestrator = PaymentOrchestrator::new(
//!     Arc::new(SpotFeedOracle::new()),
//!     Arc::new(HttpChainRpc::new("https://api.mainnet-beta.solana.com")),
//!     Arc::new(Wallet),
//!     Arc::new(HttpProviderClient::new()),
//!     Arc::new(MemoryStore::new()),
//! );
//!
//! let request = PaymentRequest::new(
//!     "emp-7",
//!     "11111111111111111111111111111111",
//!     Rail::OnChain,
//!     250.0,
//!     "USD",
//!     "March salary",
//! )?;
//!
//! let receipt = orchestrator.execute(&request).await?;
//! println!("settled: {:?}", receipt.external_reference);
//! # Ok(())
//! # }
//! ```
//!
//! ## Payment Flow
//!
//! One attempt moves through a fixed sequence:
//!
//! 1. **Rail selection**: chosen once from the recipient's configuration
//! 2. **Quoting** (chain rail): fetch a fresh fiat-to-native spot rate
//! 3. **Balance check** (chain rail): verify the payer covers the amount
//!    plus a fee reserve, with bounded retries
//! 4. **Building** (chain rail): construct the unsigned transfer against
//!    fresh chain reference data
//! 5. **Settling**: write the `Pending` record, then submit to the rail
//! 6. **Recording**: finalize the record from the settlement outcome
//!
//! Failures before settling abort with no record written. Failures during
//! settling always leave a `Failed` record. A retry is the caller's call
//! and always starts over with a fresh quote and fresh reference data.
//!
//! ## Concurrency
//!
//! Attempts for different recipients may run concurrently; the HTTP and
//! RPC clients are stateless per call and shared safely. Attempts for the
//! same recipient must be serialized by the caller; the core does not
//! provide per-recipient locking.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod builder;
pub mod errors;
pub mod oracle;
pub mod orchestrator;
pub mod provider;
pub mod rails;
pub mod recipients;
pub mod recorder;
pub mod rpc;
pub mod signer;
pub mod types;

// Re-export commonly used items
pub use errors::{PaymentError, Result};
pub use types::{
    ConversionQuote, PaymentReceipt, PaymentRecord, PaymentRequest, PaymentStatus, Rail,
    SettlementOutcome, UnsignedTransfer,
};
