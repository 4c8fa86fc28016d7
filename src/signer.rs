//! External wallet signing capability.
//!
//! Signing is owned entirely outside the core: a wallet holds the payer's
//! key, signs the transfer, and broadcasts it to the network. The core only
//! depends on this trait, so tests and alternative wallets can be injected
//! into the chain rail and the orchestrator.

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::UnsignedTransfer;

/// A wallet that can sign and broadcast transfers on the payer's behalf.
///
/// The wallet owns the write path to the chain node; the core never
/// broadcasts a payload itself. A user declining the signing prompt
/// surfaces as [`crate::errors::PaymentError::SignerRejected`], terminal
/// for the current attempt and not retried automatically.
#[async_trait]
pub trait TransferSigner: Send + Sync {
    /// Connects to the wallet and returns the payer account it controls.
    async fn connect(&self) -> Result<String>;

    /// Signs the transfer and broadcasts it, returning the transaction
    /// signature.
    ///
    /// Returning a signature means the network accepted the broadcast, not
    /// that the transfer settled; confirmation is the chain rail's job.
    async fn sign_and_submit(&self, transfer: &UnsignedTransfer) -> Result<String>;
}
