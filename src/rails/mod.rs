//! Settlement rail implementations.
//!
//! This module defines the shared settlement contract and one submitter per
//! rail: an on-chain transfer confirmed against the chain, and a provider
//! transfer accepted by the money-transfer API. Both take a rail-tagged
//! [`SettlementInstruction`] and finish in a [`SettlementOutcome`] or a
//! terminal [`crate::errors::PaymentError`].

pub mod chain;
pub mod provider;

pub use chain::ChainRail;
pub use provider::ProviderRail;

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{Rail, SettlementOutcome, UnsignedTransfer};

/// A fiat transfer order for the provider rail.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOrder {
    /// Provider-side recipient account reference
    pub account_ref: String,

    /// Amount in fiat units
    pub fiat_amount: f64,

    /// ISO currency code of the amount
    pub fiat_currency: String,

    /// Reference carried to the recipient's statement
    pub reference: String,
}

/// Rail-tagged input to a settlement submitter.
///
/// Produced during the build phase: the chain rail settles an already-built
/// [`UnsignedTransfer`], the provider rail settles a fiat
/// [`ProviderOrder`].
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementInstruction {
    /// Settle on chain
    OnChain(UnsignedTransfer),
    /// Settle through the money-transfer provider
    Provider(ProviderOrder),
}

impl SettlementInstruction {
    /// Rail this instruction belongs to.
    pub fn rail(&self) -> Rail {
        match self {
            SettlementInstruction::OnChain(_) => Rail::OnChain,
            SettlementInstruction::Provider(_) => Rail::Provider,
        }
    }
}

/// Trait for submitting a payment to its settlement rail.
///
/// Implementations must only be called after the attempt's `Pending`
/// payment record exists; every submission is therefore auditable even if
/// the process dies mid-flight. Terminal failures surface as
/// [`crate::errors::PaymentError::SignerRejected`],
/// [`crate::errors::PaymentError::SubmissionExpired`], or
/// [`crate::errors::PaymentError::ProviderRejected`].
#[async_trait]
pub trait SettlementSubmitter: Send + Sync {
    /// Rail this submitter settles on.
    fn rail(&self) -> Rail;

    /// Submits the instruction and waits for its terminal outcome.
    async fn submit(&self, instruction: &SettlementInstruction) -> Result<SettlementOutcome>;
}
