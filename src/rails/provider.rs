//! Provider settlement rail.
//!
//! Settles a fiat transfer through the money-transfer provider. In API mode
//! the rail creates a fixed-rate quote and executes a transfer against it;
//! acceptance yields the provider's transfer identifier but not settlement,
//! so the payment record stays `Pending` for external reconciliation. In
//! handoff mode the rail builds the provider's hosted-payment URL instead
//! and the operator completes the transfer there.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::errors::{PaymentError, Result};
use crate::provider::{hosted_payment_url, ProviderApi, QuoteRequest, TransferDetails, TransferRequest};
use crate::rails::{ProviderOrder, SettlementInstruction, SettlementSubmitter};
use crate::recorder::generate_id;
use crate::types::{Rail, SettlementOutcome};

/// Settlement submitter for the provider rail.
pub struct ProviderRail {
    api: Arc<dyn ProviderApi>,

    /// Profile to create transfers under; fetched per submission when unset
    pub profile_id: Option<u64>,

    /// When true, hand off to the hosted payment page instead of calling
    /// the transfer API
    pub handoff: bool,
}

impl ProviderRail {
    /// Creates a provider rail in API mode.
    pub fn new(api: Arc<dyn ProviderApi>) -> Self {
        Self {
            api,
            profile_id: None,
            handoff: false,
        }
    }

    /// Pins the profile transfers are created under.
    pub fn with_profile(mut self, profile_id: u64) -> Self {
        self.profile_id = Some(profile_id);
        self
    }

    /// Switches the rail to hosted-page handoff mode.
    pub fn with_handoff(mut self) -> Self {
        self.handoff = true;
        self
    }

    async fn resolve_profile(&self) -> Result<u64> {
        match self.profile_id {
            Some(id) => Ok(id),
            None => Ok(self.api.profile().await?.id),
        }
    }
}

#[async_trait]
impl SettlementSubmitter for ProviderRail {
    fn rail(&self) -> Rail {
        Rail::Provider
    }

    async fn submit(&self, instruction: &SettlementInstruction) -> Result<SettlementOutcome> {
        let order = match instruction {
            SettlementInstruction::Provider(order) => order,
            other => {
                return Err(PaymentError::UnsupportedRail(format!(
                    "provider rail received an {} instruction",
                    other.rail()
                )))
            }
        };

        if self.handoff {
            let redirect_url = hosted_payment_url(
                &order.account_ref,
                order.fiat_amount,
                &order.fiat_currency,
                &order.reference,
            )?;
            info!(%redirect_url, "handing off to hosted payment page");
            return Ok(SettlementOutcome::Handoff { redirect_url });
        }

        let target_account: u64 = order.account_ref.parse().map_err(|_| {
            PaymentError::InvalidRecipient(format!(
                "provider account reference {} is not numeric",
                order.account_ref
            ))
        })?;

        let profile = self.resolve_profile().await?;

        debug!(profile, order.fiat_amount, "creating provider quote");
        let quote = self
            .api
            .create_quote(&QuoteRequest::new(
                profile,
                order.fiat_currency.clone(),
                order.fiat_currency.clone(),
                order.fiat_amount,
            ))
            .await?;

        let transfer = self
            .api
            .create_transfer(&TransferRequest {
                target_account,
                quote: quote.id,
                customer_transaction_id: generate_id(),
                details: TransferDetails {
                    reference: order.reference.clone(),
                },
            })
            .await?;

        info!(transfer_id = transfer.id, "provider accepted transfer");

        Ok(SettlementOutcome::Accepted {
            reference: transfer.id.to_string(),
        })
    }
}
