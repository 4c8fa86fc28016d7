//! On-chain settlement rail.
//!
//! Walks a built transfer through the submission state machine:
//! `Built → AwaitingSignature → Submitted → Confirmed | Rejected | Expired`.
//! The external wallet signs and broadcasts; this rail then polls the node
//! for confirmation until the transfer's chain reference data expires.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::{PaymentError, Result};
use crate::rails::{SettlementInstruction, SettlementSubmitter};
use crate::rpc::{ChainRpc, SignatureStatus};
use crate::signer::TransferSigner;
use crate::types::{Rail, SettlementOutcome, UnsignedTransfer};

/// Default delay between confirmation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default upper bound on the confirmation wait.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(90);

/// Phases of one chain-rail submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmissionState {
    AwaitingSignature,
    Submitted,
    Confirmed,
    Expired,
}

impl std::fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionState::AwaitingSignature => write!(f, "awaiting-signature"),
            SubmissionState::Submitted => write!(f, "submitted"),
            SubmissionState::Confirmed => write!(f, "confirmed"),
            SubmissionState::Expired => write!(f, "expired"),
        }
    }
}

/// Settlement submitter for the on-chain rail.
pub struct ChainRail {
    rpc: Arc<dyn ChainRpc>,
    signer: Arc<dyn TransferSigner>,

    /// Delay between confirmation polls
    pub poll_interval: Duration,

    /// Hard ceiling on the confirmation wait, independent of the
    /// blockhash validity window
    pub confirm_timeout: Duration,
}

impl ChainRail {
    /// Creates a chain rail over the given node and wallet capabilities.
    pub fn new(rpc: Arc<dyn ChainRpc>, signer: Arc<dyn TransferSigner>) -> Self {
        Self {
            rpc,
            signer,
            poll_interval: DEFAULT_POLL_INTERVAL,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }

    /// Sets the confirmation poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the confirmation wait ceiling.
    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// Polls the node until the signature confirms or the transfer's
    /// reference data expires.
    async fn await_confirmation(
        &self,
        transfer: &UnsignedTransfer,
        signature: &str,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.confirm_timeout;

        loop {
            match self.rpc.signature_status(signature).await? {
                SignatureStatus::Confirmed => {
                    debug!(%signature, state = %SubmissionState::Confirmed, "transfer confirmed");
                    return Ok(());
                }
                SignatureStatus::Failed(err) => {
                    return Err(PaymentError::RpcError(format!(
                        "transfer {} failed on chain: {}",
                        signature, err
                    )));
                }
                SignatureStatus::Unknown | SignatureStatus::Processing => {}
            }

            // The blockhash window closing without a confirmation makes this
            // payload permanently unusable; the orchestrator must rebuild,
            // never resubmit.
            let height = self.rpc.block_height().await?;
            if height > transfer.last_valid_block_height {
                warn!(
                    %signature,
                    height,
                    last_valid = transfer.last_valid_block_height,
                    state = %SubmissionState::Expired,
                    "blockhash expired before confirmation"
                );
                return Err(PaymentError::SubmissionExpired(format!(
                    "blockhash {} expired at height {} (valid through {})",
                    transfer.recent_blockhash, height, transfer.last_valid_block_height
                )));
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(PaymentError::SubmissionExpired(format!(
                    "no confirmation for {} within {:?}",
                    signature, self.confirm_timeout
                )));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl SettlementSubmitter for ChainRail {
    fn rail(&self) -> Rail {
        Rail::OnChain
    }

    async fn submit(&self, instruction: &SettlementInstruction) -> Result<SettlementOutcome> {
        let transfer = match instruction {
            SettlementInstruction::OnChain(transfer) => transfer,
            other => {
                return Err(PaymentError::UnsupportedRail(format!(
                    "chain rail received a {} instruction",
                    other.rail()
                )))
            }
        };

        debug!(
            recipient = %transfer.recipient,
            lamports = transfer.lamports,
            state = %SubmissionState::AwaitingSignature,
            "handing transfer to signer"
        );

        // The wallet signs and broadcasts; a decline is terminal for this
        // attempt.
        let signature = self.signer.sign_and_submit(transfer).await?;

        info!(%signature, state = %SubmissionState::Submitted, "transfer broadcast");

        self.await_confirmation(transfer, &signature).await?;

        Ok(SettlementOutcome::Confirmed {
            reference: signature,
        })
    }
}
