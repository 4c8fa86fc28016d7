//! Top-level payment state machine.
//!
//! One orchestration run takes a validated [`PaymentRequest`] through
//! `Idle → Quoting → BalanceCheck → Building → Settling → Recording →
//! Done | Aborted`. The quoting, balance, and building phases run for the
//! chain rail only and abort cheaply with no record written. Once settling
//! begins, a `Pending` record always exists before the submission side
//! effect, and recording always runs on the way out regardless of the
//! settlement outcome.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::builder::build_transfer;
use crate::errors::{PaymentError, Result};
use crate::oracle::RateOracle;
use crate::provider::ProviderApi;
use crate::rails::{
    ChainRail, ProviderOrder, ProviderRail, SettlementInstruction, SettlementSubmitter,
};
use crate::recorder::{NewPayment, PaymentRecorder, PaymentStore};
use crate::rpc::{BalanceChecker, ChainRpc};
use crate::signer::TransferSigner;
use crate::types::{
    ConversionQuote, PaymentReceipt, PaymentRequest, PaymentStatus, Rail, SettlementOutcome,
    UnsignedTransfer,
};

/// Phases of one orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Rail selection
    Idle,
    /// Fetching a fresh conversion quote (chain rail only)
    Quoting,
    /// Verifying the payer can cover the transfer (chain rail only)
    BalanceCheck,
    /// Building the unsigned transfer (chain rail only)
    Building,
    /// Submitting to the settlement rail
    Settling,
    /// Finalizing the payment record
    Recording,
    /// Record transition acknowledged
    Done,
    /// Run ended without settlement
    Aborted,
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorState::Idle => write!(f, "idle"),
            OrchestratorState::Quoting => write!(f, "quoting"),
            OrchestratorState::BalanceCheck => write!(f, "balance-check"),
            OrchestratorState::Building => write!(f, "building"),
            OrchestratorState::Settling => write!(f, "settling"),
            OrchestratorState::Recording => write!(f, "recording"),
            OrchestratorState::Done => write!(f, "done"),
            OrchestratorState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Sequences one payment attempt across the oracle, balance checker,
/// builder, settlement rails, and recorder.
///
/// Attempts for different recipients may run concurrently; all shared
/// clients are stateless per call. Attempts for the *same* recipient must
/// be serialized by the caller (for example behind a per-recipient mutex):
/// the core performs no per-recipient locking, and two concurrent attempts
/// could both pass the balance check before either settles.
///
/// A failed attempt is never retried automatically. A caller-initiated
/// retry re-enters at `Idle` and fetches a fresh quote and fresh chain
/// reference data; a prior [`UnsignedTransfer`] is never resubmitted.
pub struct PaymentOrchestrator {
    oracle: Arc<dyn RateOracle>,
    rpc: Arc<dyn ChainRpc>,
    signer: Arc<dyn TransferSigner>,
    balance_checker: BalanceChecker,
    chain_rail: Arc<dyn SettlementSubmitter>,
    provider_rail: Arc<dyn SettlementSubmitter>,
    recorder: PaymentRecorder,
}

impl PaymentOrchestrator {
    /// Wires an orchestrator from its capabilities with default rails.
    pub fn new(
        oracle: Arc<dyn RateOracle>,
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn TransferSigner>,
        provider: Arc<dyn ProviderApi>,
        store: Arc<dyn PaymentStore>,
    ) -> Self {
        let balance_checker = BalanceChecker::new(rpc.clone());
        let chain_rail = Arc::new(ChainRail::new(rpc.clone(), signer.clone()));
        let provider_rail = Arc::new(ProviderRail::new(provider));

        Self {
            oracle,
            rpc,
            signer,
            balance_checker,
            chain_rail,
            provider_rail,
            recorder: PaymentRecorder::new(store),
        }
    }

    /// Replaces the chain-rail submitter.
    pub fn with_chain_rail(mut self, rail: Arc<dyn SettlementSubmitter>) -> Self {
        self.chain_rail = rail;
        self
    }

    /// Replaces the provider-rail submitter.
    pub fn with_provider_rail(mut self, rail: Arc<dyn SettlementSubmitter>) -> Self {
        self.provider_rail = rail;
        self
    }

    /// Replaces the balance checker (retry policy, fee reserve).
    pub fn with_balance_checker(mut self, checker: BalanceChecker) -> Self {
        self.balance_checker = checker;
        self
    }

    /// The recorder, for payment history reads and external reconciliation.
    pub fn recorder(&self) -> &PaymentRecorder {
        &self.recorder
    }

    /// Balance of the connected payer wallet, in native units.
    pub async fn connected_balance(&self) -> Result<f64> {
        let payer = self.signer.connect().await?;
        self.balance_checker.spendable_balance(&payer).await
    }

    /// Executes one payment attempt end to end.
    ///
    /// Pre-flight failures (`RateUnavailable`, `BalanceQueryFailed`,
    /// `InsufficientFunds`, `InvalidRecipient`) abort before any record is
    /// written. Settlement failures always leave a `Failed` record behind.
    /// [`PaymentError::RecordingFailed`] means settlement may have happened
    /// while the record did not persist; reconcile manually using the
    /// reference it carries.
    pub async fn execute(&self, request: &PaymentRequest) -> Result<PaymentReceipt> {
        // Rail selection happens once here and holds for the whole attempt.
        info!(
            recipient = %request.recipient_id,
            rail = %request.rail,
            fiat = request.fiat_amount,
            state = %OrchestratorState::Idle,
            "payment attempt started"
        );

        let (instruction, quote) = match request.rail {
            Rail::OnChain => {
                let (transfer, quote) = match self.preflight_chain(request).await {
                    Ok(prepared) => prepared,
                    Err(err) => {
                        warn!(state = %OrchestratorState::Aborted, error = %err, "pre-flight failed");
                        return Err(err);
                    }
                };
                (SettlementInstruction::OnChain(transfer), Some(quote))
            }
            Rail::Provider => (
                SettlementInstruction::Provider(ProviderOrder {
                    account_ref: request.destination.clone(),
                    fiat_amount: request.fiat_amount,
                    fiat_currency: request.fiat_currency.clone(),
                    reference: request.description.clone(),
                }),
                None,
            ),
        };

        // Settling: the Pending record is written before the submission side
        // effect so a crash mid-settlement still leaves a trail.
        debug!(state = %OrchestratorState::Settling, "creating pending record");
        let record = self
            .recorder
            .create(NewPayment {
                recipient_id: request.recipient_id.clone(),
                amount: request.fiat_amount,
                rail: request.rail,
                description: request.description.clone(),
            })
            .await?;

        let submitter = match request.rail {
            Rail::OnChain => &self.chain_rail,
            Rail::Provider => &self.provider_rail,
        };

        match submitter.submit(&instruction).await {
            Ok(outcome) => self.finalize(&record.id, outcome, quote).await,
            Err(err) => {
                // Recording always runs: a settlement failure must leave a
                // Failed record, never a Pending one.
                warn!(
                    record_id = %record.id,
                    state = %OrchestratorState::Recording,
                    error = %err,
                    "settlement failed"
                );
                if let Err(recording_err) = self
                    .recorder
                    .transition(&record.id, PaymentStatus::Failed, None)
                    .await
                {
                    // The store being unreachable outranks the settlement
                    // failure: the operator must reconcile by hand.
                    return Err(merge_recording_failure(recording_err, &err));
                }
                Err(err)
            }
        }
    }

    /// Chain-rail pre-flight: quote, balance check, and transfer build.
    ///
    /// Every failure in here aborts the attempt before a record exists.
    async fn preflight_chain(
        &self,
        request: &PaymentRequest,
    ) -> Result<(UnsignedTransfer, ConversionQuote)> {
        debug!(state = %OrchestratorState::Quoting, currency = %request.fiat_currency, "fetching quote");
        let rate = self.oracle.native_rate(&request.fiat_currency).await?;
        let quote =
            ConversionQuote::from_rate(request.fiat_amount, request.fiat_currency.clone(), rate);
        debug!(rate, native = quote.native_amount, "quote obtained");

        debug!(state = %OrchestratorState::BalanceCheck, "verifying payer balance");
        let payer = self.signer.connect().await?;
        self.balance_checker
            .ensure_funded(&payer, quote.native_amount)
            .await?;

        debug!(state = %OrchestratorState::Building, "building transfer");
        let reference = self.rpc.latest_blockhash().await?;
        let transfer = build_transfer(
            &payer,
            &request.destination,
            quote.native_amount,
            &reference,
        )?;

        Ok((transfer, quote))
    }

    /// Recording for a successful settlement outcome.
    async fn finalize(
        &self,
        record_id: &str,
        outcome: SettlementOutcome,
        quote: Option<ConversionQuote>,
    ) -> Result<PaymentReceipt> {
        debug!(record_id, state = %OrchestratorState::Recording, "finalizing record");

        let status = outcome.record_status();
        let reference = outcome.external_reference().map(str::to_string);

        // A handoff leaves the record Pending with no reference to attach;
        // everything else is acknowledged by the recorder before Done.
        let record = if status.is_terminal() || reference.is_some() {
            self.recorder
                .transition(record_id, status, reference.clone())
                .await?
        } else {
            self.recorder
                .get(record_id)
                .await?
                .ok_or_else(|| PaymentError::RecordingFailed {
                    reference: reference.clone(),
                    message: format!("record {} disappeared before finalization", record_id),
                })?
        };

        let redirect_url = match outcome {
            SettlementOutcome::Handoff { redirect_url } => Some(redirect_url),
            _ => None,
        };

        info!(
            record_id,
            status = %record.status,
            reference = ?record.external_reference,
            state = %OrchestratorState::Done,
            "payment attempt finished"
        );

        Ok(PaymentReceipt {
            record_id: record.id,
            status: record.status,
            external_reference: record.external_reference,
            redirect_url,
            quote,
        })
    }
}

/// Folds a settlement error into the recording failure that outranks it.
fn merge_recording_failure(recording_err: PaymentError, settlement_err: &PaymentError) -> PaymentError {
    match recording_err {
        PaymentError::RecordingFailed { reference, message } => PaymentError::RecordingFailed {
            reference,
            message: format!("{} (while recording settlement failure: {})", message, settlement_err),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::MemoryStore;
    use crate::rpc::SignatureStatus;
    use crate::types::BlockhashInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const PAYER: &str = "11111111111111111111111111111111";
    const RECIPIENT: &str = "So11111111111111111111111111111111111111112";

    struct FakeOracle {
        rate: f64,
        fail: bool,
        calls: AtomicU64,
    }

    impl FakeOracle {
        fn pinned(rate: f64) -> Self {
            Self {
                rate,
                fail: false,
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl RateOracle for FakeOracle {
        async fn native_rate(&self, _fiat_currency: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(PaymentError::RateUnavailable("feed down".to_string()))
            } else {
                Ok(self.rate)
            }
        }
    }

    struct FakeRpc {
        lamports: u64,
        height: u64,
        last_valid: u64,
        confirm: bool,
        blockhashes: AtomicU64,
    }

    #[async_trait]
    impl ChainRpc for FakeRpc {
        async fn balance(&self, _account: &str) -> Result<Option<u64>> {
            Ok(Some(self.lamports))
        }

        async fn latest_blockhash(&self) -> Result<BlockhashInfo> {
            let n = self.blockhashes.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(BlockhashInfo {
                blockhash: format!("hash-{}", n),
                last_valid_block_height: self.last_valid,
            })
        }

        async fn block_height(&self) -> Result<u64> {
            Ok(self.height)
        }

        async fn signature_status(&self, _signature: &str) -> Result<SignatureStatus> {
            if self.confirm {
                Ok(SignatureStatus::Confirmed)
            } else {
                Ok(SignatureStatus::Processing)
            }
        }
    }

    struct FakeSigner {
        decline: bool,
        signed: Mutex<Vec<UnsignedTransfer>>,
    }

    impl FakeSigner {
        fn approving() -> Self {
            Self {
                decline: false,
                signed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TransferSigner for FakeSigner {
        async fn connect(&self) -> Result<String> {
            Ok(PAYER.to_string())
        }

        async fn sign_and_submit(&self, transfer: &UnsignedTransfer) -> Result<String> {
            if self.decline {
                return Err(PaymentError::SignerRejected("user declined".to_string()));
            }
            self.signed.lock().unwrap().push(transfer.clone());
            Ok(format!("sig-for-{}", transfer.recent_blockhash))
        }
    }

    struct FakeProvider {
        reject: bool,
    }

    #[async_trait]
    impl ProviderApi for FakeProvider {
        async fn profile(&self) -> Result<crate::provider::ProviderProfile> {
            Ok(crate::provider::ProviderProfile {
                id: 16,
                profile_type: "business".to_string(),
            })
        }

        async fn currencies(&self) -> Result<Vec<String>> {
            Ok(vec!["USD".to_string()])
        }

        async fn rate(&self, _source: &str, _target: &str) -> Result<f64> {
            Ok(1.0)
        }

        async fn create_quote(
            &self,
            request: &crate::provider::QuoteRequest,
        ) -> Result<crate::provider::ProviderQuote> {
            if self.reject {
                return Err(PaymentError::ProviderRejected {
                    status: 422,
                    body: "{\"errors\":[\"unprocessable\"]}".to_string(),
                });
            }
            Ok(crate::provider::ProviderQuote {
                id: 777,
                rate: 1.0,
                source_amount: request.source_amount,
                target_amount: request.source_amount,
            })
        }

        async fn create_transfer(
            &self,
            _request: &crate::provider::TransferRequest,
        ) -> Result<crate::provider::ProviderTransfer> {
            Ok(crate::provider::ProviderTransfer {
                id: 4242,
                status: Some("incoming_payment_waiting".to_string()),
            })
        }
    }

    struct Harness {
        orchestrator: PaymentOrchestrator,
        store: Arc<MemoryStore>,
        signer: Arc<FakeSigner>,
        oracle: Arc<FakeOracle>,
    }

    fn harness(oracle: FakeOracle, rpc: FakeRpc, signer: FakeSigner, provider: FakeProvider) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let oracle = Arc::new(oracle);
        let rpc = Arc::new(rpc);
        let signer = Arc::new(signer);

        let chain_rail = Arc::new(
            ChainRail::new(rpc.clone(), signer.clone())
                .with_poll_interval(Duration::from_millis(0)),
        );

        let orchestrator = PaymentOrchestrator::new(
            oracle.clone(),
            rpc.clone(),
            signer.clone(),
            Arc::new(provider),
            store.clone(),
        )
        .with_chain_rail(chain_rail)
        .with_balance_checker(
            BalanceChecker::new(rpc).with_retry_delay(Duration::from_millis(0)),
        );

        Harness {
            orchestrator,
            store,
            signer,
            oracle,
        }
    }

    fn rpc_with(lamports: u64) -> FakeRpc {
        FakeRpc {
            lamports,
            height: 50,
            last_valid: 100,
            confirm: true,
            blockhashes: AtomicU64::new(0),
        }
    }

    fn chain_request(fiat: f64) -> PaymentRequest {
        PaymentRequest::new("emp-1", RECIPIENT, Rail::OnChain, fiat, "USD", "salary").unwrap()
    }

    fn provider_request() -> PaymentRequest {
        PaymentRequest::new("emp-2", "333", Rail::Provider, 150.0, "USD", "salary").unwrap()
    }

    async fn record_count(store: &MemoryStore) -> usize {
        use crate::recorder::PaymentStore as _;
        store.list_payments().await.unwrap().len()
    }

    #[tokio::test]
    async fn test_chain_happy_path_completes_with_signature() {
        let h = harness(
            FakeOracle::pinned(20.0),
            rpc_with(100 * crate::types::LAMPORTS_PER_SOL),
            FakeSigner::approving(),
            FakeProvider { reject: false },
        );

        let receipt = h.orchestrator.execute(&chain_request(100.0)).await.unwrap();

        assert_eq!(receipt.status, PaymentStatus::Completed);
        assert_eq!(receipt.external_reference.as_deref(), Some("sig-for-hash-1"));
        assert_eq!(receipt.quote.as_ref().unwrap().native_amount, 5.0);

        let record = h.orchestrator.recorder().get(&receipt.record_id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        assert_eq!(record.external_reference.as_deref(), Some("sig-for-hash-1"));
    }

    #[tokio::test]
    async fn test_insufficient_funds_aborts_before_build_with_no_record() {
        let h = harness(
            FakeOracle::pinned(20.0),
            rpc_with(crate::types::LAMPORTS_PER_SOL), // 1.0 available
            FakeSigner::approving(),
            FakeProvider { reject: false },
        );

        // 30 USD at 20 USD/native needs 1.5 native.
        let err = h.orchestrator.execute(&chain_request(30.0)).await.unwrap_err();

        assert!(matches!(err, PaymentError::InsufficientFunds { .. }));
        assert_eq!(record_count(&h.store).await, 0);
        assert!(h.signer.signed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_failure_aborts_with_no_record() {
        let h = harness(
            FakeOracle {
                rate: 0.0,
                fail: true,
                calls: AtomicU64::new(0),
            },
            rpc_with(100 * crate::types::LAMPORTS_PER_SOL),
            FakeSigner::approving(),
            FakeProvider { reject: false },
        );

        let err = h.orchestrator.execute(&chain_request(100.0)).await.unwrap_err();
        assert!(matches!(err, PaymentError::RateUnavailable(_)));
        assert_eq!(record_count(&h.store).await, 0);
    }

    #[tokio::test]
    async fn test_invalid_recipient_aborts_with_no_record() {
        let h = harness(
            FakeOracle::pinned(20.0),
            rpc_with(100 * crate::types::LAMPORTS_PER_SOL),
            FakeSigner::approving(),
            FakeProvider { reject: false },
        );

        let request =
            PaymentRequest::new("emp-1", "not-an-address", Rail::OnChain, 10.0, "USD", "x")
                .unwrap();
        let err = h.orchestrator.execute(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::InvalidRecipient(_)));
        assert_eq!(record_count(&h.store).await, 0);
    }

    #[tokio::test]
    async fn test_signer_decline_leaves_failed_record() {
        let h = harness(
            FakeOracle::pinned(20.0),
            rpc_with(100 * crate::types::LAMPORTS_PER_SOL),
            FakeSigner {
                decline: true,
                signed: Mutex::new(Vec::new()),
            },
            FakeProvider { reject: false },
        );

        let err = h.orchestrator.execute(&chain_request(100.0)).await.unwrap_err();
        assert!(matches!(err, PaymentError::SignerRejected(_)));

        let records = h.orchestrator.recorder().list_payments().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PaymentStatus::Failed);
        assert!(records[0].external_reference.is_none());
    }

    #[tokio::test]
    async fn test_provider_rejection_leaves_failed_record_and_surfaces_payload() {
        let h = harness(
            FakeOracle::pinned(20.0),
            rpc_with(0),
            FakeSigner::approving(),
            FakeProvider { reject: true },
        );

        let err = h.orchestrator.execute(&provider_request()).await.unwrap_err();
        match err {
            PaymentError::ProviderRejected { status, body } => {
                assert_eq!(status, 422);
                assert!(body.contains("unprocessable"));
            }
            other => panic!("expected ProviderRejected, got {other}"),
        }

        let records = h.orchestrator.recorder().list_payments().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PaymentStatus::Failed);
        assert!(records[0].external_reference.is_none());

        // Provider rail never touches the oracle or the chain.
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_acceptance_stays_pending_with_reference() {
        let h = harness(
            FakeOracle::pinned(20.0),
            rpc_with(0),
            FakeSigner::approving(),
            FakeProvider { reject: false },
        );

        let receipt = h.orchestrator.execute(&provider_request()).await.unwrap();

        assert_eq!(receipt.status, PaymentStatus::Pending);
        assert_eq!(receipt.external_reference.as_deref(), Some("4242"));
        assert!(receipt.quote.is_none());

        let record = h.orchestrator.recorder().get(&receipt.record_id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_expiry_then_retry_uses_fresh_quote_and_reference_data() {
        let store = Arc::new(MemoryStore::new());
        let oracle = Arc::new(FakeOracle::pinned(20.0));
        let signer = Arc::new(FakeSigner::approving());

        // Chain already past the validity window and never confirming:
        // every submission expires.
        let rpc = Arc::new(FakeRpc {
            lamports: 100 * crate::types::LAMPORTS_PER_SOL,
            height: 200,
            last_valid: 100,
            confirm: false,
            blockhashes: AtomicU64::new(0),
        });

        let chain_rail = Arc::new(
            ChainRail::new(rpc.clone(), signer.clone())
                .with_poll_interval(Duration::from_millis(0)),
        );
        let orchestrator = PaymentOrchestrator::new(
            oracle.clone(),
            rpc.clone(),
            signer.clone(),
            Arc::new(FakeProvider { reject: false }),
            store.clone(),
        )
        .with_chain_rail(chain_rail)
        .with_balance_checker(
            BalanceChecker::new(rpc.clone()).with_retry_delay(Duration::from_millis(0)),
        );

        let request = chain_request(100.0);

        let err = orchestrator.execute(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::SubmissionExpired(_)));

        // Caller-initiated retry re-enters at Idle.
        let err = orchestrator.execute(&request).await.unwrap_err();
        assert!(matches!(err, PaymentError::SubmissionExpired(_)));

        // Two runs, two quotes, two distinct sets of reference data.
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
        let signed = signer.signed.lock().unwrap();
        assert_eq!(signed.len(), 2);
        assert_eq!(signed[0].recent_blockhash, "hash-1");
        assert_eq!(signed[1].recent_blockhash, "hash-2");

        // Both attempts left Failed records.
        use crate::recorder::PaymentStore as _;
        let records = store.list_payments().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.status == PaymentStatus::Failed));
    }

    #[tokio::test]
    async fn test_connected_balance_reads_payer_wallet() {
        let h = harness(
            FakeOracle::pinned(20.0),
            rpc_with(3 * crate::types::LAMPORTS_PER_SOL / 2),
            FakeSigner::approving(),
            FakeProvider { reject: false },
        );

        assert_eq!(h.orchestrator.connected_balance().await.unwrap(), 1.5);
    }
}
