//! Durable payment records and the recorder that owns their lifecycle.
//!
//! Records live in a document store reached through the narrow [`PaymentStore`]
//! CRUD trait; the store itself is a black box. [`PaymentRecorder`] is the
//! only writer: it creates exactly one record per orchestration attempt and
//! applies the only allowed mutations: `Pending → Completed`,
//! `Pending → Failed`, and attaching an external reference while `Pending`.
//! Records are never deleted by the core; `delete_payment` exists on the
//! trait for operator tooling only.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::errors::{PaymentError, Result};
use crate::types::{PaymentRecord, PaymentStatus, Rail};

/// Generates a random 16-byte hex identifier.
///
/// # Examples
///
/// ```
/// use payrail::recorder::generate_id;
///
/// let id = generate_id();
/// assert_eq!(id.len(), 32);
/// ```
pub fn generate_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.gen();
    hex::encode(bytes)
}

/// Narrow CRUD interface over the payment document store.
///
/// Implementations are keyed by opaque string identifiers and must be safe
/// to share across concurrent attempts.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// All payment records, newest first.
    async fn list_payments(&self) -> Result<Vec<PaymentRecord>>;

    /// One record by id, if it exists.
    async fn get_payment(&self, id: &str) -> Result<Option<PaymentRecord>>;

    /// Persists a new record under its id.
    async fn create_payment(&self, record: &PaymentRecord) -> Result<()>;

    /// Replaces the stored fields of an existing record.
    async fn update_payment(&self, record: &PaymentRecord) -> Result<()>;

    /// Removes a record. Operator tooling only, never called by the core.
    async fn delete_payment(&self, id: &str) -> Result<()>;
}

/// In-memory payment store.
///
/// The default backing store for tests and single-process deployments.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, PaymentRecord>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn list_payments(&self) -> Result<Vec<PaymentRecord>> {
        let records = self.records.read().await;
        let mut all: Vec<PaymentRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn get_payment(&self, id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn create_payment(&self, record: &PaymentRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(PaymentError::Other(format!(
                "record {} already exists",
                record.id
            )));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_payment(&self, record: &PaymentRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if !records.contains_key(&record.id) {
            return Err(PaymentError::Other(format!(
                "record {} does not exist",
                record.id
            )));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn delete_payment(&self, id: &str) -> Result<()> {
        self.records.write().await.remove(id);
        Ok(())
    }
}

/// Fields of a payment record known before settlement begins.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    /// Recipient the payment is for
    pub recipient_id: String,

    /// Fiat amount of the payment
    pub amount: f64,

    /// Rail the payment settles on
    pub rail: Rail,

    /// Human-readable purpose
    pub description: String,
}

/// Exclusive owner of the payment record lifecycle.
///
/// The orchestrator requests creation and status transitions; everything
/// else about a record's life happens here.
#[derive(Clone)]
pub struct PaymentRecorder {
    store: Arc<dyn PaymentStore>,
}

impl PaymentRecorder {
    /// Creates a recorder over the given store.
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    /// Creates the one `Pending` record for an orchestration attempt.
    ///
    /// Called before the submission side effect so a crash mid-settlement
    /// still leaves a recoverable trail.
    pub async fn create(&self, new: NewPayment) -> Result<PaymentRecord> {
        let record = PaymentRecord {
            id: generate_id(),
            recipient_id: new.recipient_id,
            amount: new.amount,
            rail: new.rail,
            status: PaymentStatus::Pending,
            external_reference: None,
            created_at: Utc::now(),
            description: new.description,
        };

        self.store
            .create_payment(&record)
            .await
            .map_err(|e| PaymentError::RecordingFailed {
                reference: None,
                message: format!("creating record: {}", e),
            })?;

        info!(record_id = %record.id, rail = %record.rail, "payment record created");
        Ok(record)
    }

    /// Applies a status transition, attaching the external reference.
    ///
    /// Passing [`PaymentStatus::Pending`] attaches a reference without
    /// finalizing (provider acceptance). Repeating a terminal transition
    /// with identical arguments is a no-op, so the recording step itself can
    /// be retried safely. A conflicting terminal transition is refused.
    pub async fn transition(
        &self,
        id: &str,
        status: PaymentStatus,
        external_reference: Option<String>,
    ) -> Result<PaymentRecord> {
        let mut record = self
            .store
            .get_payment(id)
            .await
            .map_err(|e| PaymentError::RecordingFailed {
                reference: external_reference.clone(),
                message: format!("loading record {}: {}", id, e),
            })?
            .ok_or_else(|| PaymentError::RecordingFailed {
                reference: external_reference.clone(),
                message: format!("record {} not found", id),
            })?;

        let effective_reference = external_reference
            .clone()
            .or_else(|| record.external_reference.clone());

        if record.status.is_terminal() {
            if record.status == status && record.external_reference == effective_reference {
                debug!(record_id = %id, %status, "transition already applied");
                return Ok(record);
            }
            return Err(PaymentError::RecordingFailed {
                reference: record.external_reference.clone(),
                message: format!(
                    "record {} is already {} and cannot become {}",
                    id, record.status, status
                ),
            });
        }

        record.status = status;
        record.external_reference = effective_reference;

        self.store
            .update_payment(&record)
            .await
            .map_err(|e| PaymentError::RecordingFailed {
                reference: record.external_reference.clone(),
                message: format!("updating record {}: {}", id, e),
            })?;

        info!(record_id = %id, %status, reference = ?record.external_reference, "payment record transitioned");
        Ok(record)
    }

    /// One record by id.
    pub async fn get(&self, id: &str) -> Result<Option<PaymentRecord>> {
        self.store.get_payment(id).await
    }

    /// All records, newest first.
    pub async fn list_payments(&self) -> Result<Vec<PaymentRecord>> {
        self.store.list_payments().await
    }

    /// The most recent records, newest first.
    pub async fn recent_payments(&self, limit: usize) -> Result<Vec<PaymentRecord>> {
        let mut all = self.store.list_payments().await?;
        all.truncate(limit);
        Ok(all)
    }

    /// Records for one recipient, newest first.
    pub async fn payments_for_recipient(&self, recipient_id: &str) -> Result<Vec<PaymentRecord>> {
        let all = self.store.list_payments().await?;
        Ok(all
            .into_iter()
            .filter(|record| record.recipient_id == recipient_id)
            .collect())
    }
}
