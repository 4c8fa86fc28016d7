//! Recipient directory.
//!
//! Recipients carry their configured settlement rail and the rail-specific
//! destinations. The directory lives in the same document store family as
//! payment records and is reached through the narrow [`RecipientStore`]
//! trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::{PaymentError, Result};
use crate::types::{PaymentRequest, Rail};

/// A payee and their settlement configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Recipient {
    /// Directory identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Rail this recipient is paid on
    #[serde(rename = "paymentMethod")]
    pub rail: Rail,

    /// Chain address, required for the on-chain rail
    #[serde(rename = "chainAddress", skip_serializing_if = "Option::is_none")]
    pub chain_address: Option<String>,

    /// Provider account reference, required for the provider rail
    #[serde(rename = "providerAccount", skip_serializing_if = "Option::is_none")]
    pub provider_account: Option<String>,

    /// Currency the recipient is paid in
    pub currency: String,
}

impl Recipient {
    /// Destination identifier for the recipient's configured rail.
    pub fn destination(&self) -> Option<&str> {
        match self.rail {
            Rail::OnChain => self.chain_address.as_deref(),
            Rail::Provider => self.provider_account.as_deref(),
        }
    }

    /// Builds a validated payment request for this recipient.
    ///
    /// The description defaults to `Payment to <name>` when none is given,
    /// and the request inherits the recipient's rail and currency.
    ///
    /// # Examples
    ///
    /// ```
    /// use payrail::recipients::Recipient;
    /// use payrail::types::Rail;
    ///
    /// let maya = Recipient {
    ///     id: "emp-7".to_string(),
    ///     name: "Maya".to_string(),
    ///     rail: Rail::OnChain,
    ///     chain_address: Some("11111111111111111111111111111111".to_string()),
    ///     provider_account: None,
    ///     currency: "USD".to_string(),
    /// };
    ///
    /// let request = maya.payment_request(250.0, None).unwrap();
    /// assert_eq!(request.description, "Payment to Maya");
    /// ```
    pub fn payment_request(
        &self,
        fiat_amount: f64,
        description: Option<&str>,
    ) -> Result<PaymentRequest> {
        let destination = self.destination().ok_or_else(|| {
            PaymentError::InvalidRecipient(format!(
                "{} has no {} destination configured",
                self.name, self.rail
            ))
        })?;

        let description = match description {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => format!("Payment to {}", self.name),
        };

        PaymentRequest::new(
            self.id.clone(),
            destination,
            self.rail,
            fiat_amount,
            self.currency.clone(),
            description,
        )
    }
}

/// Narrow CRUD interface over the recipient directory.
#[async_trait]
pub trait RecipientStore: Send + Sync {
    /// All recipients.
    async fn list_recipients(&self) -> Result<Vec<Recipient>>;

    /// One recipient by id, if present.
    async fn get_recipient(&self, id: &str) -> Result<Option<Recipient>>;

    /// Persists a new recipient under its id.
    async fn create_recipient(&self, recipient: &Recipient) -> Result<()>;

    /// Replaces the stored fields of an existing recipient.
    async fn update_recipient(&self, recipient: &Recipient) -> Result<()>;

    /// Removes a recipient.
    async fn delete_recipient(&self, id: &str) -> Result<()>;
}

/// In-memory recipient directory.
#[derive(Clone, Default)]
pub struct MemoryRecipientStore {
    recipients: Arc<RwLock<HashMap<String, Recipient>>>,
}

impl MemoryRecipientStore {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipientStore for MemoryRecipientStore {
    async fn list_recipients(&self) -> Result<Vec<Recipient>> {
        let recipients = self.recipients.read().await;
        let mut all: Vec<Recipient> = recipients.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn get_recipient(&self, id: &str) -> Result<Option<Recipient>> {
        Ok(self.recipients.read().await.get(id).cloned())
    }

    async fn create_recipient(&self, recipient: &Recipient) -> Result<()> {
        let mut recipients = self.recipients.write().await;
        if recipients.contains_key(&recipient.id) {
            return Err(PaymentError::Other(format!(
                "recipient {} already exists",
                recipient.id
            )));
        }
        recipients.insert(recipient.id.clone(), recipient.clone());
        Ok(())
    }

    async fn update_recipient(&self, recipient: &Recipient) -> Result<()> {
        let mut recipients = self.recipients.write().await;
        if !recipients.contains_key(&recipient.id) {
            return Err(PaymentError::Other(format!(
                "recipient {} does not exist",
                recipient.id
            )));
        }
        recipients.insert(recipient.id.clone(), recipient.clone());
        Ok(())
    }

    async fn delete_recipient(&self, id: &str) -> Result<()> {
        self.recipients.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maya() -> Recipient {
        Recipient {
            id: "emp-7".to_string(),
            name: "Maya".to_string(),
            rail: Rail::OnChain,
            chain_address: Some("11111111111111111111111111111111".to_string()),
            provider_account: None,
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn test_destination_follows_rail() {
        let mut recipient = maya();
        assert_eq!(
            recipient.destination(),
            Some("11111111111111111111111111111111")
        );

        recipient.rail = Rail::Provider;
        assert!(recipient.destination().is_none());

        recipient.provider_account = Some("333".to_string());
        assert_eq!(recipient.destination(), Some("333"));
    }

    #[test]
    fn test_payment_request_defaults_description() {
        let request = maya().payment_request(250.0, None).unwrap();
        assert_eq!(request.description, "Payment to Maya");
        assert_eq!(request.rail, Rail::OnChain);
        assert_eq!(request.fiat_currency, "USD");

        let request = maya().payment_request(250.0, Some("March invoice")).unwrap();
        assert_eq!(request.description, "March invoice");
    }

    #[test]
    fn test_payment_request_requires_destination_for_rail() {
        let mut recipient = maya();
        recipient.rail = Rail::Provider;
        let err = recipient.payment_request(250.0, None).unwrap_err();
        assert!(matches!(err, PaymentError::InvalidRecipient(_)));
    }

    #[test]
    fn test_recipient_serialization_field_names() {
        let json = serde_json::to_string(&maya()).unwrap();
        assert!(json.contains("\"paymentMethod\":\"on-chain\""));
        assert!(json.contains("\"chainAddress\""));
        assert!(!json.contains("\"providerAccount\"")); // skipped when unset
    }

    #[tokio::test]
    async fn test_directory_crud() {
        let store = MemoryRecipientStore::new();
        store.create_recipient(&maya()).await.unwrap();

        assert!(store.create_recipient(&maya()).await.is_err());

        let mut updated = maya();
        updated.currency = "EUR".to_string();
        store.update_recipient(&updated).await.unwrap();

        let loaded = store.get_recipient("emp-7").await.unwrap().unwrap();
        assert_eq!(loaded.currency, "EUR");

        store.delete_recipient("emp-7").await.unwrap();
        assert!(store.get_recipient("emp-7").await.unwrap().is_none());
    }
}
