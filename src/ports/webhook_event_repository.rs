//! Webhook delivery store port.
//!
//! The payment provider delivers notifications at least once, so every
//! delivery is recorded by its provider event id before side effects are
//! acknowledged. A redelivery finds the existing record and is answered
//! without reprocessing.

use crate::domain::foundation::{DomainError, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A recorded webhook delivery and how it was handled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    /// Provider's event id; unique per delivery, the deduplication key.
    pub event_id: String,

    /// Provider's event type (e.g. "payment.updated").
    pub event_type: String,

    /// When we finished handling the delivery.
    pub received_at: Timestamp,

    /// Handling outcome: "processed", "ignored", or "failed".
    pub outcome: String,

    /// Why the delivery was ignored or how it failed.
    pub detail: Option<String>,

    /// Raw payload as received, for replay and audit.
    pub payload: serde_json::Value,
}

impl WebhookDelivery {
    pub const OUTCOME_PROCESSED: &'static str = "processed";
    pub const OUTCOME_IGNORED: &'static str = "ignored";
    pub const OUTCOME_FAILED: &'static str = "failed";

    /// Delivery applied to a subscription.
    pub fn processed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        WebhookDelivery {
            event_id: event_id.into(),
            event_type: event_type.into(),
            received_at: Timestamp::now(),
            outcome: Self::OUTCOME_PROCESSED.to_string(),
            detail: None,
            payload,
        }
    }

    /// Delivery acknowledged without effect (stale result, unknown charge,
    /// uninteresting event type).
    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        reason: impl Into<String>,
    ) -> Self {
        WebhookDelivery {
            event_id: event_id.into(),
            event_type: event_type.into(),
            received_at: Timestamp::now(),
            outcome: Self::OUTCOME_IGNORED.to_string(),
            detail: Some(reason.into()),
            payload,
        }
    }

    /// Delivery that hit an internal error; recorded so operators can
    /// replay it after the fault is fixed.
    pub fn failed(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        error: impl Into<String>,
    ) -> Self {
        WebhookDelivery {
            event_id: event_id.into(),
            event_type: event_type.into(),
            received_at: Timestamp::now(),
            outcome: Self::OUTCOME_FAILED.to_string(),
            detail: Some(error.into()),
            payload,
        }
    }

    pub fn was_processed(&self) -> bool {
        self.outcome == Self::OUTCOME_PROCESSED
    }
}

/// Result of persisting a delivery record.
///
/// Two workers can race on the same redelivered event; the unique
/// constraint on `event_id` makes exactly one insert win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// This worker recorded the delivery first.
    Inserted,
    /// Another worker already recorded it; treat as a duplicate.
    AlreadyExists,
}

/// Port for the webhook delivery store.
#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Looks up a delivery by the provider's event id.
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookDelivery>, DomainError>;

    /// Records a delivery. Must be atomic with respect to the unique
    /// event id: a concurrent duplicate yields `AlreadyExists`, never an
    /// error and never a second row.
    async fn save(&self, delivery: &WebhookDelivery) -> Result<SaveResult, DomainError>;

    /// Deletes records older than the cutoff. Returns how many were
    /// removed. Retention job only.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}
