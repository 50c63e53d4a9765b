//! Event publisher port.
//!
//! Lifecycle events (activation, suspension, renewal, ...) are published
//! after the subscription row is committed, driving tenant notifications
//! and billing-history projections. Publication is downstream of the
//! source of truth: a lost event never rolls back a state change.

use crate::domain::foundation::{DomainError, EventEnvelope};
use async_trait::async_trait;

/// Port for publishing domain events to downstream consumers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a single event envelope.
    async fn publish(&self, envelope: EventEnvelope) -> Result<(), DomainError>;

    /// Publishes a batch in order. One reconciliation can emit several
    /// events (e.g. plan change: cancellation plus creation).
    async fn publish_all(&self, envelopes: Vec<EventEnvelope>) -> Result<(), DomainError>;
}
