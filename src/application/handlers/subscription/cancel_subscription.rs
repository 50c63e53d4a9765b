//! CancelSubscriptionHandler - Command handler for tenant-requested cancellation.
//!
//! Cancellation is immediate in the lifecycle (`ativa`/`suspensa` →
//! `cancelada`) but access on an already-paid period continues until
//! `current_period_end`. A cancelled row is absorbing: late webhooks for
//! it are discarded during reconciliation.

use std::sync::Arc;

use crate::domain::foundation::{ErrorCode, EventId, SubscriptionId, Timestamp};
use crate::domain::subscription::{
    Subscription, SubscriptionError, SubscriptionEvent, SubscriptionStatus,
};
use crate::ports::{EventPublisher, SubscriptionRepository};

use super::publish_events;

/// Reload-and-retry budget when the row is being reconciled concurrently
/// (e.g. a renewal webhook landing mid-cancel).
const CANCEL_RETRY_ATTEMPTS: u32 = 3;

/// Command to cancel a subscription.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub subscription_id: SubscriptionId,
}

/// Result of a successful cancellation.
#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: Subscription,

    /// End of the already-paid period, when access continues until then.
    /// None when nothing was paid (free plans, suspended-before-activation).
    pub access_until: Option<Timestamp>,
}

/// Handler for cancelling subscriptions.
pub struct CancelSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        let now = Timestamp::now();

        // 1. Load and guard the subscription
        let subscription = self
            .repository
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.subscription_id))?;

        if matches!(
            subscription.status,
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired
        ) {
            return Err(SubscriptionError::retired(subscription.id));
        }

        // 2. Cancel and persist, reloading on version conflicts
        let cancelled = self.cancel_with_retry(subscription, now).await?;
        let access_until = cancelled.current_period_end;

        tracing::info!(
            subscription_id = %cancelled.id,
            tenant_id = %cancelled.tenant_id,
            access_until = ?access_until,
            "subscription cancelled"
        );

        // 3. Publish the cancellation event
        let events = vec![SubscriptionEvent::Cancelled {
            event_id: EventId::new(),
            subscription_id: cancelled.id,
            tenant_id: cancelled.tenant_id,
            access_until,
            occurred_at: now,
        }];
        publish_events(self.event_publisher.as_ref(), &events).await?;

        Ok(CancelSubscriptionResult {
            subscription: cancelled,
            access_until,
        })
    }

    async fn cancel_with_retry(
        &self,
        subscription: Subscription,
        now: Timestamp,
    ) -> Result<Subscription, SubscriptionError> {
        let id = subscription.id;
        let mut current = subscription;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let cancelled = current.cancelled(now)?;
            match self.repository.update(&cancelled).await {
                Ok(()) => return Ok(cancelled),
                Err(err)
                    if err.code == ErrorCode::ConcurrencyConflict
                        && attempts < CANCEL_RETRY_ATTEMPTS =>
                {
                    tracing::debug!(
                        subscription_id = %id,
                        attempts,
                        "version conflict while cancelling, reloading"
                    );
                    current = self
                        .repository
                        .find_by_id(&id)
                        .await?
                        .ok_or_else(|| SubscriptionError::not_found(id))?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
