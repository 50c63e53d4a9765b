//! ProcessWebhookHandler - Command handler for inbound provider notifications.
//!
//! The asynchronous half of reconciliation. Feeds webhook results into the
//! same reconcile function the synchronous charge path uses, so both paths
//! converge on one state regardless of delivery order.
//!
//! Processing order matters:
//! 1. verify the signature, before reading anything else from the body
//! 2. parse into a normalized notification
//! 3. drop replays of an event id already in the delivery store
//! 4. resolve the subscription tracking the charge
//! 5. reconcile under the optimistic lock
//! 6. publish side effects, then record the delivery
//!
//! The delivery is recorded last: a crash before the record means the
//! provider redelivers and the staleness check absorbs the repeat, whereas
//! recording first would lose the delivery forever on a crash.

use std::sync::Arc;

use crate::domain::foundation::{ErrorCode, SubscriptionId, Timestamp};
use crate::domain::payment::PaymentResult;
use crate::domain::subscription::{
    reconcile, ReconcileOutcome, Subscription, SubscriptionError, SubscriptionStatus,
};
use crate::ports::{
    EventPublisher, PaymentGateway, SaveResult, SubscriptionRepository, WebhookDelivery,
    WebhookEventRepository, WebhookNotification,
};

use super::publish_events;

/// Reload-and-retry budget when the row moves under us (the synchronous
/// path settling the same charge).
const RECONCILE_RETRY_ATTEMPTS: u32 = 3;

/// Command to process a raw webhook delivery.
#[derive(Debug, Clone)]
pub struct ProcessWebhookCommand {
    /// Raw body exactly as received; verified and parsed here, never
    /// upstream.
    pub payload: Vec<u8>,

    /// Provider signature header value.
    pub signature: String,
}

/// Result of webhook processing.
///
/// Everything here answers HTTP 200; only signature and parse failures
/// surface as errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessWebhookResult {
    /// The payment fact advanced the subscription.
    Applied {
        subscription_id: SubscriptionId,
        status: SubscriptionStatus,
    },

    /// This event id was delivered before; answered from the record.
    AlreadyProcessed { event_id: String },

    /// Status ordering discarded the result (equal or older than what the
    /// same charge already recorded).
    Discarded { subscription_id: SubscriptionId },

    /// Structurally valid but not actionable, e.g. a charge no
    /// subscription tracks.
    Ignored { reason: String },

    /// Reconciliation rejected the result; recorded for manual inspection.
    Failed { reason: String },
}

/// Handler for inbound payment provider webhooks.
pub struct ProcessWebhookHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    webhook_events: Arc<dyn WebhookEventRepository>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl ProcessWebhookHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            gateway,
            webhook_events,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessWebhookCommand,
    ) -> Result<ProcessWebhookResult, SubscriptionError> {
        let now = Timestamp::now();

        // 1. Authenticate the delivery before touching any state
        self.gateway
            .verify_webhook_signature(&cmd.payload, &cmd.signature, now)
            .map_err(|err| {
                tracing::warn!(error = %err, "webhook signature verification failed");
                SubscriptionError::from(err)
            })?;

        // 2. Normalize the payload
        let notification = self.gateway.parse_webhook(&cmd.payload).map_err(|err| {
            tracing::warn!(error = %err, "webhook payload rejected as malformed");
            SubscriptionError::from(err)
        })?;
        let payload_json: serde_json::Value =
            serde_json::from_slice(&cmd.payload).unwrap_or(serde_json::Value::Null);

        // 3. Drop replays of an already-recorded event id
        if let Some(previous) = self
            .webhook_events
            .find_by_event_id(&notification.event_id)
            .await?
        {
            tracing::debug!(
                event_id = %notification.event_id,
                outcome = %previous.outcome,
                "webhook replay dropped"
            );
            return Ok(ProcessWebhookResult::AlreadyProcessed {
                event_id: notification.event_id,
            });
        }

        let result = &notification.result;

        // 4. Resolve the subscription tracking this charge
        let subscription = match self
            .repository
            .find_by_external_id(&result.external_id)
            .await?
        {
            Some(subscription) => subscription,
            None => {
                let reason = format!("no subscription tracks charge {}", result.external_id);
                tracing::warn!(
                    event_id = %notification.event_id,
                    external_id = %result.external_id,
                    payment_status = %result.status,
                    "webhook for unknown charge"
                );
                self.record(WebhookDelivery::ignored(
                    &notification.event_id,
                    &notification.event_type,
                    payload_json,
                    &reason,
                ))
                .await?;
                return Ok(ProcessWebhookResult::Ignored { reason });
            }
        };

        // 5. Reconcile under the optimistic lock
        match self.apply_with_retry(subscription, result, now).await {
            Ok(ReconcileOutcome::Applied {
                subscription,
                events,
            }) => {
                tracing::info!(
                    event_id = %notification.event_id,
                    subscription_id = %subscription.id,
                    payment_status = %result.status,
                    subscription_status = %subscription.status,
                    "webhook reconciled"
                );

                // 6. Side effects first, delivery record last
                publish_events(self.event_publisher.as_ref(), &events).await?;
                self.record(WebhookDelivery::processed(
                    &notification.event_id,
                    &notification.event_type,
                    payload_json,
                ))
                .await?;

                Ok(ProcessWebhookResult::Applied {
                    subscription_id: subscription.id,
                    status: subscription.status,
                })
            }
            Ok(ReconcileOutcome::Stale { subscription }) => {
                self.log_stale(&notification, &subscription);
                self.record(WebhookDelivery::ignored(
                    &notification.event_id,
                    &notification.event_type,
                    payload_json,
                    format!(
                        "stale {} for charge {}",
                        result.status, result.external_id
                    ),
                ))
                .await?;

                Ok(ProcessWebhookResult::Discarded {
                    subscription_id: subscription.id,
                })
            }
            Err(err) if is_business_rejection(&err) => {
                tracing::warn!(
                    event_id = %notification.event_id,
                    external_id = %result.external_id,
                    error = %err,
                    "webhook result rejected by reconciliation"
                );
                self.record(WebhookDelivery::failed(
                    &notification.event_id,
                    &notification.event_type,
                    payload_json,
                    err.to_string(),
                ))
                .await?;

                Ok(ProcessWebhookResult::Failed {
                    reason: err.to_string(),
                })
            }
            // Infrastructure errors stay errors: the delivery was not
            // recorded, so the provider's retry will reprocess it.
            Err(err) => Err(err),
        }
    }

    async fn apply_with_retry(
        &self,
        subscription: Subscription,
        result: &PaymentResult,
        now: Timestamp,
    ) -> Result<ReconcileOutcome, SubscriptionError> {
        let id = subscription.id;
        let mut current = subscription;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match reconcile(&current, result, now)? {
                ReconcileOutcome::Stale { subscription } => {
                    return Ok(ReconcileOutcome::Stale { subscription });
                }
                ReconcileOutcome::Applied {
                    subscription,
                    events,
                } => match self.repository.update(&subscription).await {
                    Ok(()) => {
                        return Ok(ReconcileOutcome::Applied {
                            subscription,
                            events,
                        });
                    }
                    Err(err)
                        if err.code == ErrorCode::ConcurrencyConflict
                            && attempts < RECONCILE_RETRY_ATTEMPTS =>
                    {
                        tracing::debug!(
                            subscription_id = %id,
                            attempts,
                            "version conflict while reconciling, reloading"
                        );
                        current = self
                            .repository
                            .find_by_id(&id)
                            .await?
                            .ok_or_else(|| SubscriptionError::not_found(id))?;
                    }
                    Err(err) => return Err(err.into()),
                },
            }
        }
    }

    async fn record(&self, delivery: WebhookDelivery) -> Result<(), SubscriptionError> {
        match self.webhook_events.save(&delivery).await? {
            SaveResult::Inserted => Ok(()),
            SaveResult::AlreadyExists => {
                tracing::debug!(
                    event_id = %delivery.event_id,
                    "delivery recorded by a concurrent worker"
                );
                Ok(())
            }
        }
    }

    /// A discarded final status that disagrees with another final status is
    /// a provider-side anomaly worth an operator's eyes; a plain replay is
    /// routine.
    fn log_stale(&self, notification: &WebhookNotification, subscription: &Subscription) {
        let incoming = notification.result.status;
        let conflicting = subscription.last_payment_status.is_some_and(|recorded| {
            recorded.is_final() && incoming.is_final() && recorded != incoming
        });
        if conflicting {
            tracing::warn!(
                event_id = %notification.event_id,
                subscription_id = %subscription.id,
                recorded = ?subscription.last_payment_status,
                incoming = %incoming,
                "conflicting settlement discarded by status ordering"
            );
        } else {
            tracing::debug!(
                event_id = %notification.event_id,
                subscription_id = %subscription.id,
                incoming = %incoming,
                "stale webhook result discarded"
            );
        }
    }
}

fn is_business_rejection(err: &SubscriptionError) -> bool {
    matches!(
        err,
        SubscriptionError::InvalidState { .. } | SubscriptionError::PriceMismatch { .. }
    )
}
