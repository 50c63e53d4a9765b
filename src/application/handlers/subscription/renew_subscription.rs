//! RenewSubscriptionHandler - Command handler for billing the next period.
//!
//! Also the recovery path for `suspensa` subscriptions: an approved retry
//! reconciles to `ativa` through the same state machine.

use std::sync::Arc;

use crate::domain::foundation::{SubscriptionId, Timestamp};
use crate::domain::payment::{IdempotencyKey, PaymentRequest, PaymentStatus};
use crate::domain::subscription::{
    reconcile, ReconcileOutcome, Subscription, SubscriptionError, SubscriptionStatus,
};
use crate::ports::{EventPublisher, PaymentGateway, SubscriptionRepository};

use super::charge_execution::{charge_with_retry, ChargeAttempt};
use super::publish_events;

const DEFAULT_CHARGE_ATTEMPTS: u32 = 3;

/// Command to charge a subscription for its next billing period.
#[derive(Debug, Clone)]
pub struct RenewSubscriptionCommand {
    pub subscription_id: SubscriptionId,
    /// Fresh tokenized card; required iff the stored method is credit_card.
    pub card_token: Option<String>,
    pub payer_email: String,
    pub payer_tax_id: Option<String>,
}

/// How the renewal settled on the synchronous path.
#[derive(Debug, Clone, PartialEq)]
pub enum RenewSubscriptionOutcome {
    /// Approved; the paid period was extended.
    Renewed,

    /// Approved on a `suspensa` subscription; access restored.
    Reactivated,

    /// The provider replayed a charge already reconciled onto this row
    /// (idempotency key hit); nothing changed.
    AlreadyApplied,

    /// Charge accepted but not settled; confirmation arrives by webhook.
    PendingConfirmation,

    /// Provider declined; the attempt is recorded, access unchanged until
    /// the grace period runs out.
    Declined { reason: Option<String> },
}

/// Result of a renewal attempt.
#[derive(Debug, Clone)]
pub struct RenewSubscriptionResult {
    pub subscription: Subscription,
    pub outcome: RenewSubscriptionOutcome,
}

/// Handler for renewing subscriptions.
///
/// The idempotency key is anchored at the period boundary being billed, so
/// a double-submitted renewal (cron overlap, operator retry) reuses the key
/// and the provider answers with the original charge instead of a second
/// one.
pub struct RenewSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    event_publisher: Arc<dyn EventPublisher>,
    max_charge_attempts: u32,
}

impl RenewSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            gateway,
            event_publisher,
            max_charge_attempts: DEFAULT_CHARGE_ATTEMPTS,
        }
    }

    pub fn with_max_charge_attempts(mut self, attempts: u32) -> Self {
        self.max_charge_attempts = attempts.max(1);
        self
    }

    pub async fn handle(
        &self,
        cmd: RenewSubscriptionCommand,
    ) -> Result<RenewSubscriptionResult, SubscriptionError> {
        // 1. Load and guard the subscription
        let subscription = self
            .repository
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.subscription_id))?;

        if subscription.is_free() {
            return Err(SubscriptionError::validation(
                "subscription",
                "free subscriptions have no billing period to renew",
            ));
        }
        match subscription.status {
            SubscriptionStatus::Active | SubscriptionStatus::Suspended => {}
            SubscriptionStatus::Pending => {
                return Err(SubscriptionError::invalid_state("pendente", "renew"));
            }
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
                return Err(SubscriptionError::retired(subscription.id));
            }
        }
        let previous_status = subscription.status;

        // 2. Charge the stored amount for the period opening at the current
        //    period boundary; same boundary, same key
        let request = self.build_charge_request(&cmd, &subscription)?;
        let period_anchor = subscription
            .current_period_end
            .unwrap_or(subscription.created_at);
        let idempotency_key = IdempotencyKey::for_billing_period(&subscription.id, &period_anchor);

        let attempt = charge_with_retry(
            &self.gateway,
            &request,
            &idempotency_key,
            self.max_charge_attempts,
        )
        .await?;

        let result = match attempt {
            ChargeAttempt::Completed(result) => result,
            ChargeAttempt::Unresolved => {
                tracing::info!(
                    subscription_id = %subscription.id,
                    "renewal charge unresolved, awaiting provider confirmation"
                );
                return Ok(RenewSubscriptionResult {
                    subscription,
                    outcome: RenewSubscriptionOutcome::PendingConfirmation,
                });
            }
        };

        // 3. Reconcile and persist
        let outcome = reconcile(&subscription, &result, Timestamp::now())?;
        if outcome.is_stale() {
            tracing::info!(
                subscription_id = %subscription.id,
                external_id = %result.external_id,
                "provider replayed an already-reconciled charge, no changes"
            );
            return Ok(RenewSubscriptionResult {
                subscription,
                outcome: RenewSubscriptionOutcome::AlreadyApplied,
            });
        }
        let (subscription, events) = outcome.into_parts();
        self.repository.update(&subscription).await?;
        publish_events(self.event_publisher.as_ref(), &events).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            payment_status = %result.status,
            "renewal charge reconciled"
        );

        // 4. Name the business outcome from the state change
        let outcome = match (previous_status, subscription.status) {
            (SubscriptionStatus::Suspended, SubscriptionStatus::Active) => {
                RenewSubscriptionOutcome::Reactivated
            }
            (SubscriptionStatus::Active, SubscriptionStatus::Active) if result.is_approved() => {
                RenewSubscriptionOutcome::Renewed
            }
            (_, SubscriptionStatus::Suspended) => RenewSubscriptionOutcome::Declined {
                reason: result.error_message.clone(),
            },
            _ => match result.status {
                PaymentStatus::Pending | PaymentStatus::InProcess => {
                    RenewSubscriptionOutcome::PendingConfirmation
                }
                _ => RenewSubscriptionOutcome::Declined {
                    reason: result.error_message.clone(),
                },
            },
        };

        Ok(RenewSubscriptionResult {
            subscription,
            outcome,
        })
    }

    fn build_charge_request(
        &self,
        cmd: &RenewSubscriptionCommand,
        subscription: &Subscription,
    ) -> Result<PaymentRequest, SubscriptionError> {
        let mut builder =
            PaymentRequest::builder(subscription.amount, subscription.payment_method)
                .description(format!("Renovação de assinatura ({})", subscription.cycle))
                .payer_email(cmd.payer_email.clone())
                .external_reference(subscription.id.to_string())
                .metadata_entry("tenant_id", subscription.tenant_id.to_string())
                .metadata_entry("plan_id", subscription.plan_id.to_string());

        if let Some(token) = &cmd.card_token {
            builder = builder.card_token(token.clone());
        }
        if let Some(tax_id) = &cmd.payer_tax_id {
            builder = builder.payer_tax_id(tax_id.clone());
        }

        Ok(builder.build()?)
    }
}
