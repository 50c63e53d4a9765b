//! ChangePlanHandler - Command handler for moving a tenant to another plan.
//!
//! A plan change never mutates the existing row. The current subscription
//! is cancelled (retaining its audit trail), a replacement is created, and
//! the unused remainder of the old period is credited against the new
//! plan's price before the fresh charge goes out. Billing history stays a
//! faithful record of what was actually charged for which period.

use std::sync::Arc;

use crate::domain::foundation::{
    ErrorCode, EventId, Money, PlanId, SubscriptionId, Timestamp,
};
use crate::domain::payment::{IdempotencyKey, PaymentMethod, PaymentRequest};
use crate::domain::subscription::{
    proration_credit, reconcile, BillingCycle, ReconcileOutcome, Subscription, SubscriptionError,
    SubscriptionEvent, SubscriptionStatus,
};
use crate::ports::{EventPublisher, PaymentGateway, PlanCatalog, SubscriptionRepository};

use super::charge_execution::{charge_with_retry, ChargeAttempt};
use super::publish_events;

const DEFAULT_GRACE_PERIOD_DAYS: u16 = 7;

const DEFAULT_CHARGE_ATTEMPTS: u32 = 3;

/// Reload-and-retry budget when the old row is being reconciled
/// concurrently (e.g. a renewal webhook landing mid-change).
const CANCEL_RETRY_ATTEMPTS: u32 = 3;

/// Command to move a subscription to a different plan or cycle.
#[derive(Debug, Clone)]
pub struct ChangePlanCommand {
    pub subscription_id: SubscriptionId,
    pub new_plan_id: PlanId,
    pub cycle: BillingCycle,
    pub payment_method: PaymentMethod,
    pub card_token: Option<String>,
    pub payer_email: String,
    pub payer_tax_id: Option<String>,
}

/// How the replacement subscription settled on the synchronous path.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangePlanOutcome {
    /// New plan active (approved charge, or free target plan).
    Activated,

    /// Charge accepted but not settled; confirmation arrives by webhook.
    PendingConfirmation,

    /// Provider declined the charge for the new plan.
    Declined { reason: Option<String> },
}

/// Result of a plan change.
#[derive(Debug, Clone)]
pub struct ChangePlanResult {
    /// The replacement subscription.
    pub subscription: Subscription,

    /// The cancelled predecessor.
    pub previous_subscription_id: SubscriptionId,

    /// Unused value of the old period applied against the new price.
    pub credit_applied: Money,

    pub outcome: ChangePlanOutcome,
}

/// Handler for plan changes.
pub struct ChangePlanHandler {
    repository: Arc<dyn SubscriptionRepository>,
    plan_catalog: Arc<dyn PlanCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    event_publisher: Arc<dyn EventPublisher>,
    max_charge_attempts: u32,
}

impl ChangePlanHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        plan_catalog: Arc<dyn PlanCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            plan_catalog,
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
        cmd: ChangePlanCommand,
    ) -> Result<ChangePlanResult, SubscriptionError> {
        let now = Timestamp::now();

        // 1. Load and guard the current subscription
        let current = self
            .repository
            .find_by_id(&cmd.subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found(cmd.subscription_id))?;

        match current.status {
            SubscriptionStatus::Active => {}
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
                return Err(SubscriptionError::retired(current.id));
            }
            other => {
                return Err(SubscriptionError::invalid_state(
                    other.as_str(),
                    "change plan",
                ));
            }
        }
        if current.plan_id == cmd.new_plan_id && current.cycle == cmd.cycle {
            return Err(SubscriptionError::validation(
                "new_plan_id",
                "subscription is already on this plan and cycle",
            ));
        }

        // 2. Price the target plan
        let plan = self
            .plan_catalog
            .plan_for_tenant(&current.tenant_id, &cmd.new_plan_id)
            .await?
            .ok_or_else(|| SubscriptionError::plan_not_found(cmd.new_plan_id))?;
        let price = plan.price_for(cmd.cycle);

        if plan.is_free() {
            return self.change_to_free(&cmd, current, price, now).await;
        }

        // 3. Credit the unused remainder of the old period against the new
        //    price; the change is only chargeable when something remains
        let credit = match current.current_period_end {
            Some(period_end) => {
                proration_credit(current.amount, &period_end, &now, current.cycle)?
            }
            None => Money::zero(price.currency()),
        };
        let net = price.sub_or_zero(credit)?;
        if !net.is_positive() {
            return Err(SubscriptionError::validation(
                "new_plan_id",
                "remaining credit covers the new plan's price; change the plan at period end instead",
            ));
        }

        // 4. Build and validate the replacement before touching stored rows
        let replacement = Subscription::create_pending(
            SubscriptionId::new(),
            current.tenant_id,
            cmd.new_plan_id,
            cmd.cycle,
            net,
            cmd.payment_method,
            DEFAULT_GRACE_PERIOD_DAYS,
        )?;
        let request = self.build_charge_request(&cmd, &replacement, &plan.name)?;

        // 5. Retire the old row, then persist the replacement
        let cancelled = self.cancel_with_retry(current, now).await?;
        self.repository.save(&replacement).await?;

        let mut events = vec![
            SubscriptionEvent::Cancelled {
                event_id: EventId::new(),
                subscription_id: cancelled.id,
                tenant_id: cancelled.tenant_id,
                access_until: cancelled.current_period_end,
                occurred_at: now,
            },
            SubscriptionEvent::Created {
                event_id: EventId::new(),
                subscription_id: replacement.id,
                tenant_id: replacement.tenant_id,
                plan_id: replacement.plan_id,
                cycle: replacement.cycle,
                amount: replacement.amount,
                payment_method: replacement.payment_method,
                is_free: false,
                occurred_at: now,
            },
            SubscriptionEvent::PlanChanged {
                event_id: EventId::new(),
                subscription_id: replacement.id,
                tenant_id: replacement.tenant_id,
                previous_plan_id: cancelled.plan_id,
                new_plan_id: replacement.plan_id,
                credit_applied: credit,
                occurred_at: now,
            },
        ];

        // 6. Charge the net amount, keyed to the replacement row
        let idempotency_key =
            IdempotencyKey::for_billing_period(&replacement.id, &replacement.created_at);
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
                publish_events(self.event_publisher.as_ref(), &events).await?;
                tracing::info!(
                    subscription_id = %replacement.id,
                    previous_subscription_id = %cancelled.id,
                    "plan change charge unresolved, awaiting provider confirmation"
                );
                return Ok(ChangePlanResult {
                    subscription: replacement,
                    previous_subscription_id: cancelled.id,
                    credit_applied: credit,
                    outcome: ChangePlanOutcome::PendingConfirmation,
                });
            }
        };

        // 7. Reconcile the charge onto the replacement
        let outcome = reconcile(&replacement, &result, Timestamp::now())?;
        let (replacement, reconcile_events) = match outcome {
            ReconcileOutcome::Applied {
                subscription,
                events,
            } => (subscription, events),
            ReconcileOutcome::Stale { subscription } => (subscription, Vec::new()),
        };
        self.repository.update(&replacement).await?;
        events.extend(reconcile_events);
        publish_events(self.event_publisher.as_ref(), &events).await?;

        tracing::info!(
            subscription_id = %replacement.id,
            previous_subscription_id = %cancelled.id,
            status = %replacement.status,
            credit = %credit,
            "plan change reconciled"
        );

        let outcome = match replacement.status {
            SubscriptionStatus::Active => ChangePlanOutcome::Activated,
            SubscriptionStatus::Suspended => ChangePlanOutcome::Declined {
                reason: result.error_message.clone(),
            },
            _ => ChangePlanOutcome::PendingConfirmation,
        };

        Ok(ChangePlanResult {
            subscription: replacement,
            previous_subscription_id: cancelled.id,
            credit_applied: credit,
            outcome,
        })
    }

    /// Moving to a free plan: no charge, the remaining paid period is
    /// forfeited by the tenant's explicit choice.
    async fn change_to_free(
        &self,
        cmd: &ChangePlanCommand,
        current: Subscription,
        price: Money,
        now: Timestamp,
    ) -> Result<ChangePlanResult, SubscriptionError> {
        let cancelled = self.cancel_with_retry(current, now).await?;
        let replacement = Subscription::create_free(
            SubscriptionId::new(),
            cancelled.tenant_id,
            cmd.new_plan_id,
            cmd.cycle,
            price.currency(),
        );
        self.repository.save(&replacement).await?;

        let events = vec![
            SubscriptionEvent::Cancelled {
                event_id: EventId::new(),
                subscription_id: cancelled.id,
                tenant_id: cancelled.tenant_id,
                access_until: cancelled.current_period_end,
                occurred_at: now,
            },
            SubscriptionEvent::Created {
                event_id: EventId::new(),
                subscription_id: replacement.id,
                tenant_id: replacement.tenant_id,
                plan_id: replacement.plan_id,
                cycle: replacement.cycle,
                amount: replacement.amount,
                payment_method: replacement.payment_method,
                is_free: true,
                occurred_at: now,
            },
            SubscriptionEvent::PlanChanged {
                event_id: EventId::new(),
                subscription_id: replacement.id,
                tenant_id: replacement.tenant_id,
                previous_plan_id: cancelled.plan_id,
                new_plan_id: replacement.plan_id,
                credit_applied: Money::zero(price.currency()),
                occurred_at: now,
            },
        ];
        publish_events(self.event_publisher.as_ref(), &events).await?;

        Ok(ChangePlanResult {
            subscription: replacement,
            previous_subscription_id: cancelled.id,
            credit_applied: Money::zero(price.currency()),
            outcome: ChangePlanOutcome::Activated,
        })
    }

    /// Cancels under the optimistic lock, reloading on version conflicts so
    /// a webhook applying between read and write cannot wedge the change.
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

    fn build_charge_request(
        &self,
        cmd: &ChangePlanCommand,
        replacement: &Subscription,
        plan_name: &str,
    ) -> Result<PaymentRequest, SubscriptionError> {
        let mut builder = PaymentRequest::builder(replacement.amount, cmd.payment_method)
            .description(format!("Troca de plano: {} ({})", plan_name, cmd.cycle))
            .payer_email(cmd.payer_email.clone())
            .external_reference(replacement.id.to_string())
            .metadata_entry("tenant_id", replacement.tenant_id.to_string())
            .metadata_entry("plan_id", replacement.plan_id.to_string());

        if let Some(token) = &cmd.card_token {
            builder = builder.card_token(token.clone());
        }
        if let Some(tax_id) = &cmd.payer_tax_id {
            builder = builder.payer_tax_id(tax_id.clone());
        }

        Ok(builder.build()?)
    }
}
