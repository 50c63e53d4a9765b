//! Subscription aggregate entity.
//!
//! The Subscription aggregate represents a tenant's paid (or free) access to a
//! plan for a billing period. A tenant may accumulate many subscription rows
//! over time; only the most recent one governs access. Retired rows are kept
//! for billing history, never deleted.
//!
//! # Design Decisions
//!
//! - **Immutable**: transitions return a new instance; presentation code can
//!   never mutate a field in place. All writes funnel through reconciliation.
//! - **Money in centavos**: all monetary values stored as i64 minor units.
//! - **Fail-secure**: no subscription = no access (not an implicit free tier).
//! - **Advisory status**: the persisted status lags behind wall-clock expiry.
//!   `has_access`/`is_expired` take `now` explicitly and must be consulted by
//!   anyone needing a hard allow/deny answer.

use crate::domain::foundation::{
    Currency, Money, PlanId, StateMachine, SubscriptionId, TenantId, Timestamp,
};
use serde::{Deserialize, Serialize};

use super::{BillingCycle, SubscriptionError, SubscriptionStatus};
use crate::domain::payment::{PaymentMethod, PaymentStatus};

/// Subscription aggregate - a tenant's plan enrollment for a billing period.
///
/// # Invariants
///
/// - `current_period_end >= current_period_start` when both are present
/// - status `ativa` implies `external_transaction_id` is set or
///   `payment_method` is `gratuito`
/// - status transitions follow the state machine rules
/// - `grace_period_days` is fixed at creation and never changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique identifier for this subscription.
    pub id: SubscriptionId,

    /// Tenant who owns this subscription.
    pub tenant_id: TenantId,

    /// Plan being paid for (read-only reference into the plan catalog).
    pub plan_id: PlanId,

    /// Current status in the subscription lifecycle.
    pub status: SubscriptionStatus,

    /// Billing cycle determining period length and renewal price.
    pub cycle: BillingCycle,

    /// Start of the paid period. None until the first payment is approved.
    pub current_period_start: Option<Timestamp>,

    /// End of the paid period. None until the first payment is approved,
    /// and always None for free plans (they do not expire).
    pub current_period_end: Option<Timestamp>,

    /// Agreed charge for the billed period. Zero for free plans. Settlements
    /// reporting a different amount are rejected during reconciliation.
    pub amount: Money,

    /// How this subscription is paid.
    pub payment_method: PaymentMethod,

    /// Charge id at the payment gateway for the current billing attempt.
    pub external_transaction_id: Option<String>,

    /// Most recent gateway status recorded for the current attempt. Used by
    /// reconciliation to discard stale or re-delivered webhook results.
    pub last_payment_status: Option<PaymentStatus>,

    /// Days after `current_period_end` during which access continues while
    /// awaiting a late renewal. Fixed at creation.
    pub grace_period_days: u16,

    /// Free-form operator notes (migration context, manual adjustments).
    pub notes: Option<String>,

    /// When the subscription was created.
    pub created_at: Timestamp,

    /// When the subscription was last updated.
    pub updated_at: Timestamp,

    /// When the subscription was cancelled (if cancelled).
    pub cancelled_at: Option<Timestamp>,

    /// Optimistic-lock version. Incremented by the repository on every save;
    /// never touched by domain transitions.
    pub version: i32,
}

impl Subscription {
    /// Create a new paid subscription awaiting its first payment confirmation.
    ///
    /// Paid subscriptions start in `pendente` with no billing period; the
    /// period is established when the first charge is approved.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a non-chargeable payment method or a
    /// non-positive amount.
    pub fn create_pending(
        id: SubscriptionId,
        tenant_id: TenantId,
        plan_id: PlanId,
        cycle: BillingCycle,
        amount: Money,
        payment_method: PaymentMethod,
        grace_period_days: u16,
    ) -> Result<Self, SubscriptionError> {
        if !payment_method.is_chargeable() {
            return Err(SubscriptionError::validation(
                "payment_method",
                format!("method '{}' cannot be charged", payment_method),
            ));
        }
        if !amount.is_positive() {
            return Err(SubscriptionError::validation(
                "amount",
                "paid subscriptions require a positive amount",
            ));
        }

        let now = Timestamp::now();
        Ok(Self {
            id,
            tenant_id,
            plan_id,
            status: SubscriptionStatus::Pending,
            cycle,
            current_period_start: None,
            current_period_end: None,
            amount,
            payment_method,
            external_transaction_id: None,
            last_payment_status: None,
            grace_period_days,
            notes: None,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            version: 1,
        })
    }

    /// Create a new free subscription.
    ///
    /// Free subscriptions are immediately `ativa`, carry a zero amount, and
    /// have no billing period, so they never expire by time.
    pub fn create_free(
        id: SubscriptionId,
        tenant_id: TenantId,
        plan_id: PlanId,
        cycle: BillingCycle,
        currency: Currency,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            tenant_id,
            plan_id,
            status: SubscriptionStatus::Active,
            cycle,
            current_period_start: Some(now),
            current_period_end: None,
            amount: Money::zero(currency),
            payment_method: PaymentMethod::Gratuito,
            external_transaction_id: None,
            last_payment_status: None,
            grace_period_days: 0,
            notes: None,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
            version: 1,
        }
    }

    /// Attaches operator notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Returns true if this subscription never charges.
    pub fn is_free(&self) -> bool {
        self.payment_method == PaymentMethod::Gratuito
    }

    // ------------------------------------------------------------------
    // Pure time-based reads
    // ------------------------------------------------------------------

    /// Returns true if the paid period plus grace has fully elapsed.
    ///
    /// Pure function of `now`, `current_period_end`, and `grace_period_days`;
    /// deliberately independent of the persisted status, which may lag when
    /// no webhook ever arrives. Subscriptions without a period end (free
    /// plans, pendente) never expire by time.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        match self.current_period_end {
            Some(end) => now.is_after(&end.add_days(i64::from(self.grace_period_days))),
            None => false,
        }
    }

    /// Returns true if the period has ended but grace is still running.
    ///
    /// Access continues during grace; callers may surface a "renew now"
    /// banner off this flag.
    pub fn in_grace(&self, now: Timestamp) -> bool {
        match self.current_period_end {
            Some(end) => now.is_after(&end) && !self.is_expired(now),
            None => false,
        }
    }

    /// Returns true if this subscription grants access right now.
    ///
    /// Hard allow/deny answer: status must allow access and the period
    /// (including grace) must not have elapsed. Cancelled subscriptions keep
    /// access until the already-paid period ends.
    pub fn has_access(&self, now: Timestamp) -> bool {
        if self.is_expired(now) {
            return false;
        }

        if self.status == SubscriptionStatus::Cancelled {
            return match self.current_period_end {
                Some(end) => !now.is_after(&end),
                None => false,
            };
        }

        self.status.has_access()
    }

    /// Days remaining in the current period, zero once it has ended.
    pub fn days_remaining(&self, now: Timestamp) -> u32 {
        match self.current_period_end {
            Some(end) if end.is_after(&now) => now.days_until(&end).max(0) as u32,
            _ => 0,
        }
    }

    // ------------------------------------------------------------------
    // Transitions (each returns a new instance)
    // ------------------------------------------------------------------

    /// First payment approved: `pendente → ativa`, period starts now.
    ///
    /// # Errors
    ///
    /// Returns an error if the current status does not allow activation.
    pub fn activated(
        &self,
        external_id: impl Into<String>,
        now: Timestamp,
    ) -> Result<Self, SubscriptionError> {
        let status = self.transition(SubscriptionStatus::Active, "activate")?;
        Ok(Self {
            status,
            current_period_start: Some(now),
            current_period_end: Some(now.add_days(self.cycle.period_days())),
            external_transaction_id: Some(external_id.into()),
            last_payment_status: Some(PaymentStatus::Approved),
            updated_at: now,
            ..self.clone()
        })
    }

    /// Renewal payment approved: `ativa → ativa`, period end extended by one
    /// billing cycle. The new period starts where the old one ended so a
    /// renewal settled during grace does not shorten what was paid for.
    ///
    /// # Errors
    ///
    /// Returns an error if the current status does not allow renewal.
    pub fn renewed(
        &self,
        external_id: impl Into<String>,
        now: Timestamp,
    ) -> Result<Self, SubscriptionError> {
        let status = self.transition(SubscriptionStatus::Active, "renew")?;
        let new_start = self.current_period_end.unwrap_or(now);
        Ok(Self {
            status,
            current_period_start: Some(new_start),
            current_period_end: Some(new_start.add_days(self.cycle.period_days())),
            external_transaction_id: Some(external_id.into()),
            last_payment_status: Some(PaymentStatus::Approved),
            updated_at: now,
            ..self.clone()
        })
    }

    /// Retry payment approved after suspension: `suspensa → ativa` with a
    /// fresh period starting now (service resumes from payment, not from the
    /// lapsed period).
    ///
    /// # Errors
    ///
    /// Returns an error if the current status does not allow reactivation.
    pub fn reactivated(
        &self,
        external_id: impl Into<String>,
        now: Timestamp,
    ) -> Result<Self, SubscriptionError> {
        let status = self.transition(SubscriptionStatus::Active, "reactivate")?;
        Ok(Self {
            status,
            current_period_start: Some(now),
            current_period_end: Some(now.add_days(self.cycle.period_days())),
            external_transaction_id: Some(external_id.into()),
            last_payment_status: Some(PaymentStatus::Approved),
            updated_at: now,
            ..self.clone()
        })
    }

    /// Payment declined, cancelled, or reversed: access blocked.
    ///
    /// Records the gateway status that caused the suspension so later
    /// reconciliation can order incoming results against it.
    ///
    /// # Errors
    ///
    /// Returns an error if the current status does not allow suspension.
    pub fn suspended(
        &self,
        external_id: impl Into<String>,
        payment_status: PaymentStatus,
        now: Timestamp,
    ) -> Result<Self, SubscriptionError> {
        let status = self.transition(SubscriptionStatus::Suspended, "suspend")?;
        Ok(Self {
            status,
            external_transaction_id: Some(external_id.into()),
            last_payment_status: Some(payment_status),
            updated_at: now,
            ..self.clone()
        })
    }

    /// Explicit cancellation: `ativa/suspensa → cancelada`.
    ///
    /// Access continues until the already-paid period ends; see
    /// [`Subscription::has_access`].
    ///
    /// # Errors
    ///
    /// Returns an error if the current status does not allow cancellation.
    pub fn cancelled(&self, now: Timestamp) -> Result<Self, SubscriptionError> {
        let status = self.transition(SubscriptionStatus::Cancelled, "cancel")?;
        Ok(Self {
            status,
            cancelled_at: Some(now),
            updated_at: now,
            ..self.clone()
        })
    }

    /// Grace elapsed with no renewal: `ativa → expirada`.
    ///
    /// Persists what [`Subscription::is_expired`] already reports, for
    /// reporting and indexed queries.
    ///
    /// # Errors
    ///
    /// Returns an error if the current status does not allow expiry.
    pub fn expired(&self, now: Timestamp) -> Result<Self, SubscriptionError> {
        let status = self.transition(SubscriptionStatus::Expired, "expire")?;
        Ok(Self {
            status,
            updated_at: now,
            ..self.clone()
        })
    }

    /// Records a non-final gateway status (`pending`/`in_process`) for the
    /// current attempt without changing the subscription status.
    pub fn tracking_payment(
        &self,
        external_id: impl Into<String>,
        payment_status: PaymentStatus,
        now: Timestamp,
    ) -> Self {
        Self {
            external_transaction_id: Some(external_id.into()),
            last_payment_status: Some(payment_status),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Transition to a new status using the state machine.
    fn transition(
        &self,
        target: SubscriptionStatus,
        attempted: &str,
    ) -> Result<SubscriptionStatus, SubscriptionError> {
        self.status
            .transition_to(target)
            .map_err(|_| SubscriptionError::invalid_state(self.status.as_str(), attempted))
    }
}
