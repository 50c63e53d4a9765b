//! Subscription domain events.
//!
//! Events emitted during subscription lifecycle changes. These events are used for:
//! - Audit logging (all state transitions)
//! - Access control cache invalidation in consuming modules
//! - Email notifications (welcome, payment declined, renewal receipt)
//!
//! # Event Naming Convention
//!
//! Events are named in past tense to indicate something that has already happened:
//! - `SubscriptionActivated` not `ActivateSubscription`
//! - `Suspended` not `Suspend`
//!
//! Events are emitted by state transitions on the aggregate but only published
//! after the transaction that persisted the transition commits.

use crate::domain::foundation::{
    DomainEvent, EventId, Money, PlanId, SubscriptionId, TenantId, Timestamp,
};
use serde::{Deserialize, Serialize};

use super::BillingCycle;
use crate::domain::payment::PaymentMethod;

/// Events that occur during the subscription lifecycle.
///
/// All state transitions emit events for audit logging and integration.
/// Events follow the transitions defined by the subscription state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionEvent {
    /// A new subscription was created (pendente for paid, ativa for free).
    Created {
        event_id: EventId,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
        plan_id: PlanId,
        cycle: BillingCycle,
        amount: Money,
        payment_method: PaymentMethod,
        is_free: bool,
        occurred_at: Timestamp,
    },

    /// Subscription was activated after its first approved payment.
    ///
    /// State transition: pendente → ativa
    Activated {
        event_id: EventId,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
        period_start: Timestamp,
        period_end: Timestamp,
        occurred_at: Timestamp,
    },

    /// Subscription was renewed for a new billing period.
    ///
    /// State transition: ativa → ativa (period advance)
    Renewed {
        event_id: EventId,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
        new_period_start: Timestamp,
        new_period_end: Timestamp,
        occurred_at: Timestamp,
    },

    /// Payment was declined, cancelled, or reversed; access is blocked.
    ///
    /// State transition: pendente → suspensa, or ativa → suspensa
    Suspended {
        event_id: EventId,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
        reason: SuspensionReason,
        /// Gateway-provided decline detail, when available.
        detail: Option<String>,
        occurred_at: Timestamp,
    },

    /// A suspended subscription recovered after an approved payment.
    ///
    /// State transition: suspensa → ativa
    Reactivated {
        event_id: EventId,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
        period_start: Timestamp,
        period_end: Timestamp,
        occurred_at: Timestamp,
    },

    /// The tenant requested cancellation.
    ///
    /// State transition: ativa → cancelada, or suspensa → cancelada
    Cancelled {
        event_id: EventId,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
        /// End of the already-paid period, when access continues until then.
        access_until: Option<Timestamp>,
        occurred_at: Timestamp,
    },

    /// The paid period plus grace elapsed without renewal.
    ///
    /// State transition: ativa → expirada
    Expired {
        event_id: EventId,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
        period_end: Option<Timestamp>,
        occurred_at: Timestamp,
    },

    /// The tenant moved to a different plan mid-period.
    ///
    /// Emitted on the replacement subscription; the superseded one emits
    /// `Cancelled`.
    PlanChanged {
        event_id: EventId,
        subscription_id: SubscriptionId,
        tenant_id: TenantId,
        previous_plan_id: PlanId,
        new_plan_id: PlanId,
        /// Unused value from the old period credited against the new charge.
        credit_applied: Money,
        occurred_at: Timestamp,
    },
}

/// Reason why a subscription was suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspensionReason {
    /// The gateway declined the charge.
    PaymentRejected,

    /// The charge was cancelled before settling.
    ChargeCancelled,

    /// An already-settled charge was refunded or charged back.
    Refunded,
}

impl std::fmt::Display for SuspensionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuspensionReason::PaymentRejected => write!(f, "payment_rejected"),
            SuspensionReason::ChargeCancelled => write!(f, "charge_cancelled"),
            SuspensionReason::Refunded => write!(f, "refunded"),
        }
    }
}

impl SubscriptionEvent {
    /// Returns the event type string for routing and filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            SubscriptionEvent::Created { .. } => "subscription.created",
            SubscriptionEvent::Activated { .. } => "subscription.activated",
            SubscriptionEvent::Renewed { .. } => "subscription.renewed",
            SubscriptionEvent::Suspended { .. } => "subscription.suspended",
            SubscriptionEvent::Reactivated { .. } => "subscription.reactivated",
            SubscriptionEvent::Cancelled { .. } => "subscription.cancelled",
            SubscriptionEvent::Expired { .. } => "subscription.expired",
            SubscriptionEvent::PlanChanged { .. } => "subscription.plan_changed",
        }
    }

    /// Returns the subscription ID associated with this event.
    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            SubscriptionEvent::Created { subscription_id, .. }
            | SubscriptionEvent::Activated { subscription_id, .. }
            | SubscriptionEvent::Renewed { subscription_id, .. }
            | SubscriptionEvent::Suspended { subscription_id, .. }
            | SubscriptionEvent::Reactivated { subscription_id, .. }
            | SubscriptionEvent::Cancelled { subscription_id, .. }
            | SubscriptionEvent::Expired { subscription_id, .. }
            | SubscriptionEvent::PlanChanged { subscription_id, .. } => *subscription_id,
        }
    }

    /// Returns the tenant ID associated with this event.
    pub fn tenant_id(&self) -> TenantId {
        match self {
            SubscriptionEvent::Created { tenant_id, .. }
            | SubscriptionEvent::Activated { tenant_id, .. }
            | SubscriptionEvent::Renewed { tenant_id, .. }
            | SubscriptionEvent::Suspended { tenant_id, .. }
            | SubscriptionEvent::Reactivated { tenant_id, .. }
            | SubscriptionEvent::Cancelled { tenant_id, .. }
            | SubscriptionEvent::Expired { tenant_id, .. }
            | SubscriptionEvent::PlanChanged { tenant_id, .. } => *tenant_id,
        }
    }
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        SubscriptionEvent::event_type(self)
    }

    fn aggregate_id(&self) -> String {
        self.subscription_id().to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "Subscription"
    }

    fn occurred_at(&self) -> Timestamp {
        match self {
            SubscriptionEvent::Created { occurred_at, .. }
            | SubscriptionEvent::Activated { occurred_at, .. }
            | SubscriptionEvent::Renewed { occurred_at, .. }
            | SubscriptionEvent::Suspended { occurred_at, .. }
            | SubscriptionEvent::Reactivated { occurred_at, .. }
            | SubscriptionEvent::Cancelled { occurred_at, .. }
            | SubscriptionEvent::Expired { occurred_at, .. }
            | SubscriptionEvent::PlanChanged { occurred_at, .. } => *occurred_at,
        }
    }

    fn event_id(&self) -> EventId {
        match self {
            SubscriptionEvent::Created { event_id, .. }
            | SubscriptionEvent::Activated { event_id, .. }
            | SubscriptionEvent::Renewed { event_id, .. }
            | SubscriptionEvent::Suspended { event_id, .. }
            | SubscriptionEvent::Reactivated { event_id, .. }
            | SubscriptionEvent::Cancelled { event_id, .. }
            | SubscriptionEvent::Expired { event_id, .. }
            | SubscriptionEvent::PlanChanged { event_id, .. } => event_id.clone(),
        }
    }
}
