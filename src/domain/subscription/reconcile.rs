//! Reconciliation of payment results onto subscriptions.
//!
//! Both execution paths converge here: the synchronous charge flow (gateway
//! response in hand) and the asynchronous webhook flow (result parsed from a
//! provider notification). Each produces a [`PaymentResult`] and applies it
//! through [`reconcile`], so out-of-order, duplicated, or delayed deliveries
//! all resolve to the same final subscription state.
//!
//! ## Ordering
//!
//! Results for the *same* charge attempt (same external id) are ordered by
//! [`PaymentStatus::rank`]: a result only applies if it strictly supersedes
//! what is already recorded. A `pending` arriving after `approved` is a
//! no-op; an `approved` re-delivered after `approved` is a no-op; a
//! `refunded` after `approved` applies.
//!
//! Results for a *different* external id belong to a fresh charge attempt.
//! Only the synchronous flow reconciles under a new id (it just created the
//! attempt), because webhook resolution looks subscriptions up by the id they
//! currently track — a notification for an attempt the subscription no longer
//! tracks never reaches this function.
//!
//! ## Output
//!
//! A successful reconciliation yields the next subscription value plus the
//! side-effect intents (domain events) it implies. Callers persist the
//! subscription first and dispatch the events only after the transaction
//! commits.

use crate::domain::foundation::{EventId, Timestamp};
use crate::domain::payment::{PaymentResult, PaymentStatus};

use super::{Subscription, SubscriptionError, SubscriptionEvent, SubscriptionStatus, SuspensionReason};

/// Result of applying a payment result to a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The result was newer than the recorded state and was applied.
    Applied {
        subscription: Subscription,
        events: Vec<SubscriptionEvent>,
    },

    /// The result was stale or re-delivered; nothing changed.
    Stale { subscription: Subscription },
}

impl ReconcileOutcome {
    /// The subscription after reconciliation (unchanged when stale).
    pub fn subscription(&self) -> &Subscription {
        match self {
            ReconcileOutcome::Applied { subscription, .. } => subscription,
            ReconcileOutcome::Stale { subscription } => subscription,
        }
    }

    /// Returns true if the result was discarded as stale.
    pub fn is_stale(&self) -> bool {
        matches!(self, ReconcileOutcome::Stale { .. })
    }

    /// Splits into the subscription and its pending side effects.
    pub fn into_parts(self) -> (Subscription, Vec<SubscriptionEvent>) {
        match self {
            ReconcileOutcome::Applied {
                subscription,
                events,
            } => (subscription, events),
            ReconcileOutcome::Stale { subscription } => (subscription, Vec::new()),
        }
    }
}

/// Applies a payment result to a subscription.
///
/// Stale results (see module docs) return [`ReconcileOutcome::Stale`] without
/// touching the subscription. Results that imply a state transition take it
/// through the state machine; results that settle nothing (non-final
/// statuses, and failures of attempts that never settled) update only the
/// attempt-tracking fields. Anything else fails with a domain error rather
/// than silently succeeding; callers log those and leave the subscription as
/// it was.
///
/// # Errors
///
/// - [`SubscriptionError::InvalidState`] when the implied transition is not
///   in the state machine table (including anything aimed at `cancelada` or
///   `expirada`, which are absorbing, and refunds of never-settled charges).
/// - [`SubscriptionError::PriceMismatch`] when an approved amount differs
///   from the agreed charge for the period.
pub fn reconcile(
    subscription: &Subscription,
    result: &PaymentResult,
    now: Timestamp,
) -> Result<ReconcileOutcome, SubscriptionError> {
    if is_stale(subscription, result) {
        return Ok(ReconcileOutcome::Stale {
            subscription: subscription.clone(),
        });
    }

    // Retired rows accept nothing that the staleness check let through.
    if subscription.status == SubscriptionStatus::Cancelled
        || subscription.status == SubscriptionStatus::Expired
    {
        return Err(SubscriptionError::invalid_state(
            subscription.status.as_str(),
            format!("apply a {} payment to", result.status),
        ));
    }

    match result.status {
        PaymentStatus::Pending | PaymentStatus::InProcess => {
            let updated = subscription.tracking_payment(&result.external_id, result.status, now);
            Ok(ReconcileOutcome::Applied {
                subscription: updated,
                events: Vec::new(),
            })
        }
        PaymentStatus::Approved => apply_approved(subscription, result, now),
        PaymentStatus::Rejected => apply_rejected(subscription, result, now),
        PaymentStatus::Cancelled => apply_charge_cancelled(subscription, result, now),
        PaymentStatus::Refunded => apply_refund(subscription, result, now),
    }
}

/// A result is stale when the same attempt already recorded an equal or
/// newer status. Results for other attempts are never stale here.
fn is_stale(subscription: &Subscription, result: &PaymentResult) -> bool {
    match (
        subscription.external_transaction_id.as_deref(),
        subscription.last_payment_status,
    ) {
        (Some(recorded_id), Some(recorded_status)) if recorded_id == result.external_id => {
            !result.status.supersedes(&recorded_status)
        }
        _ => false,
    }
}

fn apply_approved(
    subscription: &Subscription,
    result: &PaymentResult,
    now: Timestamp,
) -> Result<ReconcileOutcome, SubscriptionError> {
    if result.amount != subscription.amount {
        return Err(SubscriptionError::price_mismatch(
            subscription.amount,
            result.amount,
        ));
    }

    let (updated, event) = match subscription.status {
        SubscriptionStatus::Pending => {
            let updated = subscription.activated(&result.external_id, now)?;
            let event = SubscriptionEvent::Activated {
                event_id: EventId::new(),
                subscription_id: updated.id,
                tenant_id: updated.tenant_id,
                period_start: updated.current_period_start.unwrap_or(now),
                period_end: updated.current_period_end.unwrap_or(now),
                occurred_at: now,
            };
            (updated, event)
        }
        SubscriptionStatus::Active => {
            let updated = subscription.renewed(&result.external_id, now)?;
            let event = SubscriptionEvent::Renewed {
                event_id: EventId::new(),
                subscription_id: updated.id,
                tenant_id: updated.tenant_id,
                new_period_start: updated.current_period_start.unwrap_or(now),
                new_period_end: updated.current_period_end.unwrap_or(now),
                occurred_at: now,
            };
            (updated, event)
        }
        SubscriptionStatus::Suspended => {
            let updated = subscription.reactivated(&result.external_id, now)?;
            let event = SubscriptionEvent::Reactivated {
                event_id: EventId::new(),
                subscription_id: updated.id,
                tenant_id: updated.tenant_id,
                period_start: updated.current_period_start.unwrap_or(now),
                period_end: updated.current_period_end.unwrap_or(now),
                occurred_at: now,
            };
            (updated, event)
        }
        status => {
            return Err(SubscriptionError::invalid_state(
                status.as_str(),
                "apply an approved payment to",
            ));
        }
    };

    Ok(ReconcileOutcome::Applied {
        subscription: updated,
        events: vec![event],
    })
}

fn apply_rejected(
    subscription: &Subscription,
    result: &PaymentResult,
    now: Timestamp,
) -> Result<ReconcileOutcome, SubscriptionError> {
    match subscription.status {
        // First charge declined: block access until a retry succeeds.
        SubscriptionStatus::Pending => {
            let updated =
                subscription.suspended(&result.external_id, PaymentStatus::Rejected, now)?;
            let event = suspension_event(&updated, SuspensionReason::PaymentRejected, result, now);
            Ok(ReconcileOutcome::Applied {
                subscription: updated,
                events: vec![event],
            })
        }
        // A declined renewal (or a declined retry while already suspended)
        // implies no transition: the paid-up period stands, or the
        // subscription is already blocked. Record the attempt outcome so
        // later deliveries for it are ordered correctly.
        SubscriptionStatus::Active | SubscriptionStatus::Suspended => {
            Ok(attempt_record(subscription, result, now))
        }
        status => Err(SubscriptionError::invalid_state(
            status.as_str(),
            "suspend after a declined charge",
        )),
    }
}

fn apply_charge_cancelled(
    subscription: &Subscription,
    result: &PaymentResult,
    now: Timestamp,
) -> Result<ReconcileOutcome, SubscriptionError> {
    let voids_settled_charge = subscription.external_transaction_id.as_deref()
        == Some(result.external_id.as_str())
        && subscription.last_payment_status == Some(PaymentStatus::Approved);

    match subscription.status {
        // First charge cancelled or abandoned (boleto expired unpaid).
        SubscriptionStatus::Pending => {
            let updated =
                subscription.suspended(&result.external_id, PaymentStatus::Cancelled, now)?;
            let event = suspension_event(&updated, SuspensionReason::ChargeCancelled, result, now);
            Ok(ReconcileOutcome::Applied {
                subscription: updated,
                events: vec![event],
            })
        }
        // The settled charge backing the active period was voided.
        SubscriptionStatus::Active if voids_settled_charge => {
            let updated =
                subscription.suspended(&result.external_id, PaymentStatus::Cancelled, now)?;
            let event = suspension_event(&updated, SuspensionReason::ChargeCancelled, result, now);
            Ok(ReconcileOutcome::Applied {
                subscription: updated,
                events: vec![event],
            })
        }
        // A cancelled *renewal* or retry attempt never settled anything, so
        // it takes nothing away; attempt tracking is updated and the grace
        // sweep handles an eventual lapse.
        SubscriptionStatus::Active | SubscriptionStatus::Suspended => {
            Ok(attempt_record(subscription, result, now))
        }
        status => Err(SubscriptionError::invalid_state(
            status.as_str(),
            "suspend after a cancelled charge",
        )),
    }
}

fn apply_refund(
    subscription: &Subscription,
    result: &PaymentResult,
    now: Timestamp,
) -> Result<ReconcileOutcome, SubscriptionError> {
    match subscription.status {
        // Refund or chargeback of the charge backing the active period.
        SubscriptionStatus::Active => {
            let updated =
                subscription.suspended(&result.external_id, PaymentStatus::Refunded, now)?;
            let event = suspension_event(&updated, SuspensionReason::Refunded, result, now);
            Ok(ReconcileOutcome::Applied {
                subscription: updated,
                events: vec![event],
            })
        }
        // Already blocked; just record the reversal on the attempt.
        SubscriptionStatus::Suspended => Ok(attempt_record(subscription, result, now)),
        status => Err(SubscriptionError::invalid_state(
            status.as_str(),
            "suspend after a refund",
        )),
    }
}

/// Records the result on the tracked attempt without any state transition
/// and without side effects.
fn attempt_record(
    subscription: &Subscription,
    result: &PaymentResult,
    now: Timestamp,
) -> ReconcileOutcome {
    ReconcileOutcome::Applied {
        subscription: subscription.tracking_payment(&result.external_id, result.status, now),
        events: Vec::new(),
    }
}

fn suspension_event(
    subscription: &Subscription,
    reason: SuspensionReason,
    result: &PaymentResult,
    now: Timestamp,
) -> SubscriptionEvent {
    SubscriptionEvent::Suspended {
        event_id: EventId::new(),
        subscription_id: subscription.id,
        tenant_id: subscription.tenant_id,
        reason,
        detail: result.error_message.clone(),
        occurred_at: now,
    }
}
