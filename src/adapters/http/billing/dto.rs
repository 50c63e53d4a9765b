//! HTTP DTOs (Data Transfer Objects) for the billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.
//! They serve as the boundary between HTTP and the application layer.

use crate::application::handlers::subscription::{
    CancelSubscriptionResult, ChangePlanOutcome, ChangePlanResult, CheckAccessResult,
    CreateSubscriptionOutcome, CreateSubscriptionResult, RenewSubscriptionOutcome,
    RenewSubscriptionResult,
};
use crate::domain::foundation::{Currency, PlanId, Timestamp};
use crate::domain::payment::PaymentMethod;
use crate::domain::subscription::{BillingCycle, Subscription, SubscriptionStatus};
use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to create a subscription for the calling tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubscriptionRequest {
    /// Catalog plan to subscribe to.
    pub plan_id: PlanId,
    /// Billing cycle (monthly or annual).
    pub cycle: BillingCycle,
    /// How the tenant pays (pix, boleto, credit_card).
    pub payment_method: PaymentMethod,
    /// Opaque card token from the client-side tokenizer; required for
    /// credit_card, forbidden meaning for the other methods.
    #[serde(default)]
    pub card_token: Option<String>,
    /// Billing contact, forwarded to the provider.
    pub payer_email: String,
    /// CPF or CNPJ, digits only.
    #[serde(default)]
    pub payer_tax_id: Option<String>,
}

/// Request to charge a subscription for its next period (also the recovery
/// path for a suspended subscription).
#[derive(Debug, Clone, Deserialize)]
pub struct RenewSubscriptionRequest {
    /// Fresh card token; required when the stored method is credit_card.
    #[serde(default)]
    pub card_token: Option<String>,
    pub payer_email: String,
    #[serde(default)]
    pub payer_tax_id: Option<String>,
}

/// Request to move a subscription to a different plan.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePlanRequest {
    /// Target plan.
    pub new_plan_id: PlanId,
    /// Billing cycle for the new plan.
    pub cycle: BillingCycle,
    /// Payment method for the replacement charge.
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub card_token: Option<String>,
    pub payer_email: String,
    #[serde(default)]
    pub payer_tax_id: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Subscription details for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    /// Subscription ID.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Plan the subscription bills against.
    pub plan_id: String,
    /// Lifecycle status (pendente, ativa, suspensa, cancelada, expirada).
    pub status: SubscriptionStatus,
    /// Billing cycle.
    pub cycle: BillingCycle,
    /// Payment method on file.
    pub payment_method: PaymentMethod,
    /// Price per period in minor units (centavos).
    pub amount_cents: i64,
    /// ISO 4217 currency code.
    pub currency: Currency,
    /// Start of the paid period (ISO 8601), absent while pendente.
    pub current_period_start: Option<String>,
    /// End of the paid period (ISO 8601), absent while pendente.
    pub current_period_end: Option<String>,
    /// Provider transaction id of the charge being tracked.
    pub external_transaction_id: Option<String>,
    /// Days of continued access after a failed renewal.
    pub grace_period_days: u16,
    /// When the subscription was created (ISO 8601).
    pub created_at: String,
    /// When the subscription was cancelled (ISO 8601), if it was.
    pub cancelled_at: Option<String>,
}

fn rfc3339(ts: &Timestamp) -> String {
    ts.as_datetime().to_rfc3339()
}

impl From<&Subscription> for SubscriptionResponse {
    fn from(subscription: &Subscription) -> Self {
        Self {
            id: subscription.id.to_string(),
            tenant_id: subscription.tenant_id.to_string(),
            plan_id: subscription.plan_id.to_string(),
            status: subscription.status,
            cycle: subscription.cycle,
            payment_method: subscription.payment_method,
            amount_cents: subscription.amount.amount(),
            currency: subscription.amount.currency(),
            current_period_start: subscription.current_period_start.as_ref().map(rfc3339),
            current_period_end: subscription.current_period_end.as_ref().map(rfc3339),
            external_transaction_id: subscription.external_transaction_id.clone(),
            grace_period_days: subscription.grace_period_days,
            created_at: rfc3339(&subscription.created_at),
            cancelled_at: subscription.cancelled_at.as_ref().map(rfc3339),
        }
    }
}

/// How a synchronous charge settled, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeOutcomeResponse {
    /// Access is on.
    Activated,
    /// Charge accepted but not settled; confirmation arrives by webhook.
    PendingConfirmation,
    /// Provider declined the charge.
    Declined,
}

/// Response for subscription creation.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSubscriptionResponse {
    pub subscription: SubscriptionResponse,
    pub outcome: ChargeOutcomeResponse,
    /// Provider's structured decline reason, when outcome is `declined`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
}

impl From<CreateSubscriptionResult> for CreateSubscriptionResponse {
    fn from(result: CreateSubscriptionResult) -> Self {
        let (outcome, decline_reason) = match result.outcome {
            CreateSubscriptionOutcome::Activated => (ChargeOutcomeResponse::Activated, None),
            CreateSubscriptionOutcome::PendingConfirmation => {
                (ChargeOutcomeResponse::PendingConfirmation, None)
            }
            CreateSubscriptionOutcome::Declined { reason } => {
                (ChargeOutcomeResponse::Declined, reason)
            }
        };
        Self {
            subscription: SubscriptionResponse::from(&result.subscription),
            outcome,
            decline_reason,
        }
    }
}

/// How a renewal settled, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewOutcomeResponse {
    /// Approved; the paid period was extended.
    Renewed,
    /// Approved on a suspended subscription; access restored.
    Reactivated,
    /// The provider replayed an already-reconciled charge; nothing changed.
    AlreadyApplied,
    /// Charge accepted but not settled; confirmation arrives by webhook.
    PendingConfirmation,
    /// Provider declined the charge.
    Declined,
}

/// Response for a renewal.
#[derive(Debug, Clone, Serialize)]
pub struct RenewSubscriptionResponse {
    pub subscription: SubscriptionResponse,
    pub outcome: RenewOutcomeResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
}

impl From<RenewSubscriptionResult> for RenewSubscriptionResponse {
    fn from(result: RenewSubscriptionResult) -> Self {
        let (outcome, decline_reason) = match result.outcome {
            RenewSubscriptionOutcome::Renewed => (RenewOutcomeResponse::Renewed, None),
            RenewSubscriptionOutcome::Reactivated => (RenewOutcomeResponse::Reactivated, None),
            RenewSubscriptionOutcome::AlreadyApplied => {
                (RenewOutcomeResponse::AlreadyApplied, None)
            }
            RenewSubscriptionOutcome::PendingConfirmation => {
                (RenewOutcomeResponse::PendingConfirmation, None)
            }
            RenewSubscriptionOutcome::Declined { reason } => {
                (RenewOutcomeResponse::Declined, reason)
            }
        };
        Self {
            subscription: SubscriptionResponse::from(&result.subscription),
            outcome,
            decline_reason,
        }
    }
}

/// Response for a plan change.
#[derive(Debug, Clone, Serialize)]
pub struct ChangePlanResponse {
    /// The replacement subscription.
    pub subscription: SubscriptionResponse,
    /// The cancelled predecessor.
    pub previous_subscription_id: String,
    /// Unused value of the old period applied against the new price,
    /// in minor units.
    pub credit_applied_cents: i64,
    pub currency: Currency,
    pub outcome: ChargeOutcomeResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<String>,
}

impl From<ChangePlanResult> for ChangePlanResponse {
    fn from(result: ChangePlanResult) -> Self {
        let (outcome, decline_reason) = match result.outcome {
            ChangePlanOutcome::Activated => (ChargeOutcomeResponse::Activated, None),
            ChangePlanOutcome::PendingConfirmation => {
                (ChargeOutcomeResponse::PendingConfirmation, None)
            }
            ChangePlanOutcome::Declined { reason } => (ChargeOutcomeResponse::Declined, reason),
        };
        Self {
            subscription: SubscriptionResponse::from(&result.subscription),
            previous_subscription_id: result.previous_subscription_id.to_string(),
            credit_applied_cents: result.credit_applied.amount(),
            currency: result.credit_applied.currency(),
            outcome,
            decline_reason,
        }
    }
}

/// Response for a cancellation.
#[derive(Debug, Clone, Serialize)]
pub struct CancelSubscriptionResponse {
    pub subscription: SubscriptionResponse,
    /// End of the already-paid period the tenant keeps access until,
    /// if one was running.
    pub access_until: Option<String>,
}

impl From<CancelSubscriptionResult> for CancelSubscriptionResponse {
    fn from(result: CancelSubscriptionResult) -> Self {
        Self {
            subscription: SubscriptionResponse::from(&result.subscription),
            access_until: result.access_until.as_ref().map(rfc3339),
        }
    }
}

/// Response for the tenant access gate.
#[derive(Debug, Clone, Serialize)]
pub struct AccessCheckResponse {
    /// Whether the tenant may use the platform right now.
    pub allowed: bool,
    /// Status of the subscription the decision was made from, if any.
    pub status: Option<SubscriptionStatus>,
    /// True when access is only held open by the grace window.
    pub in_grace: bool,
    /// Whole days until the paid period ends, 0 when none is running.
    pub days_remaining: u32,
}

impl From<CheckAccessResult> for AccessCheckResponse {
    fn from(result: CheckAccessResult) -> Self {
        Self {
            allowed: result.allowed,
            status: result.status,
            in_grace: result.in_grace,
            days_remaining: result.days_remaining,
        }
    }
}

/// Acknowledgement for a structurally accepted webhook delivery.
///
/// Always paired with HTTP 200; the outcome string is informational and
/// never asks the provider to redeliver.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
    /// applied | already_processed | discarded | ignored | failed
    pub outcome: &'static str,
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response DTO
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }
}
