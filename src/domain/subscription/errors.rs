//! Subscription-specific error types.
//!
//! Errors related to subscription lifecycle, billing, and webhook processing.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFound | 404 |
//! | NotFoundForExternalId | 404 |
//! | PlanNotFound | 404 |
//! | Retired | 409 |
//! | InvalidState | 422 |
//! | PriceMismatch | 409 |
//! | PaymentFailed | 402 |
//! | GatewayUnavailable | 502 |
//! | InvalidWebhookSignature | 401 |
//! | MalformedWebhook | 400 |
//! | ConcurrencyConflict | 409 |
//! | ValidationFailed | 400 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{
    DomainError, ErrorCode, Money, MoneyError, PlanId, SubscriptionId, ValidationError,
};

/// Subscription-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Subscription was not found.
    NotFound(SubscriptionId),

    /// No subscription is tracking this gateway transaction.
    NotFoundForExternalId(String),

    /// Plan was not found in the catalog.
    PlanNotFound(PlanId),

    /// Subscription is cancelled or expired and can no longer be billed.
    Retired(SubscriptionId),

    /// Invalid state for the requested operation.
    InvalidState {
        current: String,
        attempted: String,
    },

    /// Settled amount does not match the agreed charge for the period.
    PriceMismatch {
        expected: Money,
        actual: Money,
    },

    /// The gateway rejected the charge.
    PaymentFailed {
        reason: String,
    },

    /// The gateway could not be reached or answered with a server error.
    GatewayUnavailable(String),

    /// Webhook signature verification failed.
    InvalidWebhookSignature,

    /// Webhook payload could not be parsed.
    MalformedWebhook(String),

    /// Another writer updated the subscription first.
    ConcurrencyConflict {
        message: String,
    },

    /// Validation failed.
    ValidationFailed {
        field: String,
        message: String,
    },

    /// Infrastructure error.
    Infrastructure(String),
}

impl SubscriptionError {
    // Constructor functions for cleaner error creation

    pub fn not_found(id: SubscriptionId) -> Self {
        SubscriptionError::NotFound(id)
    }

    pub fn not_found_for_external_id(external_id: impl Into<String>) -> Self {
        SubscriptionError::NotFoundForExternalId(external_id.into())
    }

    pub fn plan_not_found(plan_id: PlanId) -> Self {
        SubscriptionError::PlanNotFound(plan_id)
    }

    pub fn retired(id: SubscriptionId) -> Self {
        SubscriptionError::Retired(id)
    }

    pub fn invalid_state(current: impl Into<String>, attempted: impl Into<String>) -> Self {
        SubscriptionError::InvalidState {
            current: current.into(),
            attempted: attempted.into(),
        }
    }

    pub fn price_mismatch(expected: Money, actual: Money) -> Self {
        SubscriptionError::PriceMismatch { expected, actual }
    }

    pub fn payment_failed(reason: impl Into<String>) -> Self {
        SubscriptionError::PaymentFailed {
            reason: reason.into(),
        }
    }

    pub fn gateway_unavailable(message: impl Into<String>) -> Self {
        SubscriptionError::GatewayUnavailable(message.into())
    }

    pub fn invalid_webhook_signature() -> Self {
        SubscriptionError::InvalidWebhookSignature
    }

    pub fn malformed_webhook(message: impl Into<String>) -> Self {
        SubscriptionError::MalformedWebhook(message.into())
    }

    pub fn concurrency_conflict(message: impl Into<String>) -> Self {
        SubscriptionError::ConcurrencyConflict {
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::NotFound(_) | SubscriptionError::NotFoundForExternalId(_) => {
                ErrorCode::SubscriptionNotFound
            }
            SubscriptionError::PlanNotFound(_) => ErrorCode::PlanNotFound,
            SubscriptionError::Retired(_) => ErrorCode::SubscriptionRetired,
            SubscriptionError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            SubscriptionError::PriceMismatch { .. } => ErrorCode::PriceMismatch,
            SubscriptionError::PaymentFailed { .. } => ErrorCode::PaymentRejected,
            SubscriptionError::GatewayUnavailable(_) => ErrorCode::GatewayUnavailable,
            SubscriptionError::InvalidWebhookSignature => ErrorCode::SignatureInvalid,
            SubscriptionError::MalformedWebhook(_) => ErrorCode::WebhookMalformed,
            SubscriptionError::ConcurrencyConflict { .. } => ErrorCode::ConcurrencyConflict,
            SubscriptionError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            SubscriptionError::NotFound(id) => format!("Subscription not found: {}", id),
            SubscriptionError::NotFoundForExternalId(external_id) => {
                format!("No subscription tracks gateway transaction: {}", external_id)
            }
            SubscriptionError::PlanNotFound(plan_id) => format!("Plan not found: {}", plan_id),
            SubscriptionError::Retired(id) => {
                format!("Subscription {} is retired and cannot be billed", id)
            }
            SubscriptionError::InvalidState { current, attempted } => {
                format!("Cannot {} subscription in {} state", attempted, current)
            }
            SubscriptionError::PriceMismatch { expected, actual } => {
                format!(
                    "Settled amount {} does not match the agreed charge {}",
                    actual, expected
                )
            }
            SubscriptionError::PaymentFailed { reason } => format!("Payment failed: {}", reason),
            SubscriptionError::GatewayUnavailable(msg) => {
                format!("Payment gateway unavailable: {}", msg)
            }
            SubscriptionError::InvalidWebhookSignature => {
                "Invalid webhook signature".to_string()
            }
            SubscriptionError::MalformedWebhook(msg) => {
                format!("Malformed webhook payload: {}", msg)
            }
            SubscriptionError::ConcurrencyConflict { message } => {
                format!("Concurrent update conflict: {}", message)
            }
            SubscriptionError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            SubscriptionError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubscriptionError::GatewayUnavailable(_)
                | SubscriptionError::ConcurrencyConflict { .. }
                | SubscriptionError::Infrastructure(_)
        )
    }
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SubscriptionError {}

impl From<ValidationError> for SubscriptionError {
    fn from(err: ValidationError) -> Self {
        let field = match &err {
            ValidationError::EmptyField { field } => field.clone(),
            ValidationError::OutOfRange { field, .. } => field.clone(),
            ValidationError::InvalidFormat { field, .. } => field.clone(),
        };
        SubscriptionError::ValidationFailed {
            field,
            message: err.to_string(),
        }
    }
}

impl From<MoneyError> for SubscriptionError {
    fn from(err: MoneyError) -> Self {
        SubscriptionError::validation("amount", err.to_string())
    }
}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::PlanNotFound => {
                SubscriptionError::Infrastructure(err.to_string())
            }
            ErrorCode::PaymentRejected => SubscriptionError::PaymentFailed {
                reason: err.to_string(),
            },
            ErrorCode::GatewayUnavailable => {
                SubscriptionError::GatewayUnavailable(err.to_string())
            }
            ErrorCode::SignatureInvalid => SubscriptionError::InvalidWebhookSignature,
            ErrorCode::WebhookMalformed => {
                SubscriptionError::MalformedWebhook(err.to_string())
            }
            ErrorCode::InvalidStateTransition => SubscriptionError::InvalidState {
                current: "unknown".to_string(),
                attempted: err.to_string(),
            },
            ErrorCode::ConcurrencyConflict => SubscriptionError::ConcurrencyConflict {
                message: err.to_string(),
            },
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => SubscriptionError::ValidationFailed {
                field: "unknown".to_string(),
                message: err.to_string(),
            },
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}
