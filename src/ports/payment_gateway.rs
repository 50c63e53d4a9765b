//! Payment gateway port for external charge processing.
//!
//! Defines the contract for the payment provider integration (Mercado Pago
//! in production, a scripted fake in tests). The gateway holds no persisted
//! state; everything it learns flows back as a [`PaymentResult`] and is
//! reconciled onto subscriptions by the caller.
//!
//! # Design
//!
//! - **Idempotent charges**: every charge carries a deterministic
//!   idempotency key derived from the subscription and billing period, so a
//!   retry after a transport failure can never double-charge.
//! - **Unknown outcome is not failure**: a [`GatewayError::Transport`] means
//!   the charge may or may not have happened. Callers retry with the same
//!   key or resolve later via `query_status`; they never record a decline.
//! - **Declines are results, not errors**: a provider that answers
//!   "rejected" has answered. That surfaces as a normal [`PaymentResult`]
//!   and drives the `suspensa` transition during reconciliation.

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::domain::payment::{IdempotencyKey, PaymentRequest, PaymentResult};
use crate::domain::subscription::SubscriptionError;
use async_trait::async_trait;

/// Port for the payment provider integration.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Performs a charge attempt.
    ///
    /// Retrying with the same `idempotency_key` and an identical request
    /// must never create a second charge at the provider.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Transport`] when the outcome is unknown (network
    /// failure, timeout, provider 5xx); safe to retry with the same key.
    /// Business declines are NOT errors; they come back as a result with
    /// status `rejected`.
    async fn charge(
        &self,
        request: &PaymentRequest,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentResult, GatewayError>;

    /// Fetches the current state of a charge by the provider's id.
    ///
    /// Used to resolve unknown outcomes after a transport failure and by
    /// manual reconciliation jobs.
    async fn query_status(&self, external_id: &str) -> Result<PaymentResult, GatewayError>;

    /// Verifies the cryptographic signature of a webhook delivery.
    ///
    /// Must be called before any state mutation. `now` is passed explicitly
    /// so the freshness window is testable.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InvalidSignature`] when the signature does not match
    /// or the signed timestamp is outside the accepted window.
    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: Timestamp,
    ) -> Result<(), GatewayError>;

    /// Parses a verified webhook payload into a normalized notification.
    ///
    /// # Errors
    ///
    /// [`GatewayError::MalformedPayload`] when the body is not the JSON
    /// shape the provider documents.
    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookNotification, GatewayError>;
}

/// A provider notification, normalized to the same [`PaymentResult`] shape
/// the synchronous charge path produces.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookNotification {
    /// Provider's delivery id; the deduplication key for at-least-once
    /// webhook delivery.
    pub event_id: String,

    /// Provider's event type (e.g. "payment.updated").
    pub event_type: String,

    /// The payment fact carried by this notification.
    pub result: PaymentResult,
}

/// Errors from gateway operations.
///
/// Every variant describes a failure to learn the charge outcome, never the
/// outcome itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure, timeout, or provider 5xx. Outcome unknown; retry
    /// with the same idempotency key.
    Transport { message: String },

    /// Provider answered with a shape the integration does not understand.
    Protocol { message: String },

    /// Provider rejected our credentials. Operational misconfiguration.
    Authentication { message: String },

    /// Webhook signature verification failed.
    InvalidSignature,

    /// Webhook payload could not be parsed.
    MalformedPayload { message: String },
}

impl GatewayError {
    pub fn transport(message: impl Into<String>) -> Self {
        GatewayError::Transport {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        GatewayError::Protocol {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        GatewayError::Authentication {
            message: message.into(),
        }
    }

    pub fn invalid_signature() -> Self {
        GatewayError::InvalidSignature
    }

    pub fn malformed_payload(message: impl Into<String>) -> Self {
        GatewayError::MalformedPayload {
            message: message.into(),
        }
    }

    /// Returns true if retrying the same call (with the same idempotency
    /// key) may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transport { .. })
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayError::Transport { message } => write!(f, "gateway transport failure: {}", message),
            GatewayError::Protocol { message } => write!(f, "gateway protocol violation: {}", message),
            GatewayError::Authentication { message } => {
                write!(f, "gateway authentication failure: {}", message)
            }
            GatewayError::InvalidSignature => write!(f, "webhook signature verification failed"),
            GatewayError::MalformedPayload { message } => {
                write!(f, "malformed webhook payload: {}", message)
            }
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for DomainError {
    fn from(err: GatewayError) -> Self {
        let code = match err {
            GatewayError::Transport { .. }
            | GatewayError::Protocol { .. }
            | GatewayError::Authentication { .. } => ErrorCode::GatewayUnavailable,
            GatewayError::InvalidSignature => ErrorCode::SignatureInvalid,
            GatewayError::MalformedPayload { .. } => ErrorCode::WebhookMalformed,
        };
        DomainError::new(code, err.to_string())
    }
}

impl From<GatewayError> for SubscriptionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidSignature => SubscriptionError::InvalidWebhookSignature,
            GatewayError::MalformedPayload { message } => {
                SubscriptionError::MalformedWebhook(message)
            }
            other => SubscriptionError::GatewayUnavailable(other.to_string()),
        }
    }
}
