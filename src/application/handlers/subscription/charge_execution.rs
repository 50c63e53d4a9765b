//! Charge execution shared by the synchronous billing handlers.
//!
//! Wraps the gateway call in the bounded-retry discipline for transport
//! failures: the outcome of a failed network call is unknown, so the retry
//! reuses the same idempotency key and the provider deduplicates. When the
//! attempts are exhausted the charge is left unresolved rather than
//! reported as declined; confirmation follows via webhook or a later
//! status query.

use std::sync::Arc;

use crate::domain::payment::{IdempotencyKey, PaymentRequest, PaymentResult};
use crate::domain::subscription::SubscriptionError;
use crate::ports::PaymentGateway;

/// Outcome of a charge attempt series.
#[derive(Debug, Clone)]
pub(super) enum ChargeAttempt {
    /// The provider answered; the result may still be a decline.
    Completed(PaymentResult),

    /// Transport attempts exhausted; outcome unknown at the provider.
    Unresolved,
}

/// Calls `charge` up to `max_attempts` times with the same idempotency key.
///
/// Only transport errors are retried. Protocol and authentication failures
/// surface immediately as gateway errors.
pub(super) async fn charge_with_retry(
    gateway: &Arc<dyn PaymentGateway>,
    request: &PaymentRequest,
    idempotency_key: &IdempotencyKey,
    max_attempts: u32,
) -> Result<ChargeAttempt, SubscriptionError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match gateway.charge(request, idempotency_key).await {
            Ok(result) => return Ok(ChargeAttempt::Completed(result)),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "charge attempt failed in transport, retrying with same idempotency key"
                );
            }
            Err(err) if err.is_retryable() => {
                tracing::error!(
                    attempts = attempt,
                    error = %err,
                    "charge outcome unknown after exhausting transport retries"
                );
                return Ok(ChargeAttempt::Unresolved);
            }
            Err(err) => return Err(err.into()),
        }
    }
}
