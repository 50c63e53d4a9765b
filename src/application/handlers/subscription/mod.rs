//! Subscription billing handlers.
//!
//! Command and query handlers for the subscription lifecycle:
//!
//! ## Commands
//! - Creating subscriptions (free plans short-circuit the gateway)
//! - Renewing / retrying payment for the next period
//! - Changing plans with pro-rated credit
//! - Cancelling subscriptions
//! - Processing provider webhooks
//! - Expiring subscriptions whose grace ran out
//!
//! ## Queries
//! - Check tenant access

mod cancel_subscription;
mod change_plan;
mod charge_execution;
mod check_access;
mod create_subscription;
mod expire_subscriptions;
mod process_webhook;
mod renew_subscription;

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use change_plan::{
    ChangePlanCommand, ChangePlanHandler, ChangePlanOutcome, ChangePlanResult,
};
pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionOutcome,
    CreateSubscriptionResult,
};
pub use expire_subscriptions::{
    ExpireSubscriptionsCommand, ExpireSubscriptionsHandler, ExpireSubscriptionsResult,
};
pub use process_webhook::{ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult};
pub use renew_subscription::{
    RenewSubscriptionCommand, RenewSubscriptionHandler, RenewSubscriptionOutcome,
    RenewSubscriptionResult,
};

// Queries
pub use check_access::{CheckAccessHandler, CheckAccessQuery, CheckAccessResult};

use crate::domain::subscription::{SubscriptionError, SubscriptionEvent};
use crate::ports::EventPublisher;

/// Wraps lifecycle events into envelopes and hands them to the publisher.
///
/// Called strictly after the repository write succeeds; a publish failure
/// surfaces as infrastructure and never rolls back the state change.
pub(crate) async fn publish_events(
    publisher: &dyn EventPublisher,
    events: &[SubscriptionEvent],
) -> Result<(), SubscriptionError> {
    use crate::domain::foundation::SerializableDomainEvent;

    if events.is_empty() {
        return Ok(());
    }
    let envelopes = events.iter().map(|event| event.to_envelope()).collect();
    publisher
        .publish_all(envelopes)
        .await
        .map_err(SubscriptionError::from)
}
