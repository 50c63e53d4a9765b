//! Subscription domain module.
//!
//! Handles the subscription lifecycle, billing-period math, and the
//! reconciliation of gateway payment results from both the synchronous
//! charge path and asynchronous webhooks.
//!
//! # Module Structure
//!
//! - `aggregate` - Subscription aggregate entity
//! - `billing` - BillingCycle and pro-ration math
//! - `errors` - SubscriptionError taxonomy
//! - `events` - Lifecycle domain events
//! - `reconcile` - The shared payment-result reconciliation function
//! - `status` - SubscriptionStatus state machine

mod aggregate;
mod billing;
mod errors;
mod events;
mod reconcile;
mod status;

pub use aggregate::Subscription;
pub use billing::{proration_credit, BillingCycle};
pub use errors::SubscriptionError;
pub use events::{SubscriptionEvent, SuspensionReason};
pub use reconcile::{reconcile, ReconcileOutcome};
pub use status::SubscriptionStatus;
