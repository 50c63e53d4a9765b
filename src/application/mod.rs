//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Following CQRS, it separates command handlers (write) from query handlers
//! (read).

pub mod handlers;

pub use handlers::subscription::{
    // Commands
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    ChangePlanCommand, ChangePlanHandler, ChangePlanOutcome, ChangePlanResult,
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionOutcome,
    CreateSubscriptionResult,
    ExpireSubscriptionsCommand, ExpireSubscriptionsHandler, ExpireSubscriptionsResult,
    ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult,
    RenewSubscriptionCommand, RenewSubscriptionHandler, RenewSubscriptionOutcome,
    RenewSubscriptionResult,
    // Queries
    CheckAccessHandler, CheckAccessQuery, CheckAccessResult,
};
