//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Billing Ports
//!
//! - `PaymentGateway` - Charge execution and webhook verification at the
//!   payment provider
//! - `SubscriptionRepository` - Subscription persistence with optimistic
//!   concurrency
//! - `PlanCatalog` - Read-only tenant/plan pricing model
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Port for publishing domain events
//! - `WebhookEventRepository` - Provider webhook idempotency tracking

mod event_publisher;
mod payment_gateway;
mod plan_catalog;
mod subscription_repository;
mod webhook_event_repository;

pub use event_publisher::EventPublisher;
pub use payment_gateway::{GatewayError, PaymentGateway, WebhookNotification};
pub use plan_catalog::{PlanCatalog, PlanSnapshot};
pub use subscription_repository::SubscriptionRepository;
pub use webhook_event_repository::{
    SaveResult, WebhookDelivery, WebhookEventRepository,
};
