//! In-memory adapters for tests and local development.
//!
//! Each one honors the same contract as its production counterpart
//! (optimistic locking, event-id dedup) so integration tests exercise the
//! real failure paths.

mod event_publisher;
mod plan_catalog;
mod subscription_repository;
mod webhook_event_repository;

pub use event_publisher::CollectingEventPublisher;
pub use plan_catalog::InMemoryPlanCatalog;
pub use subscription_repository::InMemorySubscriptionRepository;
pub use webhook_event_repository::InMemoryWebhookEventRepository;
