//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresSubscriptionRepository` - optimistic-locked subscription rows
//! - `PostgresWebhookEventRepository` - webhook delivery dedup store
//! - `PostgresPlanCatalog` - read-only view onto the plan offerings

mod plan_catalog;
mod subscription_repository;
mod webhook_event_repository;

pub use plan_catalog::PostgresPlanCatalog;
pub use subscription_repository::PostgresSubscriptionRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
