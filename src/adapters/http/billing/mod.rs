//! HTTP adapter for the billing endpoints.
//!
//! Exposes the subscription lifecycle via REST API:
//! - `POST /billing/subscriptions` - Create a subscription
//! - `GET /billing/subscriptions/:id` - Get one subscription
//! - `POST /billing/subscriptions/:id/renew` - Charge the next billing period
//! - `POST /billing/subscriptions/:id/change-plan` - Move to another plan
//! - `POST /billing/subscriptions/:id/cancel` - Cancel a subscription
//! - `GET /billing/access` - Check tenant access
//! - `POST /webhooks/mercadopago` - Payment provider webhook ingress

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{BillingApiError, BillingAppState, TenantContext};
pub use routes::{billing_router, subscription_routes, webhook_routes};
