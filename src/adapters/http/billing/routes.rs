//! Axum router configuration for the billing endpoints.
//!
//! This module defines the route structure for billing API endpoints and
//! wires them to their corresponding handlers.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, change_plan, check_access, create_subscription, get_subscription,
    handle_provider_webhook, renew_subscription, BillingAppState,
};

/// Create the billing API router.
///
/// # Routes
///
/// ## Tenant Endpoints (tenant id from `X-Tenant-Id` header)
/// - `POST /subscriptions` - Create a subscription and run the first charge
/// - `GET /subscriptions/:id` - Get one subscription
/// - `POST /subscriptions/:id/renew` - Charge the next billing period
/// - `POST /subscriptions/:id/change-plan` - Move to another plan
/// - `POST /subscriptions/:id/cancel` - Cancel a subscription
/// - `GET /access` - Check whether the tenant may use the platform
pub fn subscription_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/subscriptions", post(create_subscription))
        .route("/subscriptions/:id", get(get_subscription))
        .route("/subscriptions/:id/renew", post(renew_subscription))
        .route("/subscriptions/:id/change-plan", post(change_plan))
        .route("/subscriptions/:id/cancel", post(cancel_subscription))
        .route("/access", get(check_access))
}

/// Create the webhook ingress router.
///
/// This is separate from the billing routes because webhooks carry no
/// tenant header; they are authenticated by signature only.
///
/// # Routes
/// - `POST /:provider` - Payment provider notification ingress
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/:provider", post(handle_provider_webhook))
}

/// Create the complete billing module router.
///
/// Combines tenant routes and webhook routes into a single router mounted
/// at the application root, so the provider callback URL stays the
/// documented `/webhooks/{provider}`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/billing", subscription_routes())
        .nest("/webhooks", webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::adapters::memory::{
        CollectingEventPublisher, InMemoryPlanCatalog, InMemorySubscriptionRepository,
        InMemoryWebhookEventRepository,
    };
    use crate::adapters::mercadopago::FakeMercadoPago;

    fn test_state() -> BillingAppState {
        BillingAppState {
            subscription_repository: Arc::new(InMemorySubscriptionRepository::new()),
            plan_catalog: Arc::new(InMemoryPlanCatalog::new()),
            payment_gateway: Arc::new(FakeMercadoPago::new()),
            webhook_events: Arc::new(InMemoryWebhookEventRepository::new()),
            event_publisher: Arc::new(CollectingEventPublisher::new()),
            max_charge_attempts: 3,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Router Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn subscription_routes_create_router() {
        let router = subscription_routes();
        let _: Router<()> = router.with_state(test_state());
    }

    #[test]
    fn webhook_routes_create_router() {
        let router = webhook_routes();
        let _: Router<()> = router.with_state(test_state());
    }

    #[test]
    fn billing_router_creates_combined_router() {
        let router = billing_router();
        let _: Router<()> = router.with_state(test_state());
    }

    // Full request/response coverage lives in the integration tests, which
    // drive this router with tower's oneshot.
}
