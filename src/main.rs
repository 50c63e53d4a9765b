//! LicitaGo billing service entrypoint.
//!
//! Boot order: configuration, logging, database pool (plus migrations when
//! enabled), payment gateway client, expiry sweep task, HTTP server.

use std::sync::Arc;

use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use licitago_billing::adapters::events::TracingEventPublisher;
use licitago_billing::adapters::http::{billing_router, BillingAppState};
use licitago_billing::adapters::mercadopago::{MercadoPagoAdapter, MercadoPagoConfig};
use licitago_billing::adapters::postgres::{
    PostgresPlanCatalog, PostgresSubscriptionRepository, PostgresWebhookEventRepository,
};
use licitago_billing::application::handlers::subscription::{
    ExpireSubscriptionsCommand, ExpireSubscriptionsHandler,
};
use licitago_billing::config::AppConfig;
use licitago_billing::domain::foundation::Timestamp;
use licitago_billing::ports::WebhookEventRepository as _;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        sqlx::migrate!().run(&pool).await?;
        tracing::info!("database migrations applied");
    }

    let gateway_config = MercadoPagoConfig::new(
        config.gateway.access_token.clone(),
        config.gateway.webhook_secret.clone(),
    )
    .with_base_url(config.gateway.base_url.clone())
    .with_timeout(config.gateway.timeout());
    let gateway = Arc::new(MercadoPagoAdapter::new(gateway_config)?);

    let state = BillingAppState {
        subscription_repository: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        plan_catalog: Arc::new(PostgresPlanCatalog::new(pool.clone())),
        payment_gateway: gateway,
        webhook_events: Arc::new(PostgresWebhookEventRepository::new(pool.clone())),
        event_publisher: Arc::new(TracingEventPublisher::new()),
        max_charge_attempts: config.billing.max_charge_attempts,
    };

    spawn_expiry_sweep(
        &state,
        config.billing.expire_sweep_interval(),
        config.billing.webhook_retention_days,
    );

    let app = Router::new()
        .merge(billing_router())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .with_state(state);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        environment = ?config.server.environment,
        sandbox = config.gateway.is_test_mode(),
        "billing service listening"
    );

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.is_production() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Periodically retires subscriptions whose paid period plus grace ran out,
/// and prunes webhook deliveries past their retention window.
///
/// The sweep also fires once at startup, so a service that was down over a
/// period boundary catches up immediately.
fn spawn_expiry_sweep(
    state: &BillingAppState,
    interval: std::time::Duration,
    webhook_retention_days: u32,
) {
    let handler = ExpireSubscriptionsHandler::new(
        state.subscription_repository.clone(),
        state.event_publisher.clone(),
    );
    let webhook_events = state.webhook_events.clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match handler.handle(ExpireSubscriptionsCommand).await {
                Ok(result) if !result.expired.is_empty() => {
                    tracing::info!(
                        count = result.expired.len(),
                        skipped = result.skipped,
                        "expiry sweep retired subscriptions"
                    );
                }
                Ok(_) => {}
                Err(err) => tracing::error!(error = %err, "expiry sweep failed"),
            }

            let cutoff = Timestamp::now().minus_days(i64::from(webhook_retention_days));
            match webhook_events.delete_before(cutoff).await {
                Ok(0) => {}
                Ok(pruned) => tracing::info!(pruned, "pruned old webhook deliveries"),
                Err(err) => tracing::error!(error = %err, "webhook delivery prune failed"),
            }
        }
    });
}
