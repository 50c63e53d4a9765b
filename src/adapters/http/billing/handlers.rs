//! HTTP handlers for the billing endpoints.
//!
//! These handlers connect Axum routes to application layer command/query
//! handlers. The webhook ingress answers 200 for every structurally accepted
//! delivery; only signature and parse failures surface as HTTP errors.

use std::sync::Arc;

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::handlers::subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, ChangePlanCommand, ChangePlanHandler,
    CheckAccessHandler, CheckAccessQuery, CreateSubscriptionCommand, CreateSubscriptionHandler,
    ProcessWebhookCommand, ProcessWebhookHandler, ProcessWebhookResult, RenewSubscriptionCommand,
    RenewSubscriptionHandler,
};
use crate::domain::foundation::{DomainError, SubscriptionId, TenantId};
use crate::domain::subscription::SubscriptionError;
use crate::ports::{
    EventPublisher, PaymentGateway, PlanCatalog, SubscriptionRepository, WebhookEventRepository,
};

use super::dto::{
    AccessCheckResponse, CancelSubscriptionResponse, ChangePlanRequest, ChangePlanResponse,
    CreateSubscriptionRequest, CreateSubscriptionResponse, ErrorResponse,
    RenewSubscriptionRequest, RenewSubscriptionResponse, SubscriptionResponse, WebhookAckResponse,
};

/// The only payment provider wired today.
const PROVIDER_MERCADOPAGO: &str = "mercadopago";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// This struct is cloned for each request and contains Arc-wrapped ports
/// for efficient sharing across handlers.
#[derive(Clone)]
pub struct BillingAppState {
    pub subscription_repository: Arc<dyn SubscriptionRepository>,
    pub plan_catalog: Arc<dyn PlanCatalog>,
    pub payment_gateway: Arc<dyn PaymentGateway>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub event_publisher: Arc<dyn EventPublisher>,
    /// Transport retry budget for synchronous charges.
    pub max_charge_attempts: u32,
}

impl BillingAppState {
    /// Create handlers on demand from the shared state.
    pub fn create_subscription_handler(&self) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(
            self.subscription_repository.clone(),
            self.plan_catalog.clone(),
            self.payment_gateway.clone(),
            self.event_publisher.clone(),
        )
        .with_max_charge_attempts(self.max_charge_attempts)
    }

    pub fn change_plan_handler(&self) -> ChangePlanHandler {
        ChangePlanHandler::new(
            self.subscription_repository.clone(),
            self.plan_catalog.clone(),
            self.payment_gateway.clone(),
            self.event_publisher.clone(),
        )
        .with_max_charge_attempts(self.max_charge_attempts)
    }

    pub fn renew_subscription_handler(&self) -> RenewSubscriptionHandler {
        RenewSubscriptionHandler::new(
            self.subscription_repository.clone(),
            self.payment_gateway.clone(),
            self.event_publisher.clone(),
        )
        .with_max_charge_attempts(self.max_charge_attempts)
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.subscription_repository.clone(),
            self.event_publisher.clone(),
        )
    }

    pub fn check_access_handler(&self) -> CheckAccessHandler {
        CheckAccessHandler::new(self.subscription_repository.clone())
    }

    pub fn webhook_handler(&self) -> ProcessWebhookHandler {
        ProcessWebhookHandler::new(
            self.subscription_repository.clone(),
            self.payment_gateway.clone(),
            self.webhook_events.clone(),
            self.event_publisher.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Tenant Context (would come from auth middleware in production)
// ════════════════════════════════════════════════════════════════════════════════

/// Tenant context extracted from the request.
///
/// Authentication itself is handled upstream (API gateway); this service
/// trusts the `X-Tenant-Id` header the gateway injects after validating the
/// caller's credentials.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: TenantId,
}

/// Rejection type for TenantContext extraction.
pub struct TenantRequired;

impl IntoResponse for TenantRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new(
            "TENANT_REQUIRED",
            "X-Tenant-Id header with a valid tenant UUID is required",
        );
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = TenantRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let tenant_id = parts
                .headers
                .get("X-Tenant-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<TenantId>().ok())
                .ok_or(TenantRequired)?;

            Ok(TenantContext { tenant_id })
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /billing/subscriptions/:id - Get one subscription
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    tenant: TenantContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscription_id = parse_subscription_id(&id)?;
    let subscription = load_owned(&state, &tenant, &subscription_id).await?;

    Ok(Json(SubscriptionResponse::from(&subscription)))
}

/// GET /billing/access - Check whether the tenant may use the platform
pub async fn check_access(
    State(state): State<BillingAppState>,
    tenant: TenantContext,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.check_access_handler();
    let query = CheckAccessQuery {
        tenant_id: tenant.tenant_id,
    };

    let result = handler.handle(query).await?;

    Ok(Json(AccessCheckResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /billing/subscriptions - Create a subscription and run the
/// first charge
pub async fn create_subscription(
    State(state): State<BillingAppState>,
    tenant: TenantContext,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let handler = state.create_subscription_handler();
    let cmd = CreateSubscriptionCommand {
        tenant_id: tenant.tenant_id,
        plan_id: request.plan_id,
        cycle: request.cycle,
        payment_method: request.payment_method,
        card_token: request.card_token,
        payer_email: request.payer_email,
        payer_tax_id: request.payer_tax_id,
    };

    let result = handler.handle(cmd).await?;

    let response = CreateSubscriptionResponse::from(result);
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /billing/subscriptions/:id/change-plan - Move to another plan
/// with pro-rated credit
pub async fn change_plan(
    State(state): State<BillingAppState>,
    tenant: TenantContext,
    Path(id): Path<String>,
    Json(request): Json<ChangePlanRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscription_id = parse_subscription_id(&id)?;
    // Ownership gate before the handler touches the row
    load_owned(&state, &tenant, &subscription_id).await?;

    let handler = state.change_plan_handler();
    let cmd = ChangePlanCommand {
        subscription_id,
        new_plan_id: request.new_plan_id,
        cycle: request.cycle,
        payment_method: request.payment_method,
        card_token: request.card_token,
        payer_email: request.payer_email,
        payer_tax_id: request.payer_tax_id,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(ChangePlanResponse::from(result)))
}

/// POST /billing/subscriptions/:id/renew - Charge the next billing period
///
/// Also the recovery path for a `suspensa` subscription: an approved retry
/// restores access through the same reconciliation.
pub async fn renew_subscription(
    State(state): State<BillingAppState>,
    tenant: TenantContext,
    Path(id): Path<String>,
    Json(request): Json<RenewSubscriptionRequest>,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscription_id = parse_subscription_id(&id)?;
    load_owned(&state, &tenant, &subscription_id).await?;

    let handler = state.renew_subscription_handler();
    let cmd = RenewSubscriptionCommand {
        subscription_id,
        card_token: request.card_token,
        payer_email: request.payer_email,
        payer_tax_id: request.payer_tax_id,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(RenewSubscriptionResponse::from(result)))
}

/// POST /billing/subscriptions/:id/cancel - Cancel a subscription
///
/// Access continues until the end of the already-paid period; the response
/// carries that boundary.
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    tenant: TenantContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, BillingApiError> {
    let subscription_id = parse_subscription_id(&id)?;
    load_owned(&state, &tenant, &subscription_id).await?;

    let handler = state.cancel_subscription_handler();
    let cmd = CancelSubscriptionCommand { subscription_id };

    let result = handler.handle(cmd).await?;

    Ok(Json(CancelSubscriptionResponse::from(result)))
}

/// POST /webhooks/:provider - Payment provider notification ingress
///
/// Public route authenticated by signature only. Answers 200 once the
/// delivery is authenticated and parsed, whatever reconciliation then
/// decides; the provider must never redeliver for business-level outcomes.
pub async fn handle_provider_webhook(
    State(state): State<BillingAppState>,
    Path(provider): Path<String>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Result<Response, BillingApiError> {
    if provider != PROVIDER_MERCADOPAGO {
        tracing::warn!(provider = %provider, "webhook for unknown provider");
        let error = ErrorResponse::new(
            "UNKNOWN_PROVIDER",
            format!("no payment provider named '{}'", provider),
        );
        return Ok((StatusCode::NOT_FOUND, Json(error)).into_response());
    }

    // A delivery without a signature header is unauthenticated, same as a
    // delivery with a bad one.
    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("webhook delivery without x-signature header");
            SubscriptionError::invalid_webhook_signature()
        })?;

    let handler = state.webhook_handler();
    let cmd = ProcessWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };

    let result = handler.handle(cmd).await?;

    let outcome = match result {
        ProcessWebhookResult::Applied { .. } => "applied",
        ProcessWebhookResult::AlreadyProcessed { .. } => "already_processed",
        ProcessWebhookResult::Discarded { .. } => "discarded",
        ProcessWebhookResult::Ignored { .. } => "ignored",
        ProcessWebhookResult::Failed { .. } => "failed",
    };

    let ack = WebhookAckResponse {
        received: true,
        outcome,
    };
    Ok((StatusCode::OK, Json(ack)).into_response())
}

// ════════════════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════════════════

fn parse_subscription_id(raw: &str) -> Result<SubscriptionId, BillingApiError> {
    raw.parse::<SubscriptionId>().map_err(|_| {
        SubscriptionError::validation("subscription_id", format!("'{}' is not a UUID", raw)).into()
    })
}

/// Loads a subscription and checks it belongs to the calling tenant.
///
/// A foreign subscription answers 404, indistinguishable from a missing
/// one, so ids cannot be probed across tenants.
async fn load_owned(
    state: &BillingAppState,
    tenant: &TenantContext,
    id: &SubscriptionId,
) -> Result<crate::domain::subscription::Subscription, BillingApiError> {
    let subscription = state
        .subscription_repository
        .find_by_id(id)
        .await?
        .ok_or_else(|| SubscriptionError::not_found(*id))?;

    if subscription.tenant_id != tenant.tenant_id {
        return Err(SubscriptionError::not_found(*id).into());
    }

    Ok(subscription)
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts subscription errors to HTTP responses.
#[derive(Debug)]
pub struct BillingApiError(SubscriptionError);

impl From<SubscriptionError> for BillingApiError {
    fn from(err: SubscriptionError) -> Self {
        Self(err)
    }
}

impl From<DomainError> for BillingApiError {
    fn from(err: DomainError) -> Self {
        Self(SubscriptionError::from(err))
    }
}

impl IntoResponse for BillingApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            SubscriptionError::NotFound(_) | SubscriptionError::NotFoundForExternalId(_) => {
                (StatusCode::NOT_FOUND, "SUBSCRIPTION_NOT_FOUND")
            }
            SubscriptionError::PlanNotFound(_) => (StatusCode::NOT_FOUND, "PLAN_NOT_FOUND"),
            SubscriptionError::Retired(_) => (StatusCode::CONFLICT, "SUBSCRIPTION_RETIRED"),
            SubscriptionError::InvalidState { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_STATE_TRANSITION")
            }
            SubscriptionError::PriceMismatch { .. } => (StatusCode::CONFLICT, "PRICE_MISMATCH"),
            SubscriptionError::PaymentFailed { .. } => {
                (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REJECTED")
            }
            SubscriptionError::GatewayUnavailable(_) => {
                (StatusCode::BAD_GATEWAY, "GATEWAY_UNAVAILABLE")
            }
            SubscriptionError::InvalidWebhookSignature => {
                (StatusCode::UNAUTHORIZED, "INVALID_WEBHOOK_SIGNATURE")
            }
            SubscriptionError::MalformedWebhook(_) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_WEBHOOK")
            }
            SubscriptionError::ConcurrencyConflict { .. } => {
                (StatusCode::CONFLICT, "CONCURRENCY_CONFLICT")
            }
            SubscriptionError::ValidationFailed { .. } => {
                (StatusCode::BAD_REQUEST, "VALIDATION_FAILED")
            }
            SubscriptionError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        // Use the error's built-in message() method for consistent messaging
        let message = self.0.message();
        let body = ErrorResponse::new(error_code, message);
        (status, Json(body)).into_response()
    }
}
