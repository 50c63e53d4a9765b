//! Mercado Pago payment gateway adapter.
//!
//! Implements [`PaymentGateway`] against the provider's REST API: charge
//! creation with idempotency keys, charge status queries, and webhook
//! signature verification.
//!
//! # Security
//!
//! - Credentials held as `secrecy::SecretString`, never logged
//! - HMAC-SHA256 webhook signatures compared in constant time
//! - Signed timestamps accepted inside a bounded freshness window
//!
//! # Error mapping
//!
//! A provider decline is not an error here: the provider answered, and the
//! answer flows back as a `rejected` [`PaymentResult`]. Errors mean the
//! outcome is unknown (`Transport`), the integration is broken (`Protocol`),
//! or the credentials are (`Authentication`).

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::domain::foundation::Timestamp;
use crate::domain::payment::{IdempotencyKey, PaymentRequest, PaymentResult};
use crate::ports::{GatewayError, PaymentGateway, WebhookNotification};

use super::wire::{self, MpPayment, MpPaymentRequest, SignatureHeader};

/// Default bound on any single provider call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Provider API configuration.
#[derive(Clone)]
pub struct MercadoPagoConfig {
    /// Access token for the REST API (APP_USR-... in production).
    access_token: SecretString,

    /// Shared secret for webhook signature verification.
    webhook_secret: SecretString,

    /// Base URL for the provider API.
    base_url: String,

    /// Per-request timeout; past it the outcome is unknown, not failed.
    timeout: Duration,
}

impl MercadoPagoConfig {
    /// Creates a configuration with production defaults.
    pub fn new(access_token: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            base_url: "https://api.mercadopago.com".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the API base URL (sandbox, local stub).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Overrides the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTPS adapter implementing [`PaymentGateway`].
pub struct MercadoPagoAdapter {
    config: MercadoPagoConfig,
    http_client: reqwest::Client,
}

impl MercadoPagoAdapter {
    /// Builds the adapter and its bounded-timeout HTTP client.
    pub fn new(config: MercadoPagoConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Reads a payment object out of a provider response, mapping HTTP
    /// failures onto the gateway error taxonomy.
    async fn read_payment(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<PaymentResult, GatewayError> {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(GatewayError::authentication(format!(
                "{}: provider rejected credentials ({})",
                context, status
            )));
        }

        if status.is_server_error() {
            // 5xx means the provider may or may not have acted; retryable.
            tracing::error!(%status, context, "provider returned a server error");
            return Err(GatewayError::transport(format!(
                "{}: provider returned {}",
                context, status
            )));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, context, body = %body, "provider rejected the request");
            return Err(GatewayError::protocol(format!(
                "{}: provider returned {}: {}",
                context, status, body
            )));
        }

        let payment: MpPayment = response.json().await.map_err(|e| {
            GatewayError::protocol(format!("{}: unreadable provider response: {}", context, e))
        })?;

        payment.into_result()
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoAdapter {
    async fn charge(
        &self,
        request: &PaymentRequest,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentResult, GatewayError> {
        let url = format!("{}/v1/payments", self.config.base_url);
        let body = MpPaymentRequest::from(request);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .header("X-Idempotency-Key", idempotency_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "charge request failed in transit");
                GatewayError::transport(e.to_string())
            })?;

        let result = self.read_payment(response, "create payment").await?;

        tracing::info!(
            external_id = %result.external_id,
            status = %result.status,
            "provider answered charge"
        );

        Ok(result)
    }

    async fn query_status(&self, external_id: &str) -> Result<PaymentResult, GatewayError> {
        let url = format!("{}/v1/payments/{}", self.config.base_url, external_id);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, external_id, "status query failed in transit");
                GatewayError::transport(e.to_string())
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::protocol(format!(
                "charge '{}' does not exist at the provider",
                external_id
            )));
        }

        self.read_payment(response, "query payment").await
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        let header = SignatureHeader::parse(signature_header).map_err(|e| {
            tracing::warn!(error = %e, "unparseable x-signature header");
            GatewayError::invalid_signature()
        })?;

        wire::verify_signed_payload(
            self.config.webhook_secret.expose_secret(),
            payload,
            &header,
            now.as_unix_secs() as i64,
        )
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookNotification, GatewayError> {
        wire::parse_webhook_payload(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::PaymentStatus;

    const WEBHOOK_SECRET: &str = "test-webhook-secret";

    fn adapter() -> MercadoPagoAdapter {
        MercadoPagoAdapter::new(MercadoPagoConfig::new("TEST-token", WEBHOOK_SECRET)).unwrap()
    }

    fn sign(payload: &[u8], ts: i64) -> String {
        wire::signature_header_value(WEBHOOK_SECRET, ts, payload)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn config_defaults_to_production_endpoint() {
        let config = MercadoPagoConfig::new("token", "secret");
        assert_eq!(config.base_url, "https://api.mercadopago.com");
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn config_overrides_apply() {
        let config = MercadoPagoConfig::new("token", "secret")
            .with_base_url("http://localhost:9090")
            .with_timeout(Duration::from_secs(2));

        assert_eq!(config.base_url, "http://localhost:9090");
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Signature Verification Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn accepts_valid_signature_inside_window() {
        let payload = br#"{"id":"evt-1"}"#;
        let now = Timestamp::from_unix_secs(1_700_000_200);
        let header = sign(payload, 1_700_000_000);

        let result = adapter().verify_webhook_signature(payload, &header, now);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_signature_with_wrong_secret() {
        let payload = br#"{"id":"evt-1"}"#;
        let now = Timestamp::from_unix_secs(1_700_000_200);
        let header = wire::signature_header_value("wrong-secret", 1_700_000_000, payload);

        let result = adapter().verify_webhook_signature(payload, &header, now);
        assert_eq!(result, Err(GatewayError::InvalidSignature));
    }

    #[test]
    fn rejects_expired_signature() {
        let payload = b"{}";
        let now = Timestamp::from_unix_secs(1_700_000_000 + 600);
        let header = sign(payload, 1_700_000_000);

        let result = adapter().verify_webhook_signature(payload, &header, now);
        assert_eq!(result, Err(GatewayError::InvalidSignature));
    }

    #[test]
    fn rejects_unparseable_header() {
        let payload = b"{}";
        let now = Timestamp::from_unix_secs(1_700_000_000);

        let result = adapter().verify_webhook_signature(payload, "not a header", now);
        assert_eq!(result, Err(GatewayError::InvalidSignature));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Parsing Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn parses_refund_notification() {
        let payload = br#"{
            "id": "evt-900",
            "type": "payment",
            "action": "payment.updated",
            "data": {
                "id": "mp-314",
                "status": "refunded",
                "transaction_amount": 99.9,
                "currency_id": "BRL",
                "payment_method_id": "visa",
                "date_created": "2024-01-15T12:00:00Z"
            }
        }"#;

        let notification = adapter().parse_webhook(payload).unwrap();

        assert_eq!(notification.event_id, "evt-900");
        assert_eq!(notification.event_type, "payment.updated");
        assert_eq!(notification.result.status, PaymentStatus::Refunded);
        assert_eq!(notification.result.external_id, "mp-314");
    }

    #[test]
    fn malformed_body_is_reported_as_such() {
        let result = adapter().parse_webhook(b"<xml/>");
        assert!(matches!(result, Err(GatewayError::MalformedPayload { .. })));
    }
}
