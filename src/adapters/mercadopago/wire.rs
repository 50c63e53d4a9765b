//! Mercado Pago wire types and webhook signature scheme.
//!
//! Everything in this module speaks the provider's JSON dialect and converts
//! it to domain types at the edge. The same payment shape arrives from the
//! synchronous charge response and from webhook deliveries, so both paths
//! funnel through [`MpPayment::into_result`] and reconciliation cannot tell
//! them apart.
//!
//! The signature helpers are shared between the HTTPS adapter and the
//! scripted fake so that deliveries the fake emits verify under exactly the
//! rules the production adapter enforces.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

use crate::domain::foundation::{Currency, Money, Timestamp};
use crate::domain::payment::{PaymentMethod, PaymentRequest, PaymentResult, PaymentStatus};
use crate::ports::{GatewayError, WebhookNotification};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for a signed webhook delivery (5 minutes).
pub(super) const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for timestamps from the future (60 seconds).
pub(super) const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

// ════════════════════════════════════════════════════════════════════════════════
// Signature Header
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the `x-signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    /// Header is empty or missing.
    Empty,
    /// A segment is not of the `key=value` form.
    MalformedSegment,
    /// Missing the `ts=` component.
    MissingTimestamp,
    /// Missing the `v1=` component.
    MissingSignature,
    /// Timestamp is not a unix integer.
    InvalidTimestamp,
    /// Signature is not valid hex.
    InvalidHex,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "signature header is empty"),
            Self::MalformedSegment => write!(f, "signature header segment is not key=value"),
            Self::MissingTimestamp => write!(f, "signature header is missing ts="),
            Self::MissingSignature => write!(f, "signature header is missing v1="),
            Self::InvalidTimestamp => write!(f, "signature timestamp is not a unix integer"),
            Self::InvalidHex => write!(f, "signature is not valid hex"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed `x-signature` header: `ts=<unix>,v1=<hex>`.
///
/// Unknown segments are ignored for forward compatibility.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    /// Unix timestamp the provider signed into the delivery.
    pub timestamp: i64,

    /// HMAC-SHA256 digest, hex-decoded.
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parses an `x-signature` header value.
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::Empty);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for segment in header.split(',') {
            let (key, value) = segment
                .split_once('=')
                .ok_or(SignatureParseError::MalformedSegment)?;

            match key.trim() {
                "ts" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signature = Some(
                        hex::decode(value.trim()).map_err(|_| SignatureParseError::InvalidHex)?,
                    );
                }
                _ => {}
            }
        }

        Ok(Self {
            timestamp: timestamp.ok_or(SignatureParseError::MissingTimestamp)?,
            v1_signature: v1_signature.ok_or(SignatureParseError::MissingSignature)?,
        })
    }
}

/// Computes the HMAC-SHA256 digest over `"{ts}.{body}"`.
pub(super) fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Builds a complete `x-signature` header value for a payload.
pub(super) fn signature_header_value(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    format!(
        "ts={},v1={}",
        timestamp,
        hex::encode(compute_signature(secret, timestamp, payload))
    )
}

/// Verifies a parsed signature against a payload.
///
/// Checks the freshness window first, then compares digests in constant
/// time. `now_unix` is passed in so the window is testable.
pub(super) fn verify_signed_payload(
    secret: &str,
    payload: &[u8],
    header: &SignatureHeader,
    now_unix: i64,
) -> Result<(), GatewayError> {
    let age = now_unix - header.timestamp;

    if age > MAX_TIMESTAMP_AGE_SECS {
        tracing::warn!(
            signed_timestamp = header.timestamp,
            age_secs = age,
            "webhook signature outside freshness window"
        );
        return Err(GatewayError::invalid_signature());
    }

    if age < -MAX_FUTURE_TOLERANCE_SECS {
        tracing::warn!(
            signed_timestamp = header.timestamp,
            current_time = now_unix,
            "webhook signature timestamp from the future"
        );
        return Err(GatewayError::invalid_signature());
    }

    let expected = compute_signature(secret, header.timestamp, payload);
    if expected
        .as_slice()
        .ct_eq(header.v1_signature.as_slice())
        .unwrap_u8()
        != 1
    {
        tracing::warn!(signed_timestamp = header.timestamp, "webhook signature mismatch");
        return Err(GatewayError::invalid_signature());
    }

    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════════
// Charge Request (outbound)
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /v1/payments`.
#[derive(Debug, Clone, Serialize)]
pub(super) struct MpPaymentRequest {
    pub transaction_amount: Decimal,
    pub description: String,
    pub payment_method_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub installments: u8,
    pub external_reference: String,
    pub payer: MpPayerRequest,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub(super) struct MpPayerRequest {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identification: Option<MpIdentification>,
}

/// Brazilian tax id as the provider expects it.
#[derive(Debug, Clone, Serialize)]
pub(super) struct MpIdentification {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub number: String,
}

impl From<&PaymentRequest> for MpPaymentRequest {
    fn from(request: &PaymentRequest) -> Self {
        let identification = request.payer_tax_id.as_ref().map(|tax_id| {
            let digits = tax_id.chars().filter(char::is_ascii_digit).count();
            MpIdentification {
                // PaymentRequest validation only admits 11 or 14 digits
                kind: if digits == 14 { "CNPJ" } else { "CPF" },
                number: tax_id.clone(),
            }
        });

        Self {
            transaction_amount: request.amount.to_decimal(),
            description: request.description.clone(),
            payment_method_id: request.method.as_str().to_string(),
            token: request.card_token.clone(),
            installments: request.installments,
            external_reference: request.external_reference.clone(),
            payer: MpPayerRequest {
                email: request.payer_email.clone(),
                identification,
            },
            metadata: request.metadata.clone(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Payment Object (inbound)
// ════════════════════════════════════════════════════════════════════════════════

/// Provider identifiers arrive as JSON numbers on live traffic and as
/// strings from tooling; both normalize to strings internally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(super) enum MpId {
    Number(i64),
    Text(String),
}

impl MpId {
    pub(super) fn into_string(self) -> String {
        match self {
            MpId::Number(n) => n.to_string(),
            MpId::Text(s) => s,
        }
    }
}

/// Payment object as returned by the charge and query endpoints and embedded
/// in webhook deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct MpPayment {
    pub id: MpId,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    pub transaction_amount: Decimal,
    pub currency_id: String,
    pub payment_method_id: String,
    pub date_created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_approved: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<MpPayer>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct MpPayer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl MpPayment {
    /// Converts the provider payment into the normalized domain result.
    pub(super) fn into_result(self) -> Result<PaymentResult, GatewayError> {
        let status = map_status(&self.status)?;
        let method = map_method(&self.payment_method_id)?;

        let currency = self
            .currency_id
            .parse::<Currency>()
            .map_err(|e| GatewayError::protocol(e.to_string()))?;
        let amount = Money::from_decimal(self.transaction_amount, currency).map_err(|e| {
            GatewayError::protocol(format!("unusable transaction_amount: {}", e))
        })?;

        let created_at = Timestamp::from_datetime(self.date_created);
        // Reversed charges still carry their historical date_approved on the
        // wire; the domain invariant ties approved_at to the approved status.
        let approved_at = match status {
            PaymentStatus::Approved => Some(
                self.date_approved
                    .map(Timestamp::from_datetime)
                    .unwrap_or(created_at),
            ),
            _ => None,
        };

        let mut result = PaymentResult::new(
            self.id.into_string(),
            status,
            amount,
            method,
            created_at,
            approved_at,
        )
        .map_err(|e| GatewayError::protocol(e.to_string()))?;

        if let Some(email) = self.payer.and_then(|p| p.email) {
            result = result.with_payer_email(email);
        }
        if status == PaymentStatus::Rejected {
            result.error_message = self.status_detail;
        }
        result = result.with_metadata(self.metadata);

        Ok(result)
    }

    /// Builds the wire shape back from a domain result (fake deliveries).
    pub(super) fn from_result(result: &PaymentResult) -> Self {
        Self {
            id: MpId::Text(result.external_id.clone()),
            status: result.status.as_str().to_string(),
            status_detail: result.error_message.clone(),
            transaction_amount: result.amount.to_decimal(),
            currency_id: result.amount.currency().as_str().to_string(),
            payment_method_id: result.method.as_str().to_string(),
            date_created: *result.created_at.as_datetime(),
            date_approved: result.approved_at.map(|ts| *ts.as_datetime()),
            external_reference: None,
            payer: result.payer_email.clone().map(|email| MpPayer { email: Some(email) }),
            metadata: result.metadata.clone(),
        }
    }
}

/// Maps the provider's charge status vocabulary onto the closed domain one.
fn map_status(status: &str) -> Result<PaymentStatus, GatewayError> {
    match status {
        "pending" => Ok(PaymentStatus::Pending),
        "in_process" | "in_mediation" | "authorized" => Ok(PaymentStatus::InProcess),
        "approved" => Ok(PaymentStatus::Approved),
        "rejected" => Ok(PaymentStatus::Rejected),
        "cancelled" => Ok(PaymentStatus::Cancelled),
        "refunded" | "charged_back" => Ok(PaymentStatus::Refunded),
        other => Err(GatewayError::protocol(format!(
            "unknown charge status '{}'",
            other
        ))),
    }
}

/// Maps the provider's method identifier onto the domain vocabulary.
///
/// Card charges come back with the card brand as the method id.
fn map_method(payment_method_id: &str) -> Result<PaymentMethod, GatewayError> {
    match payment_method_id {
        "pix" => Ok(PaymentMethod::Pix),
        "boleto" | "bolbradesco" => Ok(PaymentMethod::Boleto),
        "credit_card" | "visa" | "master" | "amex" | "elo" | "hipercard" => {
            Ok(PaymentMethod::CreditCard)
        }
        other => Err(GatewayError::protocol(format!(
            "unknown payment_method_id '{}'",
            other
        ))),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Webhook delivery envelope: event id, event type, and the charge object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct MpWebhookEvent {
    pub id: MpId,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub live_mode: bool,
    pub data: MpPayment,
}

/// Parses a webhook body into the normalized notification.
///
/// Any defect in the body, including an unknown status or method, surfaces
/// as [`GatewayError::MalformedPayload`]; the charge paths keep the same
/// defects as [`GatewayError::Protocol`].
pub(super) fn parse_webhook_payload(payload: &[u8]) -> Result<WebhookNotification, GatewayError> {
    let event: MpWebhookEvent = serde_json::from_slice(payload)
        .map_err(|e| GatewayError::malformed_payload(format!("invalid webhook JSON: {}", e)))?;

    let event_id = event.id.into_string();
    let event_type = event.action.unwrap_or(event.event_type);
    let result = event.data.into_result().map_err(|e| match e {
        GatewayError::Protocol { message } => GatewayError::malformed_payload(message),
        other => other,
    })?;

    Ok(WebhookNotification {
        event_id,
        event_type,
        result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // ════════════════════════════════════════════════════════════════════════════
    // Signature Header Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn parses_valid_signature_header() {
        let header = SignatureHeader::parse("ts=1700000000,v1=deadbeef").unwrap();
        assert_eq!(header.timestamp, 1_700_000_000);
        assert_eq!(header.v1_signature, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn ignores_unknown_segments() {
        let header = SignatureHeader::parse("ts=1700000000,v1=00ff,v0=aabb").unwrap();
        assert_eq!(header.v1_signature, vec![0x00, 0xff]);
    }

    #[test]
    fn rejects_empty_header() {
        let result = SignatureHeader::parse("  ");
        assert!(matches!(result, Err(SignatureParseError::Empty)));
    }

    #[test]
    fn rejects_missing_timestamp() {
        let result = SignatureHeader::parse("v1=deadbeef");
        assert!(matches!(result, Err(SignatureParseError::MissingTimestamp)));
    }

    #[test]
    fn rejects_missing_signature() {
        let result = SignatureHeader::parse("ts=1700000000");
        assert!(matches!(result, Err(SignatureParseError::MissingSignature)));
    }

    #[test]
    fn rejects_non_numeric_timestamp() {
        let result = SignatureHeader::parse("ts=soon,v1=deadbeef");
        assert!(matches!(result, Err(SignatureParseError::InvalidTimestamp)));
    }

    #[test]
    fn rejects_invalid_hex() {
        let result = SignatureHeader::parse("ts=1700000000,v1=zz");
        assert!(matches!(result, Err(SignatureParseError::InvalidHex)));
    }

    #[test]
    fn rejects_segment_without_equals() {
        let result = SignatureHeader::parse("ts=1700000000;v1=deadbeef");
        assert!(matches!(result, Err(SignatureParseError::MalformedSegment)));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Signature Verification Tests
    // ════════════════════════════════════════════════════════════════════════════

    const SECRET: &str = "whk-secret";

    fn signed_header(secret: &str, ts: i64, payload: &[u8]) -> SignatureHeader {
        SignatureHeader::parse(&signature_header_value(secret, ts, payload)).unwrap()
    }

    #[test]
    fn accepts_fresh_valid_signature() {
        let payload = br#"{"id":"evt-1"}"#;
        let header = signed_header(SECRET, 1_700_000_000, payload);

        let result = verify_signed_payload(SECRET, payload, &header, 1_700_000_100);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = br#"{"id":"evt-1"}"#;
        let header = signed_header("other-secret", 1_700_000_000, payload);

        let result = verify_signed_payload(SECRET, payload, &header, 1_700_000_100);
        assert_eq!(result, Err(GatewayError::InvalidSignature));
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = br#"{"id":"evt-1"}"#;
        let header = signed_header(SECRET, 1_700_000_000, payload);

        let result = verify_signed_payload(SECRET, br#"{"id":"evt-2"}"#, &header, 1_700_000_100);
        assert_eq!(result, Err(GatewayError::InvalidSignature));
    }

    #[test]
    fn rejects_signature_older_than_window() {
        let payload = b"{}";
        let header = signed_header(SECRET, 1_700_000_000, payload);

        let result = verify_signed_payload(SECRET, payload, &header, 1_700_000_000 + 301);
        assert_eq!(result, Err(GatewayError::InvalidSignature));
    }

    #[test]
    fn rejects_signature_from_the_future() {
        let payload = b"{}";
        let header = signed_header(SECRET, 1_700_000_000 + 120, payload);

        let result = verify_signed_payload(SECRET, payload, &header, 1_700_000_000);
        assert_eq!(result, Err(GatewayError::InvalidSignature));
    }

    #[test]
    fn tolerates_small_clock_skew() {
        let payload = b"{}";
        let header = signed_header(SECRET, 1_700_000_000 + 30, payload);

        let result = verify_signed_payload(SECRET, payload, &header, 1_700_000_000);
        assert!(result.is_ok());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Payment Mapping Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn approved_payment_maps_to_result() {
        let json = r#"{
            "id": 118205914000,
            "status": "approved",
            "status_detail": "accredited",
            "transaction_amount": 99.9,
            "currency_id": "BRL",
            "payment_method_id": "pix",
            "date_created": "2024-01-15T11:59:00Z",
            "date_approved": "2024-01-15T12:00:00Z",
            "external_reference": "sub-1:2024-01",
            "payer": {"email": "financeiro@prefeitura.sp.gov.br"},
            "metadata": {"tenant_id": "t-1"}
        }"#;

        let payment: MpPayment = serde_json::from_str(json).unwrap();
        let result = payment.into_result().unwrap();

        assert_eq!(result.external_id, "118205914000");
        assert_eq!(result.status, PaymentStatus::Approved);
        assert_eq!(result.amount, Money::brl(9990));
        assert_eq!(result.method, PaymentMethod::Pix);
        assert!(result.approved_at.is_some());
        assert_eq!(
            result.payer_email.as_deref(),
            Some("financeiro@prefeitura.sp.gov.br")
        );
        assert_eq!(result.metadata.get("tenant_id"), Some(&"t-1".to_string()));
    }

    #[test]
    fn card_brand_maps_to_credit_card() {
        let json = r#"{
            "id": "mp-77",
            "status": "approved",
            "transaction_amount": 199.0,
            "currency_id": "BRL",
            "payment_method_id": "visa",
            "date_created": "2024-01-15T12:00:00Z",
            "date_approved": "2024-01-15T12:00:01Z"
        }"#;

        let payment: MpPayment = serde_json::from_str(json).unwrap();
        let result = payment.into_result().unwrap();
        assert_eq!(result.method, PaymentMethod::CreditCard);
    }

    #[test]
    fn refunded_payment_drops_approval_timestamp() {
        let json = r#"{
            "id": "mp-43",
            "status": "refunded",
            "transaction_amount": 99.9,
            "currency_id": "BRL",
            "payment_method_id": "master",
            "date_created": "2024-01-15T12:00:00Z",
            "date_approved": "2024-01-15T12:00:05Z"
        }"#;

        let payment: MpPayment = serde_json::from_str(json).unwrap();
        let result = payment.into_result().unwrap();

        assert_eq!(result.status, PaymentStatus::Refunded);
        assert!(result.approved_at.is_none());
    }

    #[test]
    fn charged_back_maps_to_refunded() {
        let json = r#"{
            "id": "mp-9",
            "status": "charged_back",
            "transaction_amount": 49.9,
            "currency_id": "BRL",
            "payment_method_id": "visa",
            "date_created": "2024-01-15T12:00:00Z"
        }"#;

        let payment: MpPayment = serde_json::from_str(json).unwrap();
        assert_eq!(payment.into_result().unwrap().status, PaymentStatus::Refunded);
    }

    #[test]
    fn rejected_payment_carries_decline_detail() {
        let json = r#"{
            "id": "mp-5",
            "status": "rejected",
            "status_detail": "cc_rejected_insufficient_amount",
            "transaction_amount": 99.9,
            "currency_id": "BRL",
            "payment_method_id": "visa",
            "date_created": "2024-01-15T12:00:00Z"
        }"#;

        let payment: MpPayment = serde_json::from_str(json).unwrap();
        let result = payment.into_result().unwrap();

        assert_eq!(result.status, PaymentStatus::Rejected);
        assert_eq!(
            result.error_message.as_deref(),
            Some("cc_rejected_insufficient_amount")
        );
    }

    #[test]
    fn approved_without_date_approved_falls_back_to_created() {
        let json = r#"{
            "id": "mp-6",
            "status": "approved",
            "transaction_amount": 10.0,
            "currency_id": "BRL",
            "payment_method_id": "pix",
            "date_created": "2024-01-15T12:00:00Z"
        }"#;

        let payment: MpPayment = serde_json::from_str(json).unwrap();
        let result = payment.into_result().unwrap();
        assert_eq!(result.approved_at, Some(result.created_at));
    }

    #[test]
    fn unknown_status_is_a_protocol_error() {
        let json = r#"{
            "id": "mp-7",
            "status": "in_arbitration",
            "transaction_amount": 10.0,
            "currency_id": "BRL",
            "payment_method_id": "pix",
            "date_created": "2024-01-15T12:00:00Z"
        }"#;

        let payment: MpPayment = serde_json::from_str(json).unwrap();
        let result = payment.into_result();
        assert!(matches!(result, Err(GatewayError::Protocol { .. })));
    }

    #[test]
    fn unknown_currency_is_a_protocol_error() {
        let json = r#"{
            "id": "mp-8",
            "status": "pending",
            "transaction_amount": 10.0,
            "currency_id": "ARS",
            "payment_method_id": "pix",
            "date_created": "2024-01-15T12:00:00Z"
        }"#;

        let payment: MpPayment = serde_json::from_str(json).unwrap();
        assert!(payment.into_result().is_err());
    }

    #[test]
    fn result_round_trips_through_wire_shape() {
        let original = PaymentResult::approved(
            "mp-fake-1",
            Money::brl(9990),
            PaymentMethod::CreditCard,
            Timestamp::from_unix_secs(1_705_320_000),
        )
        .with_payer_email("payer@example.com");

        let wire = MpPayment::from_result(&original);
        // Our own wire emission uses the generic method name, which maps back.
        let parsed = wire.into_result().unwrap();

        assert_eq!(parsed.external_id, original.external_id);
        assert_eq!(parsed.status, original.status);
        assert_eq!(parsed.amount, original.amount);
        assert_eq!(parsed.method, original.method);
        assert_eq!(parsed.payer_email, original.payer_email);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Charge Request Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn charge_request_serializes_provider_fields() {
        let request = PaymentRequest::builder(Money::brl(9990), PaymentMethod::CreditCard)
            .description("Plano Profissional - Licitago")
            .payer_email("financeiro@prefeitura.sp.gov.br")
            .payer_tax_id("12.345.678/0001-95")
            .card_token("tok_abc123")
            .installments(3)
            .external_reference("sub-1:2024-01")
            .build()
            .unwrap();

        let wire = MpPaymentRequest::from(&request);
        let json = serde_json::to_value(&wire).unwrap();

        assert_eq!(json["transaction_amount"], serde_json::json!(99.9));
        assert_eq!(json["payment_method_id"], "credit_card");
        assert_eq!(json["token"], "tok_abc123");
        assert_eq!(json["installments"], 3);
        assert_eq!(json["external_reference"], "sub-1:2024-01");
        assert_eq!(json["payer"]["email"], "financeiro@prefeitura.sp.gov.br");
        assert_eq!(json["payer"]["identification"]["type"], "CNPJ");
    }

    #[test]
    fn eleven_digit_tax_id_is_sent_as_cpf() {
        let request = PaymentRequest::builder(Money::brl(4990), PaymentMethod::Pix)
            .description("Plano Essencial")
            .payer_email("a@b.com")
            .payer_tax_id("123.456.789-09")
            .external_reference("sub-2:2024-02")
            .build()
            .unwrap();

        let wire = MpPaymentRequest::from(&request);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["payer"]["identification"]["type"], "CPF");
        assert!(json.get("token").is_none());
    }

    #[test]
    fn sub_cent_amounts_are_rejected_on_parse() {
        let result = Money::from_decimal(dec!(99.999), Currency::Brl);
        assert!(result.is_err());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Envelope Tests
    // ════════════════════════════════════════════════════════════════════════════

    fn webhook_json(status: &str) -> String {
        format!(
            r#"{{
                "id": 5561001,
                "type": "payment",
                "action": "payment.updated",
                "live_mode": true,
                "data": {{
                    "id": "mp-314",
                    "status": "{}",
                    "transaction_amount": 99.9,
                    "currency_id": "BRL",
                    "payment_method_id": "pix",
                    "date_created": "2024-01-15T12:00:00Z"
                }}
            }}"#,
            status
        )
    }

    #[test]
    fn parses_webhook_into_notification() {
        let notification = parse_webhook_payload(webhook_json("pending").as_bytes()).unwrap();

        assert_eq!(notification.event_id, "5561001");
        assert_eq!(notification.event_type, "payment.updated");
        assert_eq!(notification.result.external_id, "mp-314");
        assert_eq!(notification.result.status, PaymentStatus::Pending);
    }

    #[test]
    fn falls_back_to_type_when_action_is_absent() {
        let json = r#"{
            "id": "evt-2",
            "type": "payment",
            "data": {
                "id": "mp-1",
                "status": "pending",
                "transaction_amount": 10.0,
                "currency_id": "BRL",
                "payment_method_id": "boleto",
                "date_created": "2024-01-15T12:00:00Z"
            }
        }"#;

        let notification = parse_webhook_payload(json.as_bytes()).unwrap();
        assert_eq!(notification.event_type, "payment");
    }

    #[test]
    fn invalid_json_is_malformed() {
        let result = parse_webhook_payload(b"not json at all");
        assert!(matches!(result, Err(GatewayError::MalformedPayload { .. })));
    }

    #[test]
    fn missing_charge_object_is_malformed() {
        let result = parse_webhook_payload(br#"{"id": "evt-1", "type": "payment"}"#);
        assert!(matches!(result, Err(GatewayError::MalformedPayload { .. })));
    }

    #[test]
    fn unknown_status_inside_webhook_is_malformed_not_protocol() {
        let result = parse_webhook_payload(webhook_json("simulated").as_bytes());
        assert!(matches!(result, Err(GatewayError::MalformedPayload { .. })));
    }
}
