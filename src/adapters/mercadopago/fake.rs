//! Scripted payment gateway fake.
//!
//! A stand-in for the provider used by contract and end-to-end tests. It
//! keeps the provider-side behaviors the engine depends on:
//!
//! - **Idempotency dedup**: a repeated key with an identical request replays
//!   the original outcome instead of creating a second charge.
//! - **Scripted outcomes**: per card token or per payment method, with
//!   defaults (cards and pix approve, boleto stays pending).
//! - **Real webhook crypto**: deliveries it emits are signed with its own
//!   secret over the same wire shape the production adapter parses, so the
//!   full verify-parse-reconcile path runs unmodified in tests.
//! - **Fault injection**: a bounded run of transport failures to exercise
//!   retry-with-same-key behavior.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::foundation::Timestamp;
use crate::domain::payment::{
    IdempotencyKey, PaymentMethod, PaymentRequest, PaymentResult, PaymentStatus,
};
use crate::ports::{GatewayError, PaymentGateway, WebhookNotification};

use super::wire::{self, MpId, MpPayment, MpWebhookEvent, SignatureHeader};

/// What the fake provider answers for a charge.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Charge settles immediately.
    Approve,
    /// Provider declines with the given reason code.
    Reject(String),
    /// Charge stays open awaiting asynchronous settlement.
    Pending,
}

struct IdempotencyRecord {
    fingerprint: String,
    external_id: String,
}

#[derive(Default)]
struct FakeState {
    charges: HashMap<String, PaymentResult>,
    idempotency: HashMap<String, IdempotencyRecord>,
    token_outcomes: HashMap<String, ScriptedOutcome>,
    method_outcomes: HashMap<PaymentMethod, ScriptedOutcome>,
    transport_failures_remaining: u32,
    charge_seq: u64,
    event_seq: u64,
}

/// Scripted provider fake implementing [`PaymentGateway`].
///
/// Cloning shares the underlying state, so a test can keep a handle for
/// scripting and assertions after handing a clone to the code under test.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned; acceptable for test
/// code, do not use in production.
pub struct FakeMercadoPago {
    inner: Arc<Mutex<FakeState>>,
    webhook_secret: String,
}

impl FakeMercadoPago {
    pub fn new() -> Self {
        Self::with_webhook_secret("fake-webhook-secret")
    }

    /// Uses a specific webhook signing secret (for mixed real/fake setups).
    pub fn with_webhook_secret(secret: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeState::default())),
            webhook_secret: secret.into(),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Scripting
    // ════════════════════════════════════════════════════════════════════════════

    /// Scripts the outcome for charges carrying this card token.
    pub fn script_token(&self, token: impl Into<String>, outcome: ScriptedOutcome) {
        self.state().token_outcomes.insert(token.into(), outcome);
    }

    /// Scripts the outcome for all charges with this payment method.
    pub fn script_method(&self, method: PaymentMethod, outcome: ScriptedOutcome) {
        self.state().method_outcomes.insert(method, outcome);
    }

    /// Makes the next `failures` charge calls fail in transit.
    pub fn fail_next_charges(&self, failures: u32) {
        self.state().transport_failures_remaining = failures;
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Inspection
    // ════════════════════════════════════════════════════════════════════════════

    /// Number of distinct charges created at the provider side.
    pub fn charge_count(&self) -> usize {
        self.state().charges.len()
    }

    /// Idempotency keys seen so far, in no particular order.
    pub fn recorded_idempotency_keys(&self) -> Vec<String> {
        self.state().idempotency.keys().cloned().collect()
    }

    /// The provider-side record for a charge, if it exists.
    pub fn stored_charge(&self, external_id: &str) -> Option<PaymentResult> {
        self.state().charges.get(external_id).cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhook Emission
    // ════════════════════════════════════════════════════════════════════════════

    /// Builds a signed webhook delivery moving one of this fake's charges to
    /// `status`, the way the provider's own record moves before it notifies.
    ///
    /// Returns `(body, x-signature header value)`, or `None` when the charge
    /// does not exist. Each call gets a fresh event id; to simulate a
    /// redelivery of the same event, post the same returned bytes twice.
    pub fn webhook_delivery(
        &self,
        external_id: &str,
        status: PaymentStatus,
    ) -> Option<(Vec<u8>, String)> {
        let mut state = self.state();
        state.event_seq += 1;
        let event_id = format!("evt-fake-{}", state.event_seq);

        let charge = state.charges.get_mut(external_id)?;
        charge.status = status;
        match status {
            PaymentStatus::Approved => {
                if charge.approved_at.is_none() {
                    charge.approved_at = Some(Timestamp::now());
                }
            }
            _ => charge.approved_at = None,
        }

        let event = MpWebhookEvent {
            id: MpId::Text(event_id),
            event_type: "payment".to_string(),
            action: Some("payment.updated".to_string()),
            live_mode: false,
            data: MpPayment::from_result(charge),
        };

        let body = serde_json::to_vec(&event).expect("webhook envelope serializes");
        let timestamp = Timestamp::now().as_unix_secs() as i64;
        let signature = wire::signature_header_value(&self.webhook_secret, timestamp, &body);

        Some((body, signature))
    }

    /// Signs arbitrary bytes with this fake's webhook secret.
    ///
    /// For tests that need an authenticated delivery whose body the fake
    /// would never emit itself, e.g. malformed payloads.
    pub fn sign(&self, body: &[u8]) -> String {
        let timestamp = Timestamp::now().as_unix_secs() as i64;
        wire::signature_header_value(&self.webhook_secret, timestamp, body)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().expect("FakeMercadoPago: lock poisoned")
    }
}

impl Default for FakeMercadoPago {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for FakeMercadoPago {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            webhook_secret: self.webhook_secret.clone(),
        }
    }
}

/// Request identity for provider-side dedup: same key + same fingerprint
/// replays, same key + different fingerprint charges fresh.
fn request_fingerprint(request: &PaymentRequest) -> String {
    format!(
        "{}:{}:{}:{}",
        request.amount.amount(),
        request.amount.currency(),
        request.method,
        request.external_reference
    )
}

fn scripted_outcome(state: &FakeState, request: &PaymentRequest) -> ScriptedOutcome {
    if let Some(token) = &request.card_token {
        if let Some(outcome) = state.token_outcomes.get(token) {
            return outcome.clone();
        }
    }
    if let Some(outcome) = state.method_outcomes.get(&request.method) {
        return outcome.clone();
    }
    match request.method {
        // Boleto settles asynchronously in the real world too.
        PaymentMethod::Boleto => ScriptedOutcome::Pending,
        _ => ScriptedOutcome::Approve,
    }
}

#[async_trait]
impl PaymentGateway for FakeMercadoPago {
    async fn charge(
        &self,
        request: &PaymentRequest,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PaymentResult, GatewayError> {
        let mut state = self.state();

        if state.transport_failures_remaining > 0 {
            state.transport_failures_remaining -= 1;
            return Err(GatewayError::transport("injected transport failure"));
        }

        let fingerprint = request_fingerprint(request);
        if let Some(record) = state.idempotency.get(idempotency_key.as_str()) {
            if record.fingerprint == fingerprint {
                if let Some(replay) = state.charges.get(&record.external_id).cloned() {
                    return Ok(replay);
                }
            }
        }

        let outcome = scripted_outcome(&state, request);
        state.charge_seq += 1;
        let external_id = format!("mp-fake-{}", state.charge_seq);
        let now = Timestamp::now();

        let result = match outcome {
            ScriptedOutcome::Approve => {
                PaymentResult::approved(&external_id, request.amount, request.method, now)
            }
            ScriptedOutcome::Reject(reason) => {
                PaymentResult::rejected(&external_id, request.amount, request.method, now, reason)
            }
            ScriptedOutcome::Pending => PaymentResult::new(
                &external_id,
                PaymentStatus::Pending,
                request.amount,
                request.method,
                now,
                None,
            )
            .map_err(|e| GatewayError::protocol(e.to_string()))?,
        }
        .with_payer_email(request.payer_email.clone())
        .with_metadata(request.metadata.clone());

        state.charges.insert(external_id.clone(), result.clone());
        state.idempotency.insert(
            idempotency_key.as_str().to_string(),
            IdempotencyRecord {
                fingerprint,
                external_id,
            },
        );

        Ok(result)
    }

    async fn query_status(&self, external_id: &str) -> Result<PaymentResult, GatewayError> {
        self.stored_charge(external_id).ok_or_else(|| {
            GatewayError::protocol(format!(
                "charge '{}' does not exist at the provider",
                external_id
            ))
        })
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: Timestamp,
    ) -> Result<(), GatewayError> {
        let header = SignatureHeader::parse(signature_header)
            .map_err(|_| GatewayError::invalid_signature())?;

        wire::verify_signed_payload(
            &self.webhook_secret,
            payload,
            &header,
            now.as_unix_secs() as i64,
        )
    }

    fn parse_webhook(&self, payload: &[u8]) -> Result<WebhookNotification, GatewayError> {
        wire::parse_webhook_payload(payload)
    }
}
