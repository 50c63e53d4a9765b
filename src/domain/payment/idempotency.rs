//! Deterministic idempotency keys for charge attempts.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::foundation::{SubscriptionId, Timestamp};

/// Idempotency key sent with every charge.
///
/// The key is a pure function of (subscription id, billing period start), so
/// retrying the same logical charge after a transport failure reuses the key
/// and the provider deduplicates instead of charging twice. A new billing
/// period (renewal) or a new subscription row (plan change) yields a new key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derives the key for a subscription's billing-period charge.
    pub fn for_billing_period(subscription_id: &SubscriptionId, period_start: &Timestamp) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(subscription_id.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(period_start.as_unix_secs().to_be_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an externally supplied key (manual reconciliation tooling).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
