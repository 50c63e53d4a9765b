//! Event infrastructure for post-commit side-effect dispatch.
//!
//! Reconciliation produces side-effect intents (activation email, suspension
//! notice) as domain events. They are wrapped in an `EventEnvelope` and handed
//! to the publisher port strictly after the owning transaction commits.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

use super::Timestamp;

/// Trait that all domain events must implement.
///
/// Provides the contract for event identification, routing, and ordering.
/// Types that also implement `Serialize` get `to_envelope()` for free via
/// the `SerializableDomainEvent` extension trait.
pub trait DomainEvent: Send + Sync {
    /// Returns the event type string (e.g. "subscription.activated").
    fn event_type(&self) -> &'static str;

    /// Returns the ID of the aggregate that emitted this event.
    fn aggregate_id(&self) -> String;

    /// Returns the type of aggregate (e.g. "Subscription").
    fn aggregate_type(&self) -> &'static str;

    /// Returns when the event occurred.
    fn occurred_at(&self) -> Timestamp;

    /// Returns the unique ID for this event instance.
    fn event_id(&self) -> EventId;
}

/// Extension trait that provides `to_envelope()` for serializable events.
pub trait SerializableDomainEvent: DomainEvent + Serialize {
    /// Converts this domain event into an `EventEnvelope` for transport.
    fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id(),
            event_type: self.event_type().to_string(),
            aggregate_id: self.aggregate_id(),
            aggregate_type: self.aggregate_type().to_string(),
            occurred_at: self.occurred_at(),
            payload: serde_json::to_value(self)
                .expect("Event serialization should never fail for well-formed events"),
        }
    }
}

impl<T: DomainEvent + Serialize> SerializableDomainEvent for T {}

/// Unique identifier for events (used for deduplication).
///
/// Uses a String internally so provider-supplied event ids can be carried
/// alongside locally generated UUIDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a new random EventId using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates an EventId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport envelope for domain events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique ID for this event instance.
    pub event_id: EventId,

    /// Event type for routing (e.g. "subscription.activated").
    pub event_type: String,

    /// ID of the aggregate that emitted this event.
    pub aggregate_id: String,

    /// Type of aggregate (e.g. "Subscription").
    pub aggregate_type: String,

    /// When the event occurred.
    pub occurred_at: Timestamp,

    /// Event-specific payload as JSON.
    pub payload: JsonValue,
}

impl EventEnvelope {
    /// Creates a new EventEnvelope with required fields.
    pub fn new(
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        aggregate_type: impl Into<String>,
        payload: JsonValue,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.into(),
            aggregate_id: aggregate_id.into(),
            aggregate_type: aggregate_type.into(),
            occurred_at: Timestamp::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize)]
    struct TestActivated {
        event_id: EventId,
        subscription_id: String,
        occurred_at: Timestamp,
    }

    impl DomainEvent for TestActivated {
        fn event_type(&self) -> &'static str {
            "subscription.activated"
        }

        fn aggregate_id(&self) -> String {
            self.subscription_id.clone()
        }

        fn aggregate_type(&self) -> &'static str {
            "Subscription"
        }

        fn occurred_at(&self) -> Timestamp {
            self.occurred_at
        }

        fn event_id(&self) -> EventId {
            self.event_id.clone()
        }
    }

    #[test]
    fn event_id_is_unique() {
        assert_ne!(EventId::new(), EventId::new());
    }

    #[test]
    fn event_id_from_string_preserves_value() {
        let id = EventId::from_string("evt_123");
        assert_eq!(id.as_str(), "evt_123");
        assert_eq!(id.to_string(), "evt_123");
    }

    #[test]
    fn to_envelope_carries_event_fields() {
        let event = TestActivated {
            event_id: EventId::from_string("evt_1"),
            subscription_id: "sub-1".to_string(),
            occurred_at: Timestamp::now(),
        };

        let envelope = event.to_envelope();
        assert_eq!(envelope.event_type, "subscription.activated");
        assert_eq!(envelope.aggregate_id, "sub-1");
        assert_eq!(envelope.aggregate_type, "Subscription");
        assert_eq!(envelope.event_id, EventId::from_string("evt_1"));
        assert_eq!(envelope.payload["subscription_id"], "sub-1");
    }

    #[test]
    fn envelope_new_generates_fresh_event_id() {
        let a = EventEnvelope::new("t", "agg", "Subscription", json!({}));
        let b = EventEnvelope::new("t", "agg", "Subscription", json!({}));
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn envelope_serializes_to_json() {
        let envelope = EventEnvelope::new(
            "subscription.suspended",
            "sub-9",
            "Subscription",
            json!({"reason": "payment_rejected"}),
        );
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("subscription.suspended"));
        assert!(json.contains("payment_rejected"));
    }
}
