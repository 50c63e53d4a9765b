//! Collecting event publisher for tests.
//!
//! Captures every envelope so integration tests can assert on side-effect
//! dispatch (which events, how many times) without a broker.

use std::sync::RwLock;

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::EventPublisher;
use async_trait::async_trait;

/// Event publisher that records everything it is handed.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned; acceptable for test
/// code, do not use in production.
pub struct CollectingEventPublisher {
    published: RwLock<Vec<EventEnvelope>>,
}

impl CollectingEventPublisher {
    pub fn new() -> Self {
        Self {
            published: RwLock::new(Vec::new()),
        }
    }

    /// All published envelopes, in publish order.
    pub fn published_events(&self) -> Vec<EventEnvelope> {
        self.published
            .read()
            .expect("CollectingEventPublisher: lock poisoned")
            .clone()
    }

    /// Envelopes of one event type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<EventEnvelope> {
        self.published_events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// True when at least one envelope of the type was published.
    pub fn has_event(&self, event_type: &str) -> bool {
        !self.events_of_type(event_type).is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .expect("CollectingEventPublisher: lock poisoned")
            .len()
    }
}

impl Default for CollectingEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for CollectingEventPublisher {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        self.published
            .write()
            .expect("CollectingEventPublisher: lock poisoned")
            .push(event);
        Ok(())
    }

    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        let mut published = self
            .published
            .write()
            .expect("CollectingEventPublisher: lock poisoned");
        published.extend(events);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_in_publish_order() {
        let publisher = CollectingEventPublisher::new();
        publisher
            .publish(EventEnvelope::new(
                "subscription.created",
                "sub-1",
                "Subscription",
                json!({}),
            ))
            .await
            .unwrap();
        publisher
            .publish(EventEnvelope::new(
                "subscription.activated",
                "sub-1",
                "Subscription",
                json!({}),
            ))
            .await
            .unwrap();

        assert_eq!(publisher.event_count(), 2);
        assert!(publisher.has_event("subscription.created"));
        assert_eq!(
            publisher.published_events()[1].event_type,
            "subscription.activated"
        );
    }
}
