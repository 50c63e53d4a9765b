//! In-memory implementation of WebhookEventRepository.

use std::sync::RwLock;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::{SaveResult, WebhookDelivery, WebhookEventRepository};
use async_trait::async_trait;

/// In-memory webhook delivery store for tests and local development.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned; acceptable for test
/// code, do not use in production.
pub struct InMemoryWebhookEventRepository {
    deliveries: RwLock<Vec<WebhookDelivery>>,
}

impl InMemoryWebhookEventRepository {
    pub fn new() -> Self {
        Self {
            deliveries: RwLock::new(Vec::new()),
        }
    }

    /// All recorded deliveries, for test assertions.
    pub fn all(&self) -> Vec<WebhookDelivery> {
        self.deliveries
            .read()
            .expect("InMemoryWebhookEventRepository: lock poisoned")
            .clone()
    }
}

impl Default for InMemoryWebhookEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookDelivery>, DomainError> {
        Ok(self
            .deliveries
            .read()
            .expect("InMemoryWebhookEventRepository: lock poisoned")
            .iter()
            .find(|d| d.event_id == event_id)
            .cloned())
    }

    async fn save(&self, delivery: &WebhookDelivery) -> Result<SaveResult, DomainError> {
        let mut deliveries = self
            .deliveries
            .write()
            .expect("InMemoryWebhookEventRepository: lock poisoned");
        if deliveries.iter().any(|d| d.event_id == delivery.event_id) {
            return Ok(SaveResult::AlreadyExists);
        }
        deliveries.push(delivery.clone());
        Ok(SaveResult::Inserted)
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut deliveries = self
            .deliveries
            .write()
            .expect("InMemoryWebhookEventRepository: lock poisoned");
        let before = deliveries.len();
        deliveries.retain(|d| !cutoff.is_after(&d.received_at));
        Ok((before - deliveries.len()) as u64)
    }
}
