//! In-memory implementation of SubscriptionRepository.
//!
//! Honors the same optimistic-concurrency contract as the PostgreSQL
//! adapter so integration tests exercise real conflict handling: `update`
//! compares versions and bumps the stored one.

use std::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, TenantId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;
use async_trait::async_trait;

/// In-memory subscription store for tests and local development.
///
/// # Panics
///
/// Methods panic if the internal lock is poisoned; acceptable for test
/// code, do not use in production.
pub struct InMemorySubscriptionRepository {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    /// All stored rows, for test assertions.
    pub fn all(&self) -> Vec<Subscription> {
        self.subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: lock poisoned")
            .clone()
    }
}

impl Default for InMemorySubscriptionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subscriptions = self
            .subscriptions
            .write()
            .expect("InMemorySubscriptionRepository: lock poisoned");
        if subscriptions.iter().any(|s| s.id == subscription.id) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("subscription {} already exists", subscription.id),
            ));
        }
        subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut subscriptions = self
            .subscriptions
            .write()
            .expect("InMemorySubscriptionRepository: lock poisoned");
        let stored = subscriptions
            .iter_mut()
            .find(|s| s.id == subscription.id)
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("subscription {} not found", subscription.id),
                )
            })?;

        if stored.version != subscription.version {
            return Err(DomainError::new(
                ErrorCode::ConcurrencyConflict,
                format!(
                    "subscription {} moved from version {} to {}",
                    subscription.id, subscription.version, stored.version
                ),
            ));
        }

        *stored = subscription.clone();
        stored.version += 1;
        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: lock poisoned")
            .iter()
            .find(|s| &s.id == id)
            .cloned())
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: lock poisoned")
            .iter()
            .find(|s| s.external_transaction_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn find_latest_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: lock poisoned")
            .iter()
            .filter(|s| &s.tenant_id == tenant_id)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn list_expiring_before(
        &self,
        cutoff: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        Ok(self
            .subscriptions
            .read()
            .expect("InMemorySubscriptionRepository: lock poisoned")
            .iter()
            .filter(|s| s.status == SubscriptionStatus::Active)
            .filter(|s| {
                s.current_period_end
                    .map(|end| cutoff.is_after(&end.add_days(i64::from(s.grace_period_days))))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Currency, Money, PlanId};
    use crate::domain::payment::PaymentMethod;
    use crate::domain::subscription::BillingCycle;

    fn subscription() -> Subscription {
        Subscription::create_pending(
            SubscriptionId::new(),
            TenantId::new(),
            PlanId::new(),
            BillingCycle::Monthly,
            Money::brl(9990),
            PaymentMethod::CreditCard,
            7,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn update_with_stale_version_conflicts() {
        let repo = InMemorySubscriptionRepository::new();
        let original = subscription();
        repo.save(&original).await.unwrap();

        // First writer wins and bumps the stored version.
        let activated = original.activated("mp-1", Timestamp::now()).unwrap();
        repo.update(&activated).await.unwrap();

        // Second writer still holds the original version.
        let tracked = original.tracking_payment(
            "mp-2",
            crate::domain::payment::PaymentStatus::Pending,
            Timestamp::now(),
        );
        let err = repo.update(&tracked).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConcurrencyConflict);
    }

    #[tokio::test]
    async fn reload_after_conflict_succeeds() {
        let repo = InMemorySubscriptionRepository::new();
        let original = subscription();
        repo.save(&original).await.unwrap();
        let activated = original.activated("mp-1", Timestamp::now()).unwrap();
        repo.update(&activated).await.unwrap();

        let reloaded = repo.find_by_id(&original.id).await.unwrap().unwrap();
        assert_eq!(reloaded.version, original.version + 1);
        let cancelled = reloaded.cancelled(Timestamp::now()).unwrap();
        repo.update(&cancelled).await.unwrap();
        assert_eq!(repo.all()[0].version, original.version + 2);
    }

    #[tokio::test]
    async fn duplicate_save_is_rejected() {
        let repo = InMemorySubscriptionRepository::new();
        let original = subscription();
        repo.save(&original).await.unwrap();
        assert!(repo.save(&original).await.is_err());
    }

    #[tokio::test]
    async fn expiring_query_skips_free_and_current_rows() {
        let repo = InMemorySubscriptionRepository::new();

        let mut lapsed = subscription().activated("mp-1", Timestamp::now()).unwrap();
        lapsed.current_period_end = Some(Timestamp::now().minus_days(40));
        repo.save(&lapsed).await.unwrap();

        let current = subscription().activated("mp-2", Timestamp::now()).unwrap();
        repo.save(&current).await.unwrap();

        let free = Subscription::create_free(
            SubscriptionId::new(),
            TenantId::new(),
            PlanId::new(),
            BillingCycle::Monthly,
            Currency::Brl,
        );
        repo.save(&free).await.unwrap();

        let expiring = repo.list_expiring_before(Timestamp::now()).await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, lapsed.id);
    }
}
