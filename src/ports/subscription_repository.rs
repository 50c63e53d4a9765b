//! Subscription repository port.
//!
//! Persistence contract for the subscription aggregate. Concurrency control
//! is optimistic: `update` compares the aggregate's version against the
//! stored row and fails with a conflict when another writer got there first.

use crate::domain::foundation::{DomainError, SubscriptionId, TenantId, Timestamp};
use crate::domain::subscription::Subscription;
use async_trait::async_trait;

/// Port for subscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Inserts a new subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if a subscription with the same id already exists
    /// or the insert fails.
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Updates an existing subscription using compare-and-swap on the
    /// version column.
    ///
    /// The implementation matches on `(id, version)` and increments the
    /// stored version on success. When zero rows match, it distinguishes a
    /// missing row (`SubscriptionNotFound`) from a version conflict
    /// (`ConcurrencyConflict`); callers reload and re-derive on conflict.
    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Finds a subscription by its id.
    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    /// Finds the subscription tracking the given provider transaction id.
    ///
    /// This is the webhook resolution path: notifications identify charges
    /// by the provider's id, never by our subscription id.
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Finds the tenant's most recent subscription, regardless of status.
    ///
    /// "Most recent" is by creation time. Access checks use this: a tenant
    /// whose latest subscription is cancelled may still be inside the paid
    /// period.
    async fn find_latest_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Lists active subscriptions whose paid period plus grace ends before
    /// the cutoff.
    ///
    /// Free subscriptions (no period end) are never returned. Feeds the
    /// expiration sweep.
    async fn list_expiring_before(
        &self,
        cutoff: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError>;
}
