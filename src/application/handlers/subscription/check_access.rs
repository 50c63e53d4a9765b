//! CheckAccessHandler - Query handler for gating tenant access.
//!
//! Answers off the tenant's most recent subscription only. Older rows
//! (e.g. the cancelled predecessor of a plan change) never grant access
//! once a newer row exists, even if their paid period has not ended.

use std::sync::Arc;

use crate::domain::foundation::{TenantId, Timestamp};
use crate::domain::subscription::{SubscriptionError, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

/// Query to check whether a tenant currently has access.
#[derive(Debug, Clone)]
pub struct CheckAccessQuery {
    pub tenant_id: TenantId,
}

/// Result of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckAccessResult {
    /// Whether the tenant has access right now.
    pub allowed: bool,

    /// Status of the governing subscription. None when the tenant has none.
    pub status: Option<SubscriptionStatus>,

    /// True when the period has ended but grace is still running; callers
    /// surface a "renew now" banner off this flag.
    pub in_grace: bool,

    /// Days remaining in the current paid period, zero once it has ended.
    pub days_remaining: u32,
}

impl CheckAccessResult {
    fn denied() -> Self {
        Self {
            allowed: false,
            status: None,
            in_grace: false,
            days_remaining: 0,
        }
    }
}

/// Handler for tenant access checks.
///
/// This is the most frequently called query in the billing surface; it does
/// a single indexed read and pure in-memory time math.
pub struct CheckAccessHandler {
    repository: Arc<dyn SubscriptionRepository>,
}

impl CheckAccessHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(
        &self,
        query: CheckAccessQuery,
    ) -> Result<CheckAccessResult, SubscriptionError> {
        let now = Timestamp::now();

        let subscription = match self
            .repository
            .find_latest_for_tenant(&query.tenant_id)
            .await?
        {
            Some(subscription) => subscription,
            None => return Ok(CheckAccessResult::denied()),
        };

        Ok(CheckAccessResult {
            allowed: subscription.has_access(now),
            status: Some(subscription.status),
            in_grace: subscription.in_grace(now),
            days_remaining: subscription.days_remaining(now),
        })
    }
}
