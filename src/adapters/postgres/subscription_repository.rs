//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Optimistic concurrency: `update` matches on `(id, version)` and bumps the
//! stored version; zero affected rows means another writer moved the row (or
//! it never existed), and the two cases are told apart with a follow-up
//! existence probe so callers can reload-and-retry only on real conflicts.

use std::str::FromStr;

use crate::domain::foundation::{
    Currency, DomainError, ErrorCode, Money, PlanId, SubscriptionId, TenantId, Timestamp,
};
use crate::domain::payment::{PaymentMethod, PaymentStatus};
use crate::domain::subscription::{BillingCycle, Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the SubscriptionRepository port.
pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    id, tenant_id, plan_id, status, cycle,
    current_period_start, current_period_end,
    amount_minor, currency, payment_method,
    external_transaction_id, last_payment_status,
    grace_period_days, notes, created_at, updated_at, cancelled_at, version
"#;

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    tenant_id: Uuid,
    plan_id: Uuid,
    status: String,
    cycle: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    amount_minor: i64,
    currency: String,
    payment_method: String,
    external_transaction_id: Option<String>,
    last_payment_status: Option<String>,
    grace_period_days: i16,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
    version: i32,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let currency = Currency::from_str(&row.currency)
            .map_err(|e| stored_value_error("currency", e.to_string()))?;
        let status = SubscriptionStatus::from_str(&row.status)
            .map_err(|e| stored_value_error("status", e.to_string()))?;
        let cycle = BillingCycle::from_str(&row.cycle)
            .map_err(|e| stored_value_error("cycle", e.to_string()))?;
        let payment_method = PaymentMethod::from_str(&row.payment_method)
            .map_err(|e| stored_value_error("payment_method", e.to_string()))?;
        let last_payment_status = row
            .last_payment_status
            .as_deref()
            .map(PaymentStatus::from_str)
            .transpose()
            .map_err(|e| stored_value_error("last_payment_status", e.to_string()))?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            tenant_id: TenantId::from_uuid(row.tenant_id),
            plan_id: PlanId::from_uuid(row.plan_id),
            status,
            cycle,
            current_period_start: row.current_period_start.map(Timestamp::from_datetime),
            current_period_end: row.current_period_end.map(Timestamp::from_datetime),
            amount: Money::from_minor_units(row.amount_minor, currency),
            payment_method,
            external_transaction_id: row.external_transaction_id,
            last_payment_status,
            grace_period_days: row.grace_period_days as u16,
            notes: row.notes,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
            cancelled_at: row.cancelled_at.map(Timestamp::from_datetime),
            version: row.version,
        })
    }
}

fn stored_value_error(column: &str, detail: String) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("stored {} is not readable: {}", column, detail),
    )
}

fn database_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, tenant_id, plan_id, status, cycle,
                current_period_start, current_period_end,
                amount_minor, currency, payment_method,
                external_transaction_id, last_payment_status,
                grace_period_days, notes, created_at, updated_at, cancelled_at, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18
            )
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.tenant_id.as_uuid())
        .bind(subscription.plan_id.as_uuid())
        .bind(subscription.status.as_str())
        .bind(subscription.cycle.as_str())
        .bind(subscription.current_period_start.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.current_period_end.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.amount.amount())
        .bind(subscription.amount.currency().as_str())
        .bind(subscription.payment_method.as_str())
        .bind(&subscription.external_transaction_id)
        .bind(subscription.last_payment_status.map(|s| s.as_str()))
        .bind(subscription.grace_period_days as i16)
        .bind(&subscription.notes)
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.cancelled_at.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.version)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("failed to insert subscription", e))?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                status = $3,
                cycle = $4,
                current_period_start = $5,
                current_period_end = $6,
                amount_minor = $7,
                currency = $8,
                payment_method = $9,
                external_transaction_id = $10,
                last_payment_status = $11,
                notes = $12,
                updated_at = $13,
                cancelled_at = $14,
                version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.version)
        .bind(subscription.status.as_str())
        .bind(subscription.cycle.as_str())
        .bind(subscription.current_period_start.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.current_period_end.as_ref().map(Timestamp::as_datetime))
        .bind(subscription.amount.amount())
        .bind(subscription.amount.currency().as_str())
        .bind(subscription.payment_method.as_str())
        .bind(&subscription.external_transaction_id)
        .bind(subscription.last_payment_status.map(|s| s.as_str()))
        .bind(&subscription.notes)
        .bind(subscription.updated_at.as_datetime())
        .bind(subscription.cancelled_at.as_ref().map(Timestamp::as_datetime))
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("failed to update subscription", e))?;

        if result.rows_affected() == 0 {
            let exists: Option<(i32,)> =
                sqlx::query_as("SELECT version FROM subscriptions WHERE id = $1")
                    .bind(subscription.id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| database_error("failed to probe subscription", e))?;

            return match exists {
                Some((stored_version,)) => Err(DomainError::new(
                    ErrorCode::ConcurrencyConflict,
                    format!(
                        "subscription {} moved from version {} to {}",
                        subscription.id, subscription.version, stored_version
                    ),
                )),
                None => Err(DomainError::new(
                    ErrorCode::SubscriptionNotFound,
                    format!("subscription {} not found", subscription.id),
                )),
            };
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("failed to find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE external_transaction_id = $1",
            SELECT_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("failed to find subscription by charge", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_latest_for_tenant(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        ))
        .bind(tenant_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("failed to find tenant subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn list_expiring_before(
        &self,
        cutoff: Timestamp,
    ) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE status = 'ativa'
              AND current_period_end IS NOT NULL
              AND current_period_end + make_interval(days => grace_period_days::int) < $1
            ORDER BY current_period_end ASC
            "#,
            SELECT_COLUMNS
        ))
        .bind(cutoff.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| database_error("failed to list expiring subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }
}
