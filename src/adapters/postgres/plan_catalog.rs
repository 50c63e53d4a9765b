//! PostgreSQL read adapter for the plan catalog.
//!
//! The `plans` table is owned by the back office; this adapter only reads.
//! A NULL `tenant_id` on a row means the plan is offered to everyone, a
//! non-NULL one marks a tenant-negotiated offering.

use std::str::FromStr;

use crate::domain::foundation::{
    Currency, DomainError, ErrorCode, Money, PlanId, TenantId,
};
use crate::ports::{PlanCatalog, PlanSnapshot};
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// PostgreSQL implementation of the PlanCatalog port.
pub struct PostgresPlanCatalog {
    pool: PgPool,
}

impl PostgresPlanCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    name: String,
    price_monthly_minor: i64,
    price_annual_minor: i64,
    currency: String,
    feature_limits: serde_json::Value,
}

impl TryFrom<PlanRow> for PlanSnapshot {
    type Error = DomainError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let currency = Currency::from_str(&row.currency).map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("stored plan currency is not readable: {}", e),
            )
        })?;

        Ok(PlanSnapshot {
            plan_id: PlanId::from_uuid(row.id),
            name: row.name,
            price_monthly: Money::from_minor_units(row.price_monthly_minor, currency),
            price_annual: Money::from_minor_units(row.price_annual_minor, currency),
            feature_limits: row.feature_limits,
        })
    }
}

#[async_trait]
impl PlanCatalog for PostgresPlanCatalog {
    async fn plan_for_tenant(
        &self,
        tenant_id: &TenantId,
        plan_id: &PlanId,
    ) -> Result<Option<PlanSnapshot>, DomainError> {
        let row: Option<PlanRow> = sqlx::query_as(
            r#"
            SELECT id, name, price_monthly_minor, price_annual_minor, currency, feature_limits
            FROM plans
            WHERE id = $2
              AND (tenant_id IS NULL OR tenant_id = $1)
              AND active
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(plan_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("failed to read plan: {}", e),
            )
        })?;

        row.map(PlanSnapshot::try_from).transpose()
    }
}
