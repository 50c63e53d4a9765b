//! PostgreSQL implementation of WebhookEventRepository.
//!
//! Deduplication rides on the unique `event_id` column: the insert uses
//! `ON CONFLICT DO NOTHING`, so two workers racing on the same redelivered
//! event each get a definite answer without a serialization failure.

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{SaveResult, WebhookDelivery, WebhookEventRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// PostgreSQL implementation of the webhook delivery store.
pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    event_id: String,
    event_type: String,
    received_at: DateTime<Utc>,
    outcome: String,
    detail: Option<String>,
    payload: serde_json::Value,
}

impl From<WebhookEventRow> for WebhookDelivery {
    fn from(row: WebhookEventRow) -> Self {
        WebhookDelivery {
            event_id: row.event_id,
            event_type: row.event_type,
            received_at: Timestamp::from_datetime(row.received_at),
            outcome: row.outcome,
            detail: row.detail,
            payload: row.payload,
        }
    }
}

fn database_error(context: &str, err: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("{}: {}", context, err))
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookDelivery>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, received_at, outcome, detail, payload
            FROM webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("failed to find webhook delivery", e))?;

        Ok(row.map(WebhookDelivery::from))
    }

    async fn save(&self, delivery: &WebhookDelivery) -> Result<SaveResult, DomainError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                event_id, event_type, received_at, outcome, detail, payload
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&delivery.event_id)
        .bind(&delivery.event_type)
        .bind(delivery.received_at.as_datetime())
        .bind(&delivery.outcome)
        .bind(&delivery.detail)
        .bind(&delivery.payload)
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("failed to record webhook delivery", e))?;

        if result.rows_affected() == 0 {
            Ok(SaveResult::AlreadyExists)
        } else {
            Ok(SaveResult::Inserted)
        }
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE received_at < $1")
            .bind(cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(|e| database_error("failed to prune webhook deliveries", e))?;

        Ok(result.rows_affected())
    }
}
