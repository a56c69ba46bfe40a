use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::media::MediaError;
use crate::domain::DomainEvent;
use crate::outbox::OutboxStore;

use super::media_repo::map_db_error;

// ============================================================================
// Outbox Repository - Postgres
// ============================================================================
//
// Durable ordered queue of pending domain events, living in the same
// database as the media table so enqueue can share the write transaction.
//
// Rows are never deleted here; retention is an external housekeeping job.
// A single publisher instance is assumed: fetch_pending is a plain ordered
// scan (upgrade to FOR UPDATE SKIP LOCKED if multiple publishers ever run).
//
// ============================================================================

/// One row of the outbox table. `id` is the BIGSERIAL ordering key.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxRecord {
    pub id: i64,
    pub event_id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OutboxRepo {
    pool: PgPool,
}

impl OutboxRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one event against the caller's transaction handle. Never opens
    /// its own transaction: the row must commit or roll back together with
    /// the aggregate mutation that produced the event.
    pub async fn add<E>(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        event: &E,
    ) -> Result<(), MediaError>
    where
        E: DomainEvent + Serialize + Sync,
    {
        let payload = serde_json::to_value(event)?;

        sqlx::query(
            "INSERT INTO outbox (event_id, event_type, aggregate_id, payload, occurred_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.event_id())
        .bind(event.event_type())
        .bind(event.aggregate_id())
        .bind(payload)
        .bind(event.occurred_at())
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    /// Records with null processed_at, oldest first. Insertion order gives
    /// per-aggregate delivery order.
    pub async fn get_pending(&self, limit: i64) -> Result<Vec<OutboxRecord>, MediaError> {
        sqlx::query_as::<_, OutboxRecord>(
            "SELECT id, event_id, event_type, aggregate_id, payload, occurred_at
             FROM outbox
             WHERE processed_at IS NULL
             ORDER BY id ASC
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)
    }

    /// Stamp a record as delivered. The processed_at guard makes a second
    /// call a zero-row no-op, so the first delivery timestamp wins.
    pub async fn set_processed(&self, id: i64) -> Result<(), MediaError> {
        sqlx::query(
            "UPDATE outbox
             SET processed_at = NOW()
             WHERE id = $1 AND processed_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }
}

#[async_trait]
impl OutboxStore for OutboxRepo {
    async fn fetch_pending(&self, limit: i64) -> anyhow::Result<Vec<OutboxRecord>> {
        Ok(self.get_pending(limit).await?)
    }

    async fn mark_processed(&self, id: i64) -> anyhow::Result<()> {
        Ok(self.set_processed(id).await?)
    }
}

// ============================================================================
// Integration Tests (require a running Postgres, gated on DATABASE_URL)
// ============================================================================
