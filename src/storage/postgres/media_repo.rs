use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::media::{Media, MediaError, MediaStatus};

// ============================================================================
// Media Repository - Postgres
// ============================================================================

#[derive(Clone)]
pub struct MediaRepo {
    pool: PgPool,
}

impl MediaRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, media: &Media) -> Result<(), MediaError> {
        sqlx::query(
            "INSERT INTO media (id, status, media_type, source, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(media.id)
        .bind(media.status)
        .bind(media.media_type)
        .bind(&media.source)
        .bind(media.created_at)
        .bind(media.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Media, MediaError> {
        sqlx::query_as::<_, Media>(
            "SELECT id, status, media_type, source, created_at, updated_at
             FROM media
             WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)
    }

    /// Update the status inside the caller's transaction. Never opens its own
    /// transaction; the outbox insert must land in the same one.
    pub async fn update_status_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        status: MediaStatus,
    ) -> Result<Media, MediaError> {
        sqlx::query_as::<_, Media>(
            "UPDATE media
             SET status = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING id, status, media_type, source, created_at, updated_at",
        )
        .bind(id)
        .bind(status)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_db_error)
    }
}

pub(super) fn map_db_error(err: sqlx::Error) -> MediaError {
    match err {
        sqlx::Error::RowNotFound => MediaError::NotFound,
        sqlx::Error::Database(ref db)
            if db.kind() == sqlx::error::ErrorKind::UniqueViolation =>
        {
            MediaError::Conflict
        }
        other => MediaError::Storage(other),
    }
}

// ============================================================================
// Integration Tests (require a running Postgres, gated on DATABASE_URL)
// ============================================================================
