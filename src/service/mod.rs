use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::media::{
    validate_transition, Media, MediaError, MediaStatus, MediaStatusChanged, MediaType,
};
use crate::storage::postgres::{MediaRepo, OutboxRepo};

// ============================================================================
// Media Service - Transactional Write Path
// ============================================================================
//
// Every status change commits the aggregate update and its outbox event in
// one Postgres transaction. There is no code path that mutates status
// without recording the event, and no path that records an event without
// the mutation.
//
// ============================================================================

pub struct MediaService {
    pool: PgPool,
    media: MediaRepo,
    outbox: OutboxRepo,
}

impl MediaService {
    pub fn new(pool: PgPool) -> Self {
        let media = MediaRepo::new(pool.clone());
        let outbox = OutboxRepo::new(pool.clone());
        Self {
            pool,
            media,
            outbox,
        }
    }

    pub async fn get_media(&self, id: Uuid) -> Result<Media, MediaError> {
        if id.is_nil() {
            return Err(MediaError::InvalidArgument("media id is required".into()));
        }
        self.media.get_by_id(id).await
    }

    /// New media always starts in the uploaded state.
    pub async fn create_media(
        &self,
        media_type: MediaType,
        source: &str,
    ) -> Result<Media, MediaError> {
        if source.trim().is_empty() {
            return Err(MediaError::InvalidArgument("source is required".into()));
        }

        let now = Utc::now();
        let media = Media {
            id: Uuid::new_v4(),
            status: MediaStatus::Uploaded,
            media_type,
            source: source.to_string(),
            created_at: now,
            updated_at: now,
        };

        self.media.create(&media).await?;
        tracing::info!(media_id = %media.id, media_type = %media.media_type, "media created");
        Ok(media)
    }

    /// Validated status transition plus outbox event, committed atomically.
    /// A same-state request is an idempotent no-op: no row update, no event.
    pub async fn change_status(
        &self,
        id: Uuid,
        to: MediaStatus,
    ) -> Result<Media, MediaError> {
        if id.is_nil() {
            return Err(MediaError::InvalidArgument("media id is required".into()));
        }

        let current = self.media.get_by_id(id).await?;
        validate_transition(current.status, to)?;

        if current.status == to {
            tracing::debug!(media_id = %id, status = %to, "status unchanged, skipping");
            return Ok(current);
        }

        let mut tx = self.pool.begin().await?;

        let updated = self.media.update_status_tx(&mut tx, id, to).await?;
        let event = MediaStatusChanged::new(id, current.status, to);
        self.outbox.add(&mut tx, &event).await?;

        tx.commit().await?;

        tracing::info!(
            media_id = %id,
            from = %current.status,
            to = %to,
            event_id = %event.event_id,
            "media status changed"
        );
        Ok(updated)
    }
}

// ============================================================================
// Integration Tests (require a running Postgres)
// ============================================================================
