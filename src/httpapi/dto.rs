use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::media::{Media, MediaStatus, MediaType};

#[derive(Debug, Deserialize)]
pub struct CreateMediaRequest {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: MediaStatus,
}

#[derive(Debug, Serialize)]
pub struct MediaResponse {
    pub id: Uuid,
    pub status: MediaStatus,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Media> for MediaResponse {
    fn from(media: Media) -> Self {
        Self {
            id: media.id,
            status: media.status,
            media_type: media.media_type,
            source: media.source,
            created_at: media.created_at,
            updated_at: media.updated_at,
        }
    }
}
