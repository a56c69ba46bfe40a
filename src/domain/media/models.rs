use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::MediaError;

// ============================================================================
// Media Models - Aggregate and Value Objects
// ============================================================================

/// Lifecycle status of a media asset. Persisted as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum MediaStatus {
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl MediaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Uploaded => "uploaded",
            MediaStatus::Processing => "processing",
            MediaStatus::Ready => "ready",
            MediaStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaStatus {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(MediaStatus::Uploaded),
            "processing" => Ok(MediaStatus::Processing),
            "ready" => Ok(MediaStatus::Ready),
            "failed" => Ok(MediaStatus::Failed),
            _ => Err(MediaError::InvalidArgument(format!(
                "unknown media status {s:?}"
            ))),
        }
    }
}

/// Kind of media asset. Persisted as lowercase text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    File,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::File => "file",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The media aggregate. Owned by the state store and mutated only through
/// validated status transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Media {
    pub id: Uuid,
    pub status: MediaStatus,
    pub media_type: MediaType,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&MediaStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");

        let back: MediaStatus = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(back, MediaStatus::Ready);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            MediaStatus::Uploaded,
            MediaStatus::Processing,
            MediaStatus::Ready,
            MediaStatus::Failed,
        ] {
            let parsed: MediaStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "archived".parse::<MediaStatus>().unwrap_err();
        assert!(matches!(err, MediaError::InvalidArgument(_)));
    }

    #[test]
    fn test_media_serialization() {
        let media = Media {
            id: Uuid::new_v4(),
            status: MediaStatus::Uploaded,
            media_type: MediaType::Video,
            source: "s3://bucket/file.mp4".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&media).unwrap();
        let back: Media = serde_json::from_str(&json).unwrap();
        assert_eq!(media, back);
    }
}
