use super::models::MediaStatus;

// ============================================================================
// Media Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media not found")]
    NotFound,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("conflict")]
    Conflict,

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: MediaStatus, to: MediaStatus },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}
