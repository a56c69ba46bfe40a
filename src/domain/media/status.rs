use super::errors::MediaError;
use super::models::MediaStatus;

// ============================================================================
// Media Status State Machine
// ============================================================================
//
// The only legal transitions:
//
//   Uploaded   -> Processing | Failed
//   Processing -> Ready | Failed
//   Ready      -> (terminal)
//   Failed     -> (terminal)
//
// A transition to the current status is a no-op, not an error; callers skip
// persistence side effects in that case.
//
// ============================================================================

pub fn can_transition(from: MediaStatus, to: MediaStatus) -> bool {
    match from {
        MediaStatus::Uploaded => matches!(to, MediaStatus::Processing | MediaStatus::Failed),
        MediaStatus::Processing => matches!(to, MediaStatus::Ready | MediaStatus::Failed),
        MediaStatus::Ready => false,
        MediaStatus::Failed => false,
    }
}

pub fn validate_transition(from: MediaStatus, to: MediaStatus) -> Result<(), MediaError> {
    if from == to {
        return Ok(());
    }
    if !can_transition(from, to) {
        return Err(MediaError::InvalidTransition { from, to });
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================
