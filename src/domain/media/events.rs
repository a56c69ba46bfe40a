use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::DomainEvent;

use super::models::MediaStatus;

// ============================================================================
// Media Domain Events
// ============================================================================

/// Emitted when a media asset moves to a new status. The serialized form is
/// the wire payload stored in the outbox and published to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaStatusChanged {
    pub event_id: Uuid,
    pub media_id: Uuid,
    pub from: MediaStatus,
    pub to: MediaStatus,
    pub occurred_at: DateTime<Utc>,
}

impl MediaStatusChanged {
    pub const EVENT_TYPE: &'static str = "MediaStatusChanged";

    pub fn new(media_id: Uuid, from: MediaStatus, to: MediaStatus) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            media_id,
            from,
            to,
            occurred_at: Utc::now(),
        }
    }
}

impl DomainEvent for MediaStatusChanged {
    fn event_id(&self) -> Uuid {
        self.event_id
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn aggregate_id(&self) -> Uuid {
        self.media_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
