use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// This module contains the media aggregate and its business rules:
// - Models (Media, MediaStatus, MediaType)
// - Status transition state machine
// - Domain events (MediaStatusChanged)
// - Errors (MediaError enum)
//
// This layer performs no I/O; storage and messaging live elsewhere.
//
// ============================================================================

pub mod media;

/// Base trait for all domain events.
///
/// An event is immutable once constructed and carries enough identity to be
/// persisted in the outbox and keyed on the wire (consumers deduplicate by
/// event id).
pub trait DomainEvent {
    fn event_id(&self) -> Uuid;
    fn event_type(&self) -> &'static str;
    fn aggregate_id(&self) -> Uuid;
    fn occurred_at(&self) -> DateTime<Utc>;
}
