// ============================================================================
// Storage Layer
// ============================================================================
//
// Postgres-backed repositories for the media aggregate and the outbox
// queue. The two share one PgPool so a single transaction can span both
// tables (the atomicity guarantee the outbox pattern depends on).
//
// ============================================================================

pub mod postgres;
