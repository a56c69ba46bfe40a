// ============================================================================
// Media Domain - Aggregate, State Machine, Events
// ============================================================================

pub mod errors;
pub mod events;
pub mod models;
pub mod status;

// Re-export for convenience
pub use errors::*;
pub use events::*;
pub use models::*;
pub use status::*;
