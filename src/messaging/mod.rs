// ============================================================================
// Messaging Layer - Kafka Producer
// ============================================================================

pub mod errors;
pub mod producer;

pub use errors::{classify, ConfigError, ErrorClass, PublishError};
pub use producer::{KafkaProducer, Message, MetricsSnapshot, ProducerConfig};
