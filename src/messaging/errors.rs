use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;

// ============================================================================
// Publish Errors & Retriability Classification
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("producer is closed")]
    Closed,

    #[error("producer already closed")]
    AlreadyClosed,

    #[error("cancelled while waiting to retry")]
    Cancelled,

    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: KafkaError,
    },

    #[error("flush on close failed: {0}")]
    Flush(#[source] KafkaError),

    #[error("high error rate: {errors} errors out of {writes} writes")]
    Unhealthy { errors: u64, writes: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("brokers list is empty")]
    EmptyBrokers,

    #[error("topic is empty")]
    EmptyTopic,

    #[error("batch size must be positive")]
    ZeroBatchSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retriable,
    NonRetriable,
}

/// Decide whether a failed broker call is worth another attempt.
///
/// Classification is structured first: the rdkafka error code is the source
/// of truth. Substring matching on the error text is only a fallback for
/// opaque errors, and unknown errors default to retriable.
pub fn classify(err: &KafkaError) -> ErrorClass {
    if let Some(code) = err.rdkafka_error_code() {
        return classify_code(code);
    }
    classify_text(&err.to_string())
}

fn classify_code(code: RDKafkaErrorCode) -> ErrorClass {
    use RDKafkaErrorCode::*;

    match code {
        // Malformed or oversized messages and authorization failures will
        // fail identically on every attempt.
        InvalidMessage
        | InvalidMessageSize
        | MessageSizeTooLarge
        | TopicAuthorizationFailed
        | GroupAuthorizationFailed
        | ClusterAuthorizationFailed
        | SaslAuthenticationFailed
        | PolicyViolation
        | MessageBatchTooLarge => ErrorClass::NonRetriable,

        // Everything else (transport failures, leader churn, timeouts, full
        // local queue, ...) is assumed transient.
        _ => ErrorClass::Retriable,
    }
}

fn classify_text(text: &str) -> ErrorClass {
    const NON_RETRIABLE: [&str; 4] = [
        "invalid message",
        "message too large",
        "authorization failed",
        "topic authorization failed",
    ];

    for pattern in NON_RETRIABLE {
        if text.contains(pattern) {
            return ErrorClass::NonRetriable;
        }
    }

    ErrorClass::Retriable
}

// ============================================================================
// Unit Tests
// ============================================================================
