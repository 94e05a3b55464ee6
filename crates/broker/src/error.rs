use thiserror::Error;

/// Errors returned by broker clients.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A message was sent without a topic.
    #[error("Message topic is required")]
    TopicRequired,

    /// The delay level is outside the delay-tier table.
    #[error("Invalid delay level {0}, expected 1..=18")]
    InvalidDelayLevel(u8),

    /// The consumer group has not subscribed to the topic.
    #[error("Group {group} is not subscribed to {topic}")]
    NotSubscribed { topic: String, group: String },

    /// The broker has been shut down.
    #[error("Broker is closed")]
    Closed,

    /// The half-message store failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
