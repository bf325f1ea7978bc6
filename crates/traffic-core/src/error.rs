//! Error types for the traffic engine

use thiserror::Error;

/// Result type alias for traffic engine operations
pub type Result<T> = std::result::Result<T, TrafficError>;

/// Errors raised by the traffic engine
#[derive(Debug, Error)]
pub enum TrafficError {
    /// Invalid engine or outcome configuration; fatal at construction
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A job was submitted to a pool that has been shut down
    #[error("Queue '{pool}' is closed")]
    QueueClosed { pool: String },

    /// The downstream CDR sink rejected a record
    #[error("Failed to deliver CDR {cdr_id}: {reason}")]
    CdrDelivery { cdr_id: u64, reason: String },

    /// A job handler failed while processing a dequeued job
    #[error("Handler error: {0}")]
    Handler(String),
}

impl TrafficError {
    /// Create a new configuration error
    pub fn config(details: impl Into<String>) -> Self {
        Self::Configuration(details.into())
    }

    /// Whether the error can only be fixed by changing the configuration
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
