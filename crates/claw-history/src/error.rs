//! Error types for the state history subsystem.

use thiserror::Error;

/// Errors that can occur while recording or querying state history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A selector could not be built from the query input.
    #[error("invalid selector: {reason}")]
    InvalidSelector {
        /// The reason the selector was rejected.
        reason: String,
    },

    /// The query time window is unusable.
    #[error("invalid time range: {reason}")]
    InvalidTimeRange {
        /// The reason the range was rejected.
        reason: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A canonical label string could not be parsed back into labels.
    #[error("failed to parse labels: {reason}")]
    LabelParse {
        /// The reason parsing failed.
        reason: String,
    },

    /// The log store client failed.
    #[error("log store {operation} failed: {reason}")]
    Transport {
        /// The client operation that failed (ping, push or query).
        operation: &'static str,
        /// The reason reported by the client.
        reason: String,
    },

    /// A batch of state history could not be saved.
    #[error("failed to save state history batch: {0}")]
    SaveBatch(#[source] Box<HistoryError>),

    /// Query results from the log store could not be decoded.
    #[error("failed to decode query result: {reason}")]
    Decode {
        /// The reason decoding failed.
        reason: String,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// The historian configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HistoryError {
    /// Creates a transport error for the given client operation.
    pub fn transport(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            reason: reason.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }
}

/// Result type alias for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
