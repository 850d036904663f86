//! Error types shared across the log pipeline.
//!
//! Contract violations (a buffer without thresholds, shifting a live range)
//! are returned to the caller immediately. Runtime conditions (transport
//! hiccups, a malformed record) are absorbed by the stream and only logged.

/// HTTP status the transport reports when a bounded range has no more data.
pub const NOT_FOUND: u16 = 404;

/// Raised when a [`Buffer`](crate::log::Buffer) is configured without any flush threshold.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("buffer needs a length threshold, a time window, or both")]
    NoThreshold,
    #[error("buffer length threshold must be greater than zero")]
    ZeroLength,
}

/// Misuse of the date range helpers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateRangeError {
    #[error("range starts at {since} which is after its end {until}")]
    Inverted { since: String, until: String },
    #[error("cannot shift an open-ended (live) date range")]
    LiveRange,
    #[error("invalid date '{0}': expected an ISO-8601 timestamp")]
    InvalidDate(String),
    #[error("unknown preset '{0}'")]
    UnknownPreset(String),
}

/// Failure reported by a transport.
///
/// Delivered either as a non-fatal event while the transport retries on its
/// own, or as the terminal outcome of the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(NOT_FOUND)
    }
}

/// A raw record could not be turned into a [`LogRecord`](crate::log::LogRecord).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// The instances/deployments source could not be queried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("instances source failed: {0}")]
pub struct SourceError(pub String);

/// A strict message filter could not be compiled.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid message filter '{value}': {source}")]
pub struct FilterError {
    pub value: String,
    #[source]
    pub source: regex::Error,
}

#[derive(Debug, thiserror::Error)]
pub enum ClipboardError {
    #[error("nothing is selected")]
    EmptySelection,
    #[error("clipboard unavailable: {0}")]
    Unavailable(#[from] arboard::Error),
}
