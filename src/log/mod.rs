use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub mod buffer;
pub mod progress;

// Re-export commonly used types
pub use buffer::{Buffer, BufferOptions};
pub use progress::{LogsProgress, Progress};

/// A single name/value pair attached to a log record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub value: String,
}

impl Metadata {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A log entry as displayed by the viewer.
///
/// Records are produced by a [`RecordConverter`](crate::stream::RecordConverter)
/// and never change afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub id: String,
    #[serde(serialize_with = "crate::date_range::iso_millis::serialize")]
    pub date: DateTime<Utc>,
    pub message: String,
    pub metadata: Vec<Metadata>,
    /// Pre-computed lowercase message for case-insensitive matching
    #[serde(skip)]
    message_lowercase: String,
}

impl LogRecord {
    pub fn new(id: impl Into<String>, date: DateTime<Utc>, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lowercase = message.to_lowercase();
        Self {
            id: id.into(),
            date,
            message,
            metadata: Vec::new(),
            message_lowercase,
        }
    }

    pub fn with_metadata(mut self, metadata: Vec<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get the pre-computed lowercase version of the message
    pub fn message_lowercase(&self) -> &str {
        &self.message_lowercase
    }

    /// Value of the first metadata entry with the given name
    pub fn metadata_value(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.value.as_str())
    }

    /// Date formatted as an ISO-8601 string with millisecond precision
    pub fn formatted_date(&self) -> String {
        self.date.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

impl PartialEq for LogRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.date == other.date
            && self.message == other.message
            && self.metadata == other.metadata
    }
}
