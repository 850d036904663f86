use chrono::{DateTime, Utc};
use serde::Serialize;

use super::LogRecord;
use crate::date_range::DateRange;

/// Snapshot of how far a stream has got
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Number of records received since the stream opened
    pub value: u64,
    /// Completion percentage, only for bounded ranges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::date_range::iso_millis::serialize_option"
    )]
    pub last_log_date: Option<DateTime<Utc>>,
}

/// Counts received records, derives a time-based percentage for bounded
/// ranges and signals when the overflow watermark is crossed.
#[derive(Debug)]
pub struct LogsProgress {
    watermark: u64,
    value: u64,
    last_log_date: Option<DateTime<Utc>>,
    range_start: Option<DateTime<Utc>>,
    /// Range duration in milliseconds, `None` for live ranges
    range_duration_ms: Option<i64>,
    percent: Option<f64>,
    overflow_signaled: bool,
}

impl LogsProgress {
    pub fn new(watermark: u64) -> Self {
        Self {
            watermark,
            value: 0,
            last_log_date: None,
            range_start: None,
            range_duration_ms: None,
            percent: None,
            overflow_signaled: false,
        }
    }

    pub fn start(&mut self, range: &DateRange) {
        self.reset();
        self.range_start = Some(range.since);
        self.range_duration_ms = range.duration().map(|d| d.num_milliseconds());
        if !self.is_live() {
            self.percent = Some(0.0);
        }
    }

    pub fn reset(&mut self) {
        self.value = 0;
        self.last_log_date = None;
        self.range_start = None;
        self.range_duration_ms = None;
        self.percent = None;
        self.overflow_signaled = false;
    }

    /// Account for a batch of records.
    ///
    /// Returns `true` only for the call that makes the count reach the watermark.
    pub fn progress(&mut self, records: &[LogRecord]) -> bool {
        let Some(last) = records.last() else {
            return false;
        };

        self.value += records.len() as u64;
        self.last_log_date = Some(last.date);

        if let (Some(start), Some(duration_ms)) = (self.range_start, self.range_duration_ms) {
            let percent = if duration_ms <= 0 {
                100.0
            } else {
                let elapsed_ms = (last.date - start).num_milliseconds();
                100.0 * elapsed_ms as f64 / duration_ms as f64
            };
            self.percent = Some(percent.clamp(0.0, 100.0));
        }

        if !self.overflow_signaled && self.is_overflowing() {
            self.overflow_signaled = true;
            return true;
        }
        false
    }

    pub fn complete(&mut self) {
        if !self.is_live() {
            self.percent = Some(100.0);
        }
    }

    pub fn is_overflowing(&self) -> bool {
        self.value >= self.watermark
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0
    }

    pub fn is_live(&self) -> bool {
        self.range_duration_ms.is_none()
    }

    pub fn last_log_date(&self) -> Option<DateTime<Utc>> {
        self.last_log_date
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn snapshot(&self) -> Progress {
        Progress {
            value: self.value,
            percent: if self.is_live() { None } else { self.percent },
            last_log_date: self.last_log_date,
        }
    }
}
