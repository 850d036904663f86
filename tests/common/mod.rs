#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use logstreamer::date_range::DateRange;
use logstreamer::error::ConvertError;
use logstreamer::log::LogRecord;
use logstreamer::stream::{ConvertFn, LogsStream, LogsStreamListener, LogsStreamOptions, LogsStreamState};
use logstreamer::transport::FakeTransport;

pub type NumberConverter = fn(u32) -> Result<LogRecord, ConvertError>;
pub type TestStream = LogsStream<FakeTransport<u32>, ConvertFn<NumberConverter>, RecordingListener>;

/// Keeps everything the stream reported, in order
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub states: Vec<LogsStreamState>,
    pub batches: Vec<Vec<LogRecord>>,
}

impl RecordingListener {
    /// Ids of every delivered batch
    pub fn batch_ids(&self) -> Vec<Vec<String>> {
        self.batches
            .iter()
            .map(|batch| batch.iter().map(|record| record.id.clone()).collect())
            .collect()
    }

    pub fn state_names(&self) -> Vec<&'static str> {
        self.states.iter().map(LogsStreamState::name).collect()
    }
}

impl LogsStreamListener for RecordingListener {
    fn on_state_change(&mut self, state: &LogsStreamState) {
        self.states.push(state.clone());
    }

    fn on_logs(&mut self, logs: Vec<LogRecord>) {
        self.batches.push(logs);
    }
}

/// Fixed base time so records and ranges line up
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 17, 12, 0, 0).unwrap()
}

/// Record `n` is dated `n` seconds after [`base_time`]
pub fn create_test_record(n: u32) -> LogRecord {
    LogRecord::new(n.to_string(), base_time() + Duration::seconds(n as i64), format!("message {}", n))
}

/// Zero stands for a record the converter rejects
pub fn convert_number(n: u32) -> Result<LogRecord, ConvertError> {
    if n == 0 {
        return Err(ConvertError::Malformed("record zero".to_string()));
    }
    Ok(create_test_record(n))
}

pub fn bounded_range() -> DateRange {
    DateRange::new(base_time(), Some(base_time() + Duration::seconds(100))).unwrap()
}

pub fn live_range() -> DateRange {
    DateRange::live(base_time())
}

/// Short timers so tests run quickly under paused time
pub fn fast_options() -> LogsStreamOptions {
    LogsStreamOptions {
        buffer_window: std::time::Duration::from_millis(100),
        waiting_timeout_live: std::time::Duration::from_millis(50),
        waiting_timeout_bounded: std::time::Duration::from_millis(50),
        overflow_watermark: 1_000,
        ..LogsStreamOptions::default()
    }
}

pub fn create_test_stream(options: LogsStreamOptions) -> (TestStream, FakeTransport<u32>) {
    let fake = FakeTransport::new();
    let stream = LogsStream::new(
        fake.clone(),
        ConvertFn(convert_number as NumberConverter),
        RecordingListener::default(),
        options,
    )
    .unwrap();
    (stream, fake)
}
