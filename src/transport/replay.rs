//! Replays newline-delimited JSON log records from a file.
//!
//! Bounded ranges end at EOF. Live ranges keep tailing the file until closed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::{
    CloseReason, TransportConnection, TransportEvent, TransportFactory, TransportHandle,
    TransportOptions,
};
use crate::date_range::{DateRange, parse_date};
use crate::error::{NOT_FOUND, TransportError};

const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(500);
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// One line of a replay file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub date: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(date: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            date: date.into(),
            message: message.into(),
            instance: None,
            metadata: BTreeMap::new(),
        }
    }
}

/// Factory reading records from `path`
#[derive(Debug, Clone)]
pub struct ReplayTransport {
    path: PathBuf,
    poll_interval: Duration,
}

impl ReplayTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: TAIL_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl TransportFactory for ReplayTransport {
    type Raw = RawRecord;

    fn create_stream(&self, range: &DateRange, options: &TransportOptions) -> TransportConnection<RawRecord> {
        let (sender, events) = mpsc::unbounded_channel();
        let (paused_tx, _) = watch::channel(false);

        TransportConnection {
            handle: Box::new(ReplayHandle {
                job: Some(ReplayJob {
                    path: self.path.clone(),
                    range: *range,
                    options: *options,
                    poll_interval: self.poll_interval,
                    events: sender,
                }),
                paused: paused_tx,
                task: None,
            }),
            events,
        }
    }
}

struct ReplayJob {
    path: PathBuf,
    range: DateRange,
    options: TransportOptions,
    poll_interval: Duration,
    events: mpsc::UnboundedSender<TransportEvent<RawRecord>>,
}

struct ReplayHandle {
    job: Option<ReplayJob>,
    paused: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle for ReplayHandle {
    fn start(&mut self) {
        let Some(job) = self.job.take() else {
            return; // Already running
        };
        let paused = self.paused.subscribe();
        self.task = Some(tokio::spawn(replay_file(job, paused)));
    }

    fn pause(&mut self) {
        self.paused.send_replace(true);
    }

    fn resume(&mut self) {
        self.paused.send_replace(false);
    }

    fn close(&mut self, reason: CloseReason) {
        debug!(?reason, "closing replay transport");
        self.job = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ReplayHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Open the file, retrying while it does not exist yet
async fn open_with_retry(job: &ReplayJob) -> Result<File, TransportError> {
    let mut attempt = 0;
    loop {
        let error = match File::open(&job.path).await {
            Ok(file) => return Ok(file),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => TransportError::with_status(
                NOT_FOUND,
                format!("{} not found", job.path.display()),
            ),
            Err(err) => TransportError::new(format!("cannot open {}: {}", job.path.display(), err)),
        };

        if attempt >= job.options.max_retry_count {
            return Err(error);
        }
        attempt += 1;
        if job.events.send(TransportEvent::Error(error)).is_err() {
            return Err(TransportError::new("receiver dropped"));
        }
        tokio::time::sleep(RETRY_BACKOFF * attempt).await;
    }
}

/// Wait while paused. Returns false once the handle is gone.
async fn wait_while_paused(paused: &mut watch::Receiver<bool>) -> bool {
    while *paused.borrow_and_update() {
        if paused.changed().await.is_err() {
            return false;
        }
    }
    true
}

fn in_range(record: &RawRecord, range: &DateRange) -> bool {
    match parse_date(&record.date) {
        Ok(date) => range.contains(&date),
        // Let the converter decide what to do with it
        Err(_) => true,
    }
}

async fn replay_file(job: ReplayJob, mut paused: watch::Receiver<bool>) {
    let file = match open_with_retry(&job).await {
        Ok(file) => file,
        Err(error) => {
            let _ = job.events.send(TransportEvent::End(Err(error)));
            return;
        }
    };

    if job.events.send(TransportEvent::Open).is_err() {
        return;
    }

    let mut reader = BufReader::new(file);
    // Holds an unterminated line until the writer finishes it
    let mut pending = String::new();
    let throttle_elements = job.options.throttle_elements.max(1);
    let mut window_start = Instant::now();
    let mut sent_in_window = 0usize;

    loop {
        if !wait_while_paused(&mut paused).await {
            return;
        }

        let read = match reader.read_line(&mut pending).await {
            Ok(read) => read,
            Err(err) => {
                let _ = job
                    .events
                    .send(TransportEvent::End(Err(TransportError::new(err.to_string()))));
                return;
            }
        };

        if !pending.ends_with('\n') {
            if job.range.is_live() {
                // At EOF, possibly in the middle of a write
                tokio::time::sleep(job.poll_interval).await;
                continue;
            }
            if read > 0 {
                // The next read confirms EOF
                continue;
            }
            if pending.is_empty() {
                let _ = job.events.send(TransportEvent::End(Ok(CloseReason::Finished)));
                return;
            }
            // Bounded: the last line has no trailing newline
        }

        let line = std::mem::take(&mut pending);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match serde_json::from_str::<RawRecord>(line) {
            Ok(record) if in_range(&record, &job.range) => TransportEvent::Record(record),
            Ok(_) => continue,
            Err(err) => TransportEvent::Error(TransportError::new(format!("skipping malformed line: {}", err))),
        };

        if matches!(event, TransportEvent::Record(_)) {
            if window_start.elapsed() >= job.options.throttle_per {
                window_start = Instant::now();
                sent_in_window = 0;
            }
            if sent_in_window >= throttle_elements {
                tokio::time::sleep_until(window_start + job.options.throttle_per).await;
                window_start = Instant::now();
                sent_in_window = 0;
            }
            sent_in_window += 1;
        }

        if job.events.send(event).is_err() {
            return;
        }
    }
}
