//! The live/cold log stream state machine.
//!
//! ```text
//! idle -> connecting -> running <-> paused(user | overflow)
//!            |             |
//!            |             +-> completed | error
//!            +-> waitingForFirstLog (live) | completed (bounded)
//! ```
//!
//! At most one transport connection exists per stream: opening always stops
//! the previous one first. The owner drives the stream with [`LogsStream::tick`]
//! (or [`LogsStream::run`]), which waits for the next transport event or timer
//! and handles it to completion before returning.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::date_range::DateRange;
use crate::error::{BufferError, TransportError};
use crate::log::{Buffer, BufferOptions, LogRecord, LogsProgress, Progress};
use crate::transport::{
    CloseReason, TransportConnection, TransportEvent, TransportFactory, TransportOptions,
};

pub mod convert;
pub mod state;

pub use convert::{ConvertFn, RawRecordConverter, RecordConverter};
pub use state::{LogsStreamState, PauseReason};

/// Consecutive transient transport errors before they are worth a warning
pub const TRANSIENT_ERROR_WARN_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogsStreamOptions {
    /// Batch window for records after the first one
    pub buffer_window: Duration,
    /// How long a live stream may stay silent before `waitingForFirstLog`
    pub waiting_timeout_live: Duration,
    /// How long a bounded stream may stay silent before it counts as completed
    pub waiting_timeout_bounded: Duration,
    /// Record count at which the stream pauses and asks for confirmation
    pub overflow_watermark: u64,
    pub transport: TransportOptions,
}

impl Default for LogsStreamOptions {
    fn default() -> Self {
        Self {
            buffer_window: Duration::from_millis(500),
            waiting_timeout_live: Duration::from_secs(2),
            waiting_timeout_bounded: Duration::from_secs(16),
            overflow_watermark: 10_000,
            transport: TransportOptions::default(),
        }
    }
}

/// Receives everything the stream wants the UI to know
pub trait LogsStreamListener: Send {
    fn on_state_change(&mut self, state: &LogsStreamState);
    fn on_logs(&mut self, logs: Vec<LogRecord>);
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamNotification {
    State(LogsStreamState),
    Logs(Vec<LogRecord>),
}

/// Forwards notifications over a channel, for owners living in another task
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<StreamNotification>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamNotification>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl LogsStreamListener for ChannelListener {
    fn on_state_change(&mut self, state: &LogsStreamState) {
        let _ = self.sender.send(StreamNotification::State(state.clone()));
    }

    fn on_logs(&mut self, logs: Vec<LogRecord>) {
        let _ = self.sender.send(StreamNotification::Logs(logs));
    }
}

/// Outcome of one wait inside [`LogsStream::tick`]
enum Wake<R> {
    Event(Option<TransportEvent<R>>),
    FlushDue,
    WatchdogFired,
    Deadline,
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct Connection<R> {
    range: DateRange,
    transport: TransportConnection<R>,
    first_log_received: bool,
    consecutive_errors: u32,
}

pub struct LogsStream<F, C, L>
where
    F: TransportFactory,
    C: RecordConverter<F::Raw>,
    L: LogsStreamListener,
{
    factory: F,
    converter: C,
    listener: L,
    options: LogsStreamOptions,
    buffer: Buffer<LogRecord>,
    progress: LogsProgress,
    state: LogsStreamState,
    connection: Option<Connection<F::Raw>>,
    waiting_deadline: Option<Instant>,
}

impl<F, C, L> LogsStream<F, C, L>
where
    F: TransportFactory,
    C: RecordConverter<F::Raw>,
    L: LogsStreamListener,
{
    pub fn new(factory: F, converter: C, listener: L, options: LogsStreamOptions) -> Result<Self, BufferError> {
        Ok(Self {
            factory,
            converter,
            listener,
            buffer: Buffer::new(BufferOptions::with_window(options.buffer_window))?,
            progress: LogsProgress::new(options.overflow_watermark),
            options,
            state: LogsStreamState::Idle,
            connection: None,
            waiting_deadline: None,
        })
    }

    pub fn state(&self) -> &LogsStreamState {
        &self.state
    }

    pub fn progress(&self) -> Progress {
        self.progress.snapshot()
    }

    pub fn options(&self) -> &LogsStreamOptions {
        &self.options
    }

    /// Date of the most recent record handed to the listener
    pub fn last_log_date(&self) -> Option<DateTime<Utc>> {
        self.progress.last_log_date()
    }

    /// Range of the open connection
    pub fn range(&self) -> Option<&DateRange> {
        self.connection.as_ref().map(|connection| &connection.range)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut L {
        &mut self.listener
    }

    fn set_state(&mut self, state: LogsStreamState) {
        debug!(from = self.state.name(), to = state.name(), "logs stream state change");
        self.state = state;
        self.listener.on_state_change(&self.state);
    }

    fn running_state(&self) -> LogsStreamState {
        LogsStreamState::Running {
            progress: self.progress.snapshot(),
            overflowing: self.progress.is_overflowing(),
        }
    }

    /// Open a stream for `range`, closing any previous one first
    pub fn open_logs_stream(&mut self, range: DateRange) {
        self.stop();

        info!(%range, "opening logs stream");
        self.progress.start(&range);
        self.set_state(LogsStreamState::Connecting);

        let mut transport = self.factory.create_stream(&range, &self.options.transport);
        transport.handle.start();
        self.connection = Some(Connection {
            range,
            transport,
            first_log_received: false,
            consecutive_errors: 0,
        });
    }

    /// Close the transport and forget everything buffered. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.waiting_deadline = None;
        self.buffer.clear();
        self.progress.reset();

        if let Some(mut connection) = self.connection.take() {
            connection.transport.handle.close(CloseReason::Stopped);
        }

        if self.state != LogsStreamState::Idle {
            self.set_state(LogsStreamState::Idle);
        }
    }

    pub fn pause(&mut self) {
        if !matches!(self.state, LogsStreamState::Running { .. }) {
            return;
        }
        self.pause_with(PauseReason::User);
    }

    pub fn resume(&mut self) {
        if !self.state.is_paused() {
            return;
        }
        if let Some(connection) = self.connection.as_mut() {
            connection.transport.handle.resume();
        }
        let state = self.running_state();
        self.set_state(state);
    }

    /// Keep streaming past the watermark
    pub fn accept_overflow(&mut self) {
        if self.state.is_paused_for_overflow() {
            self.resume();
        }
    }

    /// Stop exactly where the overflow pause happened
    pub fn discard_overflow(&mut self) {
        if !self.state.is_paused_for_overflow() {
            return;
        }
        self.waiting_deadline = None;
        self.buffer.clear();
        if let Some(mut connection) = self.connection.take() {
            connection.transport.handle.close(CloseReason::OverflowDiscarded);
        }
        info!(last_log_date = ?self.last_log_date(), "overflow discarded");
        self.set_state(LogsStreamState::Completed {
            progress: self.progress.snapshot(),
            overflowing: self.progress.is_overflowing(),
        });
    }

    /// Deliver anything buffered and mark the stream completed
    pub fn complete(&mut self) {
        self.waiting_deadline = None;
        self.flush_buffer();
        if let Some(mut connection) = self.connection.take() {
            connection.transport.handle.close(CloseReason::Completed);
        }
        self.progress.complete();
        self.set_state(LogsStreamState::Completed {
            progress: self.progress.snapshot(),
            overflowing: self.progress.is_overflowing(),
        });
    }

    fn pause_with(&mut self, reason: PauseReason) {
        self.flush_buffer();
        // The flush may have crossed the watermark, which takes precedence
        if self.state.is_paused_for_overflow() {
            return;
        }
        if let Some(connection) = self.connection.as_mut() {
            connection.transport.handle.pause();
        }
        self.set_state(LogsStreamState::Paused {
            progress: self.progress.snapshot(),
            overflowing: self.progress.is_overflowing(),
            reason,
        });
    }

    fn flush_buffer(&mut self) {
        if let Some(batch) = self.buffer.flush() {
            self.append_logs(batch);
        }
    }

    /// Hand a batch to the listener and account for it
    fn append_logs(&mut self, logs: Vec<LogRecord>) {
        let crossed_watermark = self.progress.progress(&logs);
        self.listener.on_logs(logs);

        if matches!(
            self.state,
            LogsStreamState::Idle | LogsStreamState::Completed { .. } | LogsStreamState::Error { .. }
        ) {
            return;
        }

        if crossed_watermark {
            warn!(
                watermark = self.progress.watermark(),
                "overflow watermark reached, pausing logs stream"
            );
            self.pause_with(PauseReason::Overflow);
            return;
        }

        let state = match self.state {
            LogsStreamState::Paused { reason, .. } => LogsStreamState::Paused {
                progress: self.progress.snapshot(),
                overflowing: self.progress.is_overflowing(),
                reason,
            },
            _ => self.running_state(),
        };
        self.set_state(state);
    }

    async fn handle_record(&mut self, raw: F::Raw) {
        let record = match self.converter.convert(raw).await {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "dropping log record that failed conversion");
                return;
            }
        };
        // Only a usable record counts as the stream having produced logs
        self.waiting_deadline = None;

        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        connection.consecutive_errors = 0;

        if !connection.first_log_received {
            // The first record skips the buffer so something shows up right away
            connection.first_log_received = true;
            self.append_logs(vec![record]);
        } else if let Some(batch) = self.buffer.add(record) {
            self.append_logs(batch);
        }
    }

    fn handle_transient_error(&mut self, error: TransportError) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        connection.consecutive_errors += 1;
        let retries = connection.consecutive_errors;
        if retries >= TRANSIENT_ERROR_WARN_THRESHOLD {
            warn!(retries, error = %error, "logs transport keeps failing, retrying");
        } else {
            debug!(retries, error = %error, "logs transport error, retrying");
        }
    }

    fn handle_end(&mut self, outcome: Result<CloseReason, TransportError>) {
        let Some(connection) = self.connection.as_ref() else {
            return;
        };
        let live = connection.range.is_live();

        match outcome {
            Ok(reason) => {
                debug!(?reason, "logs transport ended");
                self.complete();
            }
            Err(err) if err.is_not_found() && !live => {
                info!(error = %err, "no more logs for bounded range");
                self.complete();
            }
            Err(err) => {
                error!(error = %err, "logs transport failed");
                self.waiting_deadline = None;
                self.flush_buffer();
                self.connection = None;
                self.set_state(LogsStreamState::Error {
                    message: err.to_string(),
                });
            }
        }
    }

    fn handle_waiting_timeout(&mut self) {
        self.waiting_deadline = None;
        let live = match self.connection.as_ref() {
            Some(connection) if !connection.first_log_received => connection.range.is_live(),
            _ => return,
        };

        if live {
            // The app may just be quiet, keep the connection open
            self.set_state(LogsStreamState::WaitingForFirstLog);
        } else {
            info!("no logs received for bounded range, completing");
            self.complete();
        }
    }

    async fn handle_event(&mut self, event: Option<TransportEvent<F::Raw>>) {
        match event {
            Some(TransportEvent::Open) => {
                let Some(connection) = self.connection.as_ref() else {
                    return;
                };
                if connection.first_log_received {
                    return;
                }
                let timeout = if connection.range.is_live() {
                    self.options.waiting_timeout_live
                } else {
                    self.options.waiting_timeout_bounded
                };
                debug!(?timeout, "logs transport open, waiting for first record");
                self.waiting_deadline = Some(Instant::now() + timeout);
            }
            Some(TransportEvent::Record(raw)) => self.handle_record(raw).await,
            Some(TransportEvent::Error(error)) => self.handle_transient_error(error),
            Some(TransportEvent::End(outcome)) => self.handle_end(outcome),
            None => self.handle_end(Ok(CloseReason::Finished)),
        }
    }

    async fn step(&mut self, until: Option<Instant>) -> bool {
        let Some(connection) = self.connection.as_mut() else {
            return false;
        };
        let flush_at = self.buffer.deadline();
        let watchdog_at = self.waiting_deadline;

        let wake = tokio::select! {
            // Due timers win over a busy transport so batches keep flowing
            biased;
            _ = sleep_until_some(until) => Wake::Deadline,
            _ = sleep_until_some(flush_at) => Wake::FlushDue,
            _ = sleep_until_some(watchdog_at) => Wake::WatchdogFired,
            event = connection.transport.events.recv() => Wake::Event(event),
        };

        match wake {
            Wake::Event(event) => self.handle_event(event).await,
            Wake::FlushDue => {
                if let Some(batch) = self.buffer.take_expired(Instant::now()) {
                    self.append_logs(batch);
                }
            }
            Wake::WatchdogFired => self.handle_waiting_timeout(),
            Wake::Deadline => return false,
        }
        true
    }

    /// Handle the next transport event or timer. Returns false when there is
    /// no connection to drive.
    pub async fn tick(&mut self) -> bool {
        self.step(None).await
    }

    /// Drive the stream until the connection ends
    pub async fn run(&mut self) {
        while self.tick().await {}
    }

    /// Drive the stream until the connection ends or `deadline` passes
    pub async fn run_until(&mut self, deadline: Instant) {
        while self.step(Some(deadline)).await {}
    }

    /// Drive the stream for `duration`
    pub async fn run_for(&mut self, duration: Duration) {
        self.run_until(Instant::now() + duration).await;
    }
}

impl<F, C, L> Drop for LogsStream<F, C, L>
where
    F: TransportFactory,
    C: RecordConverter<F::Raw>,
    L: LogsStreamListener,
{
    fn drop(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.transport.handle.close(CloseReason::Stopped);
        }
    }
}
