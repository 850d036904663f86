//! The connection a [`LogsStream`](crate::stream::LogsStream) drives.
//!
//! How a transport negotiates HTTP/SSE, authenticates or backs off is its own
//! business. The stream only sees the events below and the four controls on
//! [`TransportHandle`].

use std::time::Duration;
use tokio::sync::mpsc;

use crate::date_range::DateRange;
use crate::error::TransportError;

pub mod fake;
pub mod replay;

pub use fake::{FakeConnection, FakeTransport, TransportCall};
pub use replay::{RawRecord, ReplayTransport};

/// Why a connection ended or was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The transport ran out of data on its own
    Finished,
    /// The owner stopped the stream
    Stopped,
    /// The owner decided no more data will come
    Completed,
    /// The user declined to continue past the overflow watermark
    OverflowDiscarded,
}

/// Tuning passed to the transport when a stream is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub max_retry_count: u32,
    /// At most this many records per `throttle_per`
    pub throttle_elements: usize,
    pub throttle_per: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            max_retry_count: 6,
            throttle_elements: 1000,
            throttle_per: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent<R> {
    /// The connection is established
    Open,
    Record(R),
    /// Non-fatal: the transport is retrying on its own
    Error(TransportError),
    /// Terminal outcome. A closed channel without `End` counts as `Ok(Finished)`.
    End(Result<CloseReason, TransportError>),
}

pub trait TransportHandle: Send {
    /// Begin delivering events
    fn start(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    fn close(&mut self, reason: CloseReason);
}

pub struct TransportConnection<R> {
    pub handle: Box<dyn TransportHandle>,
    pub events: mpsc::UnboundedReceiver<TransportEvent<R>>,
}

/// Creates one connection per opened stream
pub trait TransportFactory: Send {
    type Raw: Send + 'static;

    fn create_stream(&self, range: &DateRange, options: &TransportOptions) -> TransportConnection<Self::Raw>;
}
