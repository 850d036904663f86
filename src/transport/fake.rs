//! In-memory transport for tests and demos.
//!
//! Every stream the factory creates is recorded as a [`FakeConnection`] that
//! can push events into the stream and report the calls made on its handle.

use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{
    CloseReason, TransportConnection, TransportEvent, TransportFactory, TransportHandle,
    TransportOptions,
};
use crate::date_range::DateRange;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCall {
    Start,
    Pause,
    Resume,
    Close(CloseReason),
}

pub struct FakeConnection<R> {
    pub range: DateRange,
    pub options: TransportOptions,
    sender: mpsc::UnboundedSender<TransportEvent<R>>,
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl<R> Clone for FakeConnection<R> {
    fn clone(&self) -> Self {
        Self {
            range: self.range,
            options: self.options,
            sender: self.sender.clone(),
            calls: Arc::clone(&self.calls),
        }
    }
}

impl<R> FakeConnection<R> {
    fn send(&self, event: TransportEvent<R>) {
        // The stream may already have dropped the receiver after stop()
        let _ = self.sender.send(event);
    }

    pub fn open(&self) {
        self.send(TransportEvent::Open);
    }

    pub fn push(&self, record: R) {
        self.send(TransportEvent::Record(record));
    }

    pub fn push_all(&self, records: impl IntoIterator<Item = R>) {
        for record in records {
            self.push(record);
        }
    }

    pub fn transient_error(&self, message: &str) {
        self.send(TransportEvent::Error(TransportError::new(message)));
    }

    pub fn finish(&self) {
        self.send(TransportEvent::End(Ok(CloseReason::Finished)));
    }

    pub fn fail(&self, error: TransportError) {
        self.send(TransportEvent::End(Err(error)));
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn close_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, TransportCall::Close(_)))
            .count()
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }
}

struct FakeHandle {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl FakeHandle {
    fn record(&self, call: TransportCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl TransportHandle for FakeHandle {
    fn start(&mut self) {
        self.record(TransportCall::Start);
    }

    fn pause(&mut self) {
        self.record(TransportCall::Pause);
    }

    fn resume(&mut self) {
        self.record(TransportCall::Resume);
    }

    fn close(&mut self, reason: CloseReason) {
        self.record(TransportCall::Close(reason));
    }
}

pub struct FakeTransport<R> {
    connections: Arc<Mutex<Vec<FakeConnection<R>>>>,
}

impl<R> Clone for FakeTransport<R> {
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
        }
    }
}

impl<R> Default for FakeTransport<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> FakeTransport<R> {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn connections(&self) -> Vec<FakeConnection<R>> {
        self.connections
            .lock()
            .map(|connections| connections.clone())
            .unwrap_or_default()
    }

    pub fn connection(&self, index: usize) -> Option<FakeConnection<R>> {
        self.connections().get(index).cloned()
    }

    pub fn last_connection(&self) -> Option<FakeConnection<R>> {
        self.connections().last().cloned()
    }
}

impl<R: Send + 'static> TransportFactory for FakeTransport<R> {
    type Raw = R;

    fn create_stream(&self, range: &DateRange, options: &TransportOptions) -> TransportConnection<R> {
        let (sender, events) = mpsc::unbounded_channel();
        let calls = Arc::new(Mutex::new(Vec::new()));

        if let Ok(mut connections) = self.connections.lock() {
            connections.push(FakeConnection {
                range: *range,
                options: *options,
                sender,
                calls: Arc::clone(&calls),
            });
        }

        TransportConnection {
            handle: Box::new(FakeHandle { calls }),
            events,
        }
    }
}
