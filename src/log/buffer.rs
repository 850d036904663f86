use std::time::Duration;
use tokio::time::Instant;

use crate::error::BufferError;

/// Flush thresholds for a [`Buffer`]. At least one must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferOptions {
    /// Flush as soon as this many items are buffered
    pub length: Option<usize>,
    /// Flush this long after the first item since the previous flush
    pub window: Option<Duration>,
}

impl BufferOptions {
    pub fn with_window(window: Duration) -> Self {
        Self {
            length: None,
            window: Some(window),
        }
    }

    pub fn with_length(length: usize) -> Self {
        Self {
            length: Some(length),
            window: None,
        }
    }
}

/// Batches items until a count or time threshold is reached.
///
/// Flushing hands the batch back to the caller instead of invoking a stored
/// callback, so the owner can route it with full access to its own state.
/// The time threshold is a deadline: the owner sleeps until [`Buffer::deadline`]
/// and then calls [`Buffer::take_expired`].
#[derive(Debug)]
pub struct Buffer<T> {
    items: Vec<T>,
    options: BufferOptions,
    deadline: Option<Instant>,
}

impl<T> Buffer<T> {
    pub fn new(options: BufferOptions) -> Result<Self, BufferError> {
        match options {
            BufferOptions {
                length: None,
                window: None,
            } => Err(BufferError::NoThreshold),
            BufferOptions {
                length: Some(0), ..
            } => Err(BufferError::ZeroLength),
            _ => Ok(Self {
                items: Vec::new(),
                options,
                deadline: None,
            }),
        }
    }

    /// Add an item. Returns the flushed batch when the length threshold is reached.
    pub fn add(&mut self, item: T) -> Option<Vec<T>> {
        self.items.push(item);

        if let Some(length) = self.options.length {
            if self.items.len() >= length {
                return self.flush();
            }
        }

        if self.deadline.is_none() {
            if let Some(window) = self.options.window {
                self.deadline = Some(Instant::now() + window);
            }
        }

        None
    }

    /// Swap out everything buffered so far. `None` when empty.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        self.deadline = None;
        if self.items.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.items))
    }

    /// Flush if the time window has elapsed at `now`
    pub fn take_expired(&mut self, now: Instant) -> Option<Vec<T>> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.flush(),
            _ => None,
        }
    }

    /// Drop buffered items and the pending timer without flushing
    pub fn clear(&mut self) {
        self.deadline = None;
        self.items.clear();
    }

    /// When the pending time-based flush is due, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
