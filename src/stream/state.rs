use serde::Serialize;

use crate::log::Progress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    User,
    Overflow,
}

/// Externally visible state of a [`LogsStream`](super::LogsStream)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LogsStreamState {
    Idle,
    Connecting,
    /// Live range connected, nothing received yet
    WaitingForFirstLog,
    Running {
        progress: Progress,
        overflowing: bool,
    },
    Paused {
        progress: Progress,
        overflowing: bool,
        reason: PauseReason,
    },
    Completed {
        progress: Progress,
        overflowing: bool,
    },
    Error {
        message: String,
    },
}

impl LogsStreamState {
    pub fn name(&self) -> &'static str {
        match self {
            LogsStreamState::Idle => "idle",
            LogsStreamState::Connecting => "connecting",
            LogsStreamState::WaitingForFirstLog => "waitingForFirstLog",
            LogsStreamState::Running { .. } => "running",
            LogsStreamState::Paused { .. } => "paused",
            LogsStreamState::Completed { .. } => "completed",
            LogsStreamState::Error { .. } => "error",
        }
    }

    pub fn progress(&self) -> Option<&Progress> {
        match self {
            LogsStreamState::Running { progress, .. }
            | LogsStreamState::Paused { progress, .. }
            | LogsStreamState::Completed { progress, .. } => Some(progress),
            _ => None,
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, LogsStreamState::Paused { .. })
    }

    pub fn is_paused_for_overflow(&self) -> bool {
        matches!(
            self,
            LogsStreamState::Paused {
                reason: PauseReason::Overflow,
                ..
            }
        )
    }

    /// Completed or failed: the stream will not change on its own anymore
    pub fn is_terminal(&self) -> bool {
        matches!(self, LogsStreamState::Completed { .. } | LogsStreamState::Error { .. })
    }
}
