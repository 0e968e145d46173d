use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::common::{GestureResult, Mode, NO_GESTURE};
use crate::session::buffer::TemporalBuffer;
use crate::session::display::DisplayGate;

/// Everything the capture loop and the command handlers share. Only ever
/// touched through the controller's mutex.
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) mode: Mode,
    pub(crate) buffer: TemporalBuffer,
    pub(crate) last_result: Option<GestureResult>,
    pub(crate) streaming: bool,
    /// Id of the current (or most recent) session, 0 before the first start.
    pub(crate) session: u64,
    /// Bumped on every mode switch and stop. Per-frame work started under an
    /// older epoch is not allowed to commit.
    pub(crate) epoch: u64,
    pub(crate) consecutive_failures: u32,
    /// Cancelled when the current session stops.
    pub(crate) cancel: CancellationToken,
}

/// What a processed frame publishes.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub label: String,
    pub overlay: Option<String>,
}

impl Publication {
    pub fn none() -> Self {
        Self {
            label: NO_GESTURE.to_string(),
            overlay: None,
        }
    }
}

impl SessionState {
    pub(crate) fn new(window_length: usize) -> Self {
        Self {
            mode: Mode::default(),
            buffer: TemporalBuffer::new(window_length),
            last_result: None,
            streaming: false,
            session: 0,
            epoch: 0,
            consecutive_failures: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn begin(&mut self, session: u64, cancel: CancellationToken) {
        self.session = session;
        self.cancel = cancel;
        self.streaming = true;
        self.mode = Mode::default();
        self.epoch += 1;
        self.clear_progress();
    }

    pub(crate) fn end(&mut self) {
        self.streaming = false;
        self.cancel.cancel();
        self.epoch += 1;
        self.clear_progress();
    }

    /// Mode, buffer and last result change together.
    pub(crate) fn switch_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.epoch += 1;
        self.buffer.clear();
        self.last_result = None;
    }

    pub(crate) fn accepts(&self, session: u64) -> bool {
        self.streaming && self.session == session
    }

    fn clear_progress(&mut self) {
        self.buffer.clear();
        self.last_result = None;
        self.consecutive_failures = 0;
    }

    /// Label and overlay derived from the last confirmed gesture. An expired
    /// gesture is dropped here, so it can never come back.
    pub(crate) fn display(&mut self, gate: &DisplayGate, now: Instant) -> Publication {
        if self.mode != Mode::Dynamic {
            return Publication::none();
        }
        let shown = self
            .last_result
            .as_ref()
            .filter(|result| gate.is_open(result.confirmed_at(), now))
            .map(|result| Publication {
                label: result.label().to_string(),
                overlay: Some(result.overlay_text()),
            });
        if shown.is_none() {
            self.last_result = None;
        }
        shown.unwrap_or_else(Publication::none)
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session,
            mode: self.mode,
            streaming: self.streaming,
            buffered: self.buffer.len(),
            window_length: self.buffer.window_length(),
            last_gesture: self.last_result.as_ref().map(|r| r.label().to_string()),
            last_confidence: self.last_result.as_ref().map(|r| r.confidence()),
            last_confirmed_at: self.last_result.as_ref().map(|r| r.confirmed_wall()),
        }
    }
}

/// Point-in-time copy of the session state for queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session: u64,
    pub mode: Mode,
    pub streaming: bool,
    pub buffered: usize,
    pub window_length: usize,
    pub last_gesture: Option<String>,
    pub last_confidence: Option<f32>,
    /// Wall-clock time the displayed gesture was confirmed.
    pub last_confirmed_at: Option<DateTime<Utc>>,
}
