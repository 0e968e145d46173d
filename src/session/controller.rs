use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{EndReason, FrameSource, FrameSourceProvider};
use crate::common::{GestureResult, KeypointSet, Mode, Prediction, Window};
use crate::config::SessionSettings;
use crate::error::{PipelineError, SessionError};
use crate::session::display::{Clock, DisplayGate};
use crate::session::events::SessionEvent;
use crate::session::state::{Publication, SessionSnapshot, SessionState};

const EVENT_CAPACITY: usize = 64;

/// Identifies one capture session. Handed to the capture loop on start; a
/// ticket from a stopped session is never accepted again.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    id: u64,
    cancel: CancellationToken,
}

impl SessionTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the session is stopped.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Work a frame needs after the state has been advanced.
pub(crate) enum Work {
    Idle,
    Static(KeypointSet),
    Window(Window),
}

pub(crate) struct FramePlan {
    pub(crate) epoch: u64,
    pub(crate) work: Work,
}

pub(crate) enum Classified {
    Nothing,
    Static(Result<Prediction, PipelineError>),
    Dynamic(Result<Prediction, PipelineError>),
}

/// Owns the session state. Commands (`start`, `stop`, `set_mode`) may come
/// from any task; the per-frame transitions are driven by the single
/// `FrameProcessor` of the running session.
///
/// Every method takes the state lock exactly once and never across an await,
/// so each command is atomic with respect to each phase of a frame. A mode
/// switch or stop that lands while a frame is being classified bumps the
/// epoch, and the frame's result is then discarded instead of committed.
pub struct SessionController {
    state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    gate: DisplayGate,
    confidence_threshold: f32,
    degraded_after: u32,
    clock: Arc<dyn Clock>,
}

impl SessionController {
    pub fn new(settings: &SessionSettings, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(SessionState::new(settings.window_length)),
            events,
            gate: DisplayGate::new(settings.display_duration()),
            confidence_threshold: settings.confidence_threshold,
            degraded_after: settings.degraded_after_failures.max(1),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Acquires a frame source and begins a session in static mode. The
    /// source is returned to the caller, who becomes its only owner.
    pub fn start(
        &self,
        sources: &dyn FrameSourceProvider,
    ) -> Result<(SessionTicket, Box<dyn FrameSource>), SessionError> {
        if self.lock().streaming {
            return Err(SessionError::AlreadyStreaming);
        }

        // Opening a device can be slow, keep it outside the lock
        let source = sources.open()?;

        let mut state = self.lock();
        if state.streaming {
            drop(state);
            source.release();
            return Err(SessionError::AlreadyStreaming);
        }
        let id = state.session + 1;
        let cancel = CancellationToken::new();
        state.begin(id, cancel.clone());
        self.emit(SessionEvent::Started { session: id });
        drop(state);

        info!(session = id, source = %sources.describe(), "Session started");
        Ok((SessionTicket { id, cancel }, source))
    }

    /// Idempotent; stopping with no active session is a no-op.
    pub fn stop(&self) {
        let mut state = self.lock();
        if !state.streaming {
            debug!("Stop requested with no active session");
            return;
        }
        state.end();
        let session = state.session;
        self.emit(SessionEvent::Stopped { session });
        drop(state);
        info!(session, "Session stopped");
    }

    /// Replaces the mode and discards the in-progress window and the last
    /// confirmed gesture in one step. Allowed whether or not streaming.
    pub fn set_mode(&self, mode: Mode) {
        let mut state = self.lock();
        state.switch_mode(mode);
        let streaming = state.streaming;
        self.emit(SessionEvent::ModeChanged { mode });
        drop(state);
        info!(%mode, streaming, "[Mode] Switched mode");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().streaming
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Called by the capture loop once it has released its source. Marks the
    /// session stopped unless a `stop` (or a newer session) got there first.
    pub(crate) fn finish(&self, ticket: &SessionTicket, reason: &EndReason) {
        let mut state = self.lock();
        if !state.accepts(ticket.id) {
            return;
        }
        state.end();
        self.emit(SessionEvent::EndOfStream {
            session: ticket.id,
            reason: reason.to_string(),
        });
        drop(state);
        info!(session = ticket.id, %reason, "Session ended");
    }

    pub(crate) fn admit(&self, ticket: &SessionTicket) -> bool {
        !ticket.is_cancelled() && self.lock().accepts(ticket.id)
    }

    /// Records the extraction outcome and moves the frame's keypoints into
    /// the state. `None` when the session is no longer accepting frames.
    pub(crate) fn advance(
        &self,
        ticket: &SessionTicket,
        detection: Result<Option<KeypointSet>, PipelineError>,
    ) -> Option<FramePlan> {
        let mut state = self.lock();
        if !state.accepts(ticket.id) {
            return None;
        }

        let keypoints = match detection {
            Ok(keypoints) => {
                state.consecutive_failures = 0;
                keypoints
            }
            Err(e) => {
                state.consecutive_failures += 1;
                let failures = state.consecutive_failures;
                debug!(failures, "Treating frame as no detection: {}", e);
                if failures == self.degraded_after {
                    warn!(failures, "Landmark extraction keeps failing: {}", e);
                    self.emit(SessionEvent::DegradedSignal {
                        reason: format!(
                            "{} consecutive extraction failures, last: {}",
                            failures, e
                        ),
                    });
                }
                None
            }
        };

        let work = match (keypoints, state.mode) {
            (None, _) => Work::Idle,
            (Some(keypoints), Mode::Static) => Work::Static(keypoints),
            (Some(keypoints), Mode::Dynamic) => match state.buffer.push(keypoints) {
                Some(window) => Work::Window(window),
                None => Work::Idle,
            },
        };

        Some(FramePlan {
            epoch: state.epoch,
            work,
        })
    }

    /// Commits the classification (if still current) and decides what the
    /// frame publishes.
    pub(crate) fn settle(
        &self,
        ticket: &SessionTicket,
        epoch: u64,
        classified: Classified,
    ) -> Option<Publication> {
        let mut state = self.lock();
        if !state.accepts(ticket.id) {
            return None;
        }
        let now = self.clock.now();

        if state.epoch != epoch {
            debug!("Mode switched while the frame was in flight, discarding its result");
            return Some(state.display(&self.gate, now));
        }

        match classified {
            Classified::Nothing => {}
            Classified::Static(Ok(prediction)) => {
                debug!(
                    label = %prediction.label,
                    confidence = prediction.confidence,
                    "[Static] Predicted"
                );
                return Some(Publication {
                    label: prediction.label,
                    overlay: None,
                });
            }
            Classified::Dynamic(Ok(prediction)) => {
                if prediction.confidence >= self.confidence_threshold {
                    info!(
                        "[Dynamic] New prediction: {} ({:.1}%)",
                        prediction.label,
                        prediction.confidence * 100.0
                    );
                    self.emit(SessionEvent::GestureConfirmed {
                        label: prediction.label.clone(),
                        confidence: prediction.confidence,
                    });
                    state.last_result = Some(GestureResult::confirm(prediction, now));
                } else {
                    info!(
                        "[Dynamic] Low confidence: {} ({:.1}%)",
                        prediction.label,
                        prediction.confidence * 100.0
                    );
                    self.emit(SessionEvent::LowConfidenceRejected {
                        label: prediction.label,
                        confidence: prediction.confidence,
                    });
                }
            }
            Classified::Static(Err(e)) | Classified::Dynamic(Err(e)) => {
                warn!("Classification skipped: {}", e);
                self.emit(SessionEvent::DegradedSignal {
                    reason: e.to_string(),
                });
            }
        }

        Some(state.display(&self.gate, now))
    }
}
