use serde::Serialize;

use crate::common::Mode;

/// Observability events raised by the session controller and the capture loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started { session: u64 },
    ModeChanged { mode: Mode },
    GestureConfirmed { label: String, confidence: f32 },
    /// A dynamic window scored below the threshold; the prior gesture stays.
    LowConfidenceRejected { label: String, confidence: f32 },
    DegradedSignal { reason: String },
    EndOfStream { session: u64, reason: String },
    Stopped { session: u64 },
}
