use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Published when there is no gesture to display. Subscribers always receive
/// a label per frame, so silence never has to be interpreted.
pub const NO_GESTURE: &str = "--";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One classification per frame, no confidence gate.
    #[default]
    Static,
    /// One classification per full temporal window, confidence gated.
    Dynamic,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Static => "static",
            Mode::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top label and its probability as reported by a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Picks the most probable label. `None` when there is nothing to pick
    /// from or the two slices disagree in length.
    pub fn argmax(labels: &[String], probabilities: &[f32]) -> Option<Self> {
        if labels.is_empty() || labels.len() != probabilities.len() {
            return None;
        }
        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, p)| {
                if p > best.1 { (i, p) } else { best }
            });
        Some(Self::new(labels[index].clone(), confidence))
    }
}

/// A dynamic gesture that passed the confidence gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GestureResult {
    label: String,
    confidence: f32,
    confirmed_at: Instant,
    confirmed_wall: DateTime<Utc>,
}

impl GestureResult {
    pub fn confirm(prediction: Prediction, confirmed_at: Instant) -> Self {
        Self {
            label: prediction.label,
            confidence: prediction.confidence.clamp(0.0, 1.0),
            confirmed_at,
            confirmed_wall: Utc::now(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn confirmed_at(&self) -> Instant {
        self.confirmed_at
    }

    pub fn confirmed_wall(&self) -> DateTime<Utc> {
        self.confirmed_wall
    }

    pub fn overlay_text(&self) -> String {
        format!("Gesture: {} ({:.1}%)", self.label, self.confidence * 100.0)
    }
}

/// Wire form of a published label. The overlay text rides along while a
/// dynamic gesture is displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEvent {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<String>,
}
