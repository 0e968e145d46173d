use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbImage;
use tracing::trace;

use crate::common::RawFrame;
use crate::pipeline::Inference;
use crate::pipeline::annotate::draw_hand;
use crate::session::controller::{Classified, SessionController, SessionTicket, Work};

/// One processed frame, ready to be published.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    /// Annotated with the hand skeleton when a hand was detected.
    pub image: Arc<RgbImage>,
    pub label: String,
    pub overlay: Option<String>,
}

/// Runs the per-frame transition for one session. Owned by the capture loop,
/// so `step` is never called concurrently with itself.
pub struct FrameProcessor {
    controller: Arc<SessionController>,
    ticket: SessionTicket,
    inference: Inference,
}

impl FrameProcessor {
    pub fn new(
        controller: Arc<SessionController>,
        ticket: SessionTicket,
        inference: Inference,
    ) -> Self {
        Self {
            controller,
            ticket,
            inference,
        }
    }

    pub fn ticket(&self) -> &SessionTicket {
        &self.ticket
    }

    pub fn controller(&self) -> &Arc<SessionController> {
        &self.controller
    }

    /// Processes one frame. Returns `None` once the session has stopped, in
    /// which case nothing about the frame was recorded.
    pub async fn step(&mut self, frame: RawFrame) -> Option<FrameOutput> {
        if !self.controller.admit(&self.ticket) {
            return None;
        }

        let sequence = frame.sequence();
        let captured_at = frame.captured_at();
        let image = Arc::clone(frame.image());

        let detection = self.inference.extract(frame).await;
        let image = match &detection {
            Ok(Some(keypoints)) => Arc::new(draw_hand(&image, keypoints)),
            _ => image,
        };

        let plan = self.controller.advance(&self.ticket, detection)?;
        let classified = match plan.work {
            Work::Idle => Classified::Nothing,
            Work::Static(keypoints) => {
                Classified::Static(self.inference.classify_static(keypoints).await)
            }
            Work::Window(window) => {
                trace!(sequence, frames = window.len(), "Classifying window");
                Classified::Dynamic(self.inference.classify_window(window).await)
            }
        };

        let publication = self.controller.settle(&self.ticket, plan.epoch, classified)?;
        Some(FrameOutput {
            sequence,
            captured_at,
            image,
            label: publication.label,
            overlay: publication.overlay,
        })
    }
}
