use std::future::Future;
use std::io::Cursor;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use tokio::sync::broadcast;
use tower::Service;
use tracing::warn;

use crate::common::{EncodedFrame, LabelEvent};
use crate::error::FrameError;
use crate::pipeline::annotate::draw_overlay;
use crate::session::FrameOutput;

/// Fans a processed frame out to label and video subscribers. Both channels
/// are broadcast channels: a lagging subscriber loses its oldest items and
/// the capture loop never waits on anyone.
#[derive(Clone)]
pub struct FramePublishingService {
    label_tx: broadcast::Sender<LabelEvent>,
    frame_tx: broadcast::Sender<EncodedFrame>,
    jpeg_quality: u8,
}

impl FramePublishingService {
    pub fn new(label_capacity: usize, frame_capacity: usize, jpeg_quality: u8) -> Self {
        let (label_tx, _) = broadcast::channel(label_capacity.max(1));
        let (frame_tx, _) = broadcast::channel(frame_capacity.max(1));
        Self {
            label_tx,
            frame_tx,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn subscribe_labels(&self) -> broadcast::Receiver<LabelEvent> {
        self.label_tx.subscribe()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<EncodedFrame> {
        self.frame_tx.subscribe()
    }

    fn publish(&self, output: FrameOutput) -> Result<(), FrameError> {
        let _ = self.label_tx.send(LabelEvent {
            label: output.label,
            overlay: output.overlay.clone(),
        });

        // Encoding is the expensive part, skip it when nobody watches
        if self.frame_tx.receiver_count() == 0 {
            return Ok(());
        }
        let jpeg = match &output.overlay {
            Some(text) => {
                let mut image = output.image.as_ref().clone();
                draw_overlay(&mut image, text);
                encode_jpeg(&image, self.jpeg_quality)?
            }
            None => encode_jpeg(&output.image, self.jpeg_quality)?,
        };
        let _ = self.frame_tx.send(EncodedFrame {
            sequence: output.sequence,
            captured_at: output.captured_at,
            overlay: output.overlay,
            jpeg,
        });
        Ok(())
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Bytes, FrameError> {
    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(image)?;
    Ok(Bytes::from(buffer.into_inner()))
}

impl Service<FrameOutput> for FramePublishingService {
    type Response = ();
    type Error = FrameError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, output: FrameOutput) -> Self::Future {
        let sequence = output.sequence;
        let result = self.publish(output);
        if let Err(e) = &result {
            warn!(sequence, "Dropping frame from the video stream: {}", e);
        }
        Box::pin(async move { result })
    }
}
