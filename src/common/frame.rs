use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;
use uuid::Uuid;

/// A frame as delivered by a frame source.
#[derive(Debug, Clone)]
pub struct RawFrame {
    id: Uuid,
    sequence: u64,
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
}

impl RawFrame {
    pub fn new(sequence: u64, image: RgbImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            image: Arc::new(image),
            captured_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Position of the frame in its source, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn image(&self) -> &Arc<RgbImage> {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn mirrored(self) -> Self {
        let flipped = image::imageops::flip_horizontal(self.image.as_ref());
        Self {
            image: Arc::new(flipped),
            ..self
        }
    }
}

/// JPEG-encoded annotated frame ready for transport. `overlay` is the text
/// already rendered into the image, if any.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub overlay: Option<String>,
    pub jpeg: Bytes,
}
