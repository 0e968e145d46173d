use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

use crate::capture::source::{FrameSource, FrameSourceProvider};
use crate::common::RawFrame;
use crate::error::{FrameError, SessionError};

/// Generates flat gray frames at a fixed rate. Stands in for a camera when no
/// frames directory is configured.
#[derive(Debug, Clone)]
pub struct SyntheticSourceProvider {
    width: u32,
    height: u32,
    interval: Duration,
    limit: Option<u64>,
}

impl SyntheticSourceProvider {
    pub fn new(width: u32, height: u32, interval: Duration) -> Self {
        Self {
            width,
            height,
            interval,
            limit: None,
        }
    }

    /// Ends the stream after `limit` frames.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl FrameSourceProvider for SyntheticSourceProvider {
    fn open(&self) -> Result<Box<dyn FrameSource>, SessionError> {
        if self.width == 0 || self.height == 0 {
            return Err(SessionError::DeviceUnavailable(format!(
                "synthetic source has no pixels ({}x{})",
                self.width, self.height
            )));
        }
        Ok(Box::new(SyntheticSource {
            width: self.width,
            height: self.height,
            interval: self.interval.max(Duration::from_millis(1)),
            ticker: None,
            limit: self.limit,
            sequence: 0,
        }))
    }

    fn describe(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}

struct SyntheticSource {
    width: u32,
    height: u32,
    interval: Duration,
    // Created on the first read, inside the runtime
    ticker: Option<Interval>,
    limit: Option<u64>,
    sequence: u64,
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn next_frame(&mut self) -> Result<RawFrame, FrameError> {
        if self.limit.is_some_and(|limit| self.sequence >= limit) {
            return Err(FrameError::EndOfStream);
        }
        let interval = self.interval;
        self.ticker
            .get_or_insert_with(|| {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker
            })
            .tick()
            .await;
        let shade = (self.sequence % 64) as u8 + 96;
        let image = RgbImage::from_pixel(self.width, self.height, Rgb([shade, shade, shade]));
        let frame = RawFrame::new(self.sequence, image);
        self.sequence += 1;
        Ok(frame)
    }

    fn release(self: Box<Self>) {
        debug!(frames = self.sequence, "Synthetic source released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn produces_frames_until_the_limit() {
        let provider =
            SyntheticSourceProvider::new(8, 6, Duration::from_millis(1)).with_limit(3);
        let mut source = provider.open().unwrap();
        for expected in 0..3 {
            let frame = source.next_frame().await.unwrap();
            assert_eq!(frame.sequence(), expected);
            assert_eq!(frame.image().dimensions(), (8, 6));
        }
        assert!(matches!(
            source.next_frame().await,
            Err(FrameError::EndOfStream)
        ));
        source.release();
    }

    #[tokio::test]
    async fn zero_sized_source_is_unavailable() {
        let provider = SyntheticSourceProvider::new(0, 6, Duration::from_millis(1));
        assert!(matches!(
            provider.open(),
            Err(SessionError::DeviceUnavailable(_))
        ));
    }
}
