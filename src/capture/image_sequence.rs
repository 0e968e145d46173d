use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::capture::source::{FrameSource, FrameSourceProvider};
use crate::common::RawFrame;
use crate::error::{FrameError, SessionError};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Plays back a directory of still images in file name order, paced at a
/// fixed frame rate.
#[derive(Debug, Clone)]
pub struct ImageSequenceProvider {
    directory: PathBuf,
    interval: Duration,
    looping: bool,
}

impl ImageSequenceProvider {
    pub fn new(directory: impl Into<PathBuf>, interval: Duration, looping: bool) -> Self {
        Self {
            directory: directory.into(),
            interval,
            looping,
        }
    }

    fn list_images(&self) -> Result<Vec<PathBuf>, SessionError> {
        let entries = std::fs::read_dir(&self.directory).map_err(|e| {
            SessionError::DeviceUnavailable(format!("{}: {}", self.directory.display(), e))
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_image(path))
            .collect();
        paths.sort();
        if paths.is_empty() {
            return Err(SessionError::DeviceUnavailable(format!(
                "no images in {}",
                self.directory.display()
            )));
        }
        Ok(paths)
    }
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
}

impl FrameSourceProvider for ImageSequenceProvider {
    fn open(&self) -> Result<Box<dyn FrameSource>, SessionError> {
        let paths = self.list_images()?;
        info!(
            directory = %self.directory.display(),
            images = paths.len(),
            "Opened image sequence"
        );
        Ok(Box::new(ImageSequenceSource {
            paths,
            position: 0,
            sequence: 0,
            looping: self.looping,
            interval: self.interval.max(Duration::from_millis(1)),
            ticker: None,
        }))
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.directory.display())
    }
}

struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
    sequence: u64,
    looping: bool,
    interval: Duration,
    ticker: Option<Interval>,
}

#[async_trait]
impl FrameSource for ImageSequenceSource {
    async fn next_frame(&mut self) -> Result<RawFrame, FrameError> {
        if self.position >= self.paths.len() {
            if !self.looping {
                return Err(FrameError::EndOfStream);
            }
            self.position = 0;
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

        let path = self.paths[self.position].clone();
        let image = tokio::task::spawn_blocking(move || {
            image::open(&path)
                .map(|image| image.to_rgb8())
                .map_err(|e| FrameError::Read(format!("{}: {}", path.display(), e)))
        })
        .await
        .map_err(|e| FrameError::Read(e.to_string()))??;

        let frame = RawFrame::new(self.sequence, image);
        self.position += 1;
        self.sequence += 1;
        Ok(frame)
    }

    fn release(self: Box<Self>) {
        debug!(frames = self.sequence, "Image sequence released");
    }
}
