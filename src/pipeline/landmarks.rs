use std::path::Path;

use async_trait::async_trait;

use crate::common::{KeypointSet, RawFrame};
use crate::error::PipelineError;

/// Maps a frame to at most one hand's keypoints.
#[async_trait]
pub trait LandmarkExtractor: Send + Sync {
    async fn extract(&self, frame: &RawFrame) -> Result<Option<KeypointSet>, PipelineError>;
}

/// Replays a recorded landmark track. Each line of the track is either `null`
/// (no hand) or an array of 21 `[x, y, z]` triples. Frame `n` gets line
/// `n % len`, so a looping frame source keeps lining up with its track.
#[derive(Debug, Clone)]
pub struct ReplayLandmarkExtractor {
    track: Vec<Option<KeypointSet>>,
}

impl ReplayLandmarkExtractor {
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Model(format!(
                "failed to read landmark track '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, PipelineError> {
        let mut track = Vec::new();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let points: Option<Vec<[f32; 3]>> = serde_json::from_str(line).map_err(|e| {
                PipelineError::Model(format!("landmark track line {}: {}", index + 1, e))
            })?;
            let keypoints = points
                .map(KeypointSet::try_from)
                .transpose()
                .map_err(|count| {
                    PipelineError::Model(format!(
                        "landmark track line {}: expected 21 points, got {}",
                        index + 1,
                        count
                    ))
                })?;
            track.push(keypoints);
        }
        if track.is_empty() {
            return Err(PipelineError::Model("landmark track is empty".to_string()));
        }
        Ok(Self { track })
    }

    pub fn len(&self) -> usize {
        self.track.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track.is_empty()
    }
}

#[async_trait]
impl LandmarkExtractor for ReplayLandmarkExtractor {
    async fn extract(&self, frame: &RawFrame) -> Result<Option<KeypointSet>, PipelineError> {
        let index = (frame.sequence() % self.track.len() as u64) as usize;
        Ok(self.track[index].clone())
    }
}
