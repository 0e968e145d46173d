//! Hand landmark types shared by the extractor, the temporal buffer and the
//! classifiers.

use serde::{Deserialize, Serialize};

/// Landmarks tracked for a single hand.
pub const HAND_LANDMARKS: usize = 21;

/// Values per landmark in a flattened feature vector.
pub const LANDMARK_DIMENSIONS: usize = 3;

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

/// Hand skeleton connections for rendering
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (WRIST, THUMB_CMC),
    (THUMB_CMC, THUMB_MCP),
    (THUMB_MCP, THUMB_IP),
    (THUMB_IP, THUMB_TIP),
    (WRIST, INDEX_MCP),
    (INDEX_MCP, INDEX_PIP),
    (INDEX_PIP, INDEX_DIP),
    (INDEX_DIP, INDEX_TIP),
    (INDEX_MCP, MIDDLE_MCP),
    (MIDDLE_MCP, MIDDLE_PIP),
    (MIDDLE_PIP, MIDDLE_DIP),
    (MIDDLE_DIP, MIDDLE_TIP),
    (MIDDLE_MCP, RING_MCP),
    (RING_MCP, RING_PIP),
    (RING_PIP, RING_DIP),
    (RING_DIP, RING_TIP),
    (RING_MCP, PINKY_MCP),
    (WRIST, PINKY_MCP),
    (PINKY_MCP, PINKY_PIP),
    (PINKY_PIP, PINKY_DIP),
    (PINKY_DIP, PINKY_TIP),
];

/// A single landmark, x and y normalized to the image size, z relative depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Landmark {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// All landmarks of one detected hand in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointSet {
    landmarks: [Landmark; HAND_LANDMARKS],
}

impl KeypointSet {
    pub fn new(landmarks: [Landmark; HAND_LANDMARKS]) -> Self {
        Self { landmarks }
    }

    pub fn landmarks(&self) -> &[Landmark; HAND_LANDMARKS] {
        &self.landmarks
    }

    /// `[x0, y0, z0, x1, y1, z1, ...]`
    pub fn flatten(&self) -> Vec<f32> {
        let mut features = Vec::with_capacity(HAND_LANDMARKS * LANDMARK_DIMENSIONS);
        self.extend_features(&mut features);
        features
    }

    fn extend_features(&self, features: &mut Vec<f32>) {
        for landmark in &self.landmarks {
            features.extend_from_slice(&[landmark.x, landmark.y, landmark.z]);
        }
    }
}

impl TryFrom<Vec<[f32; 3]>> for KeypointSet {
    type Error = usize;

    /// Fails with the number of points received when it is not exactly 21.
    fn try_from(points: Vec<[f32; 3]>) -> Result<Self, Self::Error> {
        let count = points.len();
        let landmarks: Vec<Landmark> = points.into_iter().map(Landmark::from).collect();
        let landmarks: [Landmark; HAND_LANDMARKS] = landmarks.try_into().map_err(|_| count)?;
        Ok(Self { landmarks })
    }
}

/// A complete, ordered classification window of keypoint sets.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    frames: Vec<KeypointSet>,
}

impl Window {
    pub(crate) fn new(frames: Vec<KeypointSet>) -> Self {
        Self { frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[KeypointSet] {
        &self.frames
    }

    /// Frame-major concatenation of every keypoint set's features.
    pub fn flatten(&self) -> Vec<f32> {
        let mut features =
            Vec::with_capacity(self.frames.len() * HAND_LANDMARKS * LANDMARK_DIMENSIONS);
        for frame in &self.frames {
            frame.extend_features(&mut features);
        }
        features
    }
}
