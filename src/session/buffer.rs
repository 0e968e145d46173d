use crate::common::{KeypointSet, Window};

/// Fixed-length FIFO accumulator for dynamic mode. A full window is handed out
/// whole and the buffer starts over empty; consecutive windows never overlap.
#[derive(Debug)]
pub struct TemporalBuffer {
    frames: Vec<KeypointSet>,
    window_length: usize,
}

impl TemporalBuffer {
    pub fn new(window_length: usize) -> Self {
        let window_length = window_length.max(1);
        Self {
            frames: Vec::with_capacity(window_length),
            window_length,
        }
    }

    /// Appends a keypoint set. Returns the window when this push completes it.
    pub fn push(&mut self, keypoints: KeypointSet) -> Option<Window> {
        self.frames.push(keypoints);
        if self.frames.len() < self.window_length {
            return None;
        }
        let frames = std::mem::replace(&mut self.frames, Vec::with_capacity(self.window_length));
        Some(Window::new(frames))
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }
}
