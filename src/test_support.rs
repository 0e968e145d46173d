//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::RgbImage;

use crate::capture::{FrameSource, FrameSourceProvider};
use crate::common::{HAND_LANDMARKS, KeypointSet, Landmark, Prediction, RawFrame, Window};
use crate::error::{FrameError, PipelineError, SessionError};
use crate::pipeline::{GestureClassifier, LandmarkExtractor};

/// A hand whose landmarks all sit at `(seed, seed / 2, 0)`.
pub fn hand(seed: f32) -> KeypointSet {
    KeypointSet::new([Landmark::new(seed, seed * 0.5, 0.0); HAND_LANDMARKS])
}

pub fn blank_frame(sequence: u64) -> RawFrame {
    RawFrame::new(sequence, RgbImage::new(16, 12))
}

enum Script {
    Hand,
    Failing,
    Panicking,
}

pub struct ScriptedExtractor {
    script: Script,
    hand_visible: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    /// Finds a hand in every frame until `set_hand(false)`.
    pub fn always_hand() -> Self {
        Self {
            script: Script::Hand,
            hand_visible: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            script: Script::Failing,
            hand_visible: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn panicking() -> Self {
        Self {
            script: Script::Panicking,
            hand_visible: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_hand(&self, visible: bool) {
        self.hand_visible.store(visible, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LandmarkExtractor for ScriptedExtractor {
    async fn extract(&self, frame: &RawFrame) -> Result<Option<KeypointSet>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Failing => Err(PipelineError::Extraction("no model loaded".to_string())),
            Script::Panicking => panic!("landmark model crashed"),
            Script::Hand if self.hand_visible.load(Ordering::SeqCst) => {
                Ok(Some(hand((frame.sequence() % 100) as f32 / 100.0)))
            }
            Script::Hand => Ok(None),
        }
    }
}

/// Returns the same prediction for any input until told otherwise.
pub struct FixedClassifier {
    prediction: Mutex<Prediction>,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(label: &str, confidence: f32) -> Self {
        Self {
            prediction: Mutex::new(Prediction::new(label, confidence)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, prediction: Prediction) {
        *self.prediction.lock().unwrap() = prediction;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn answer(&self) -> Result<Prediction, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.prediction.lock().unwrap().clone())
    }
}

#[async_trait]
impl GestureClassifier<KeypointSet> for FixedClassifier {
    async fn classify(&self, _input: &KeypointSet) -> Result<Prediction, PipelineError> {
        self.answer()
    }
}

#[async_trait]
impl GestureClassifier<Window> for FixedClassifier {
    async fn classify(&self, _input: &Window) -> Result<Prediction, PipelineError> {
        self.answer()
    }
}

/// Takes `delay` to answer.
pub struct SlowClassifier {
    delay: Duration,
}

impl SlowClassifier {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl GestureClassifier<KeypointSet> for SlowClassifier {
    async fn classify(&self, _input: &KeypointSet) -> Result<Prediction, PipelineError> {
        tokio::time::sleep(self.delay).await;
        Ok(Prediction::new("slow", 1.0))
    }
}

#[async_trait]
impl GestureClassifier<Window> for SlowClassifier {
    async fn classify(&self, _input: &Window) -> Result<Prediction, PipelineError> {
        tokio::time::sleep(self.delay).await;
        Ok(Prediction::new("slow", 1.0))
    }
}

/// Hands out blank frames without pacing and counts opens and releases.
pub struct CountingSourceProvider {
    limit: Option<u64>,
    panic_on_release: bool,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl CountingSourceProvider {
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            limit,
            panic_on_release: false,
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sources count the release and then panic.
    pub fn panicking_on_release(mut self) -> Self {
        self.panic_on_release = true;
        self
    }
}

impl FrameSourceProvider for CountingSourceProvider {
    fn open(&self) -> Result<Box<dyn FrameSource>, SessionError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSource {
            limit: self.limit,
            sequence: 0,
            panic_on_release: self.panic_on_release,
            released: self.released.clone(),
        }))
    }

    fn describe(&self) -> String {
        "counting test source".to_string()
    }
}

struct CountingSource {
    limit: Option<u64>,
    sequence: u64,
    panic_on_release: bool,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for CountingSource {
    async fn next_frame(&mut self) -> Result<RawFrame, FrameError> {
        let sequence = self.sequence;
        if self.limit.is_some_and(|limit| sequence >= limit) {
            return Err(FrameError::EndOfStream);
        }
        tokio::task::yield_now().await;
        self.sequence += 1;
        Ok(blank_frame(sequence))
    }

    fn release(self: Box<Self>) {
        self.released.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_release {
            panic!("device driver crashed on close");
        }
    }
}

pub struct UnavailableSourceProvider;

impl FrameSourceProvider for UnavailableSourceProvider {
    fn open(&self) -> Result<Box<dyn FrameSource>, SessionError> {
        Err(SessionError::DeviceUnavailable("no camera attached".to_string()))
    }

    fn describe(&self) -> String {
        "unavailable test source".to_string()
    }
}
