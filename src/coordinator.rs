use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::{
    capture::{CaptureLoop, EndReason, FrameSourceProvider},
    common::{EncodedFrame, KeypointSet, LabelEvent, Mode, Window},
    config::Settings,
    error::{AppError, SessionError},
    pipeline::{FramePublishingService, GestureClassifier, Inference, LandmarkExtractor},
    session::{Clock, FrameProcessor, SessionController, SessionEvent, SessionSnapshot, SystemClock},
};

/// Owns the session controller and everything a capture session needs, and
/// runs each session's capture loop on its own task.
pub struct Coordinator {
    settings: Settings,
    controller: Arc<SessionController>,
    sources: Arc<dyn FrameSourceProvider>,
    extractor: Arc<dyn LandmarkExtractor>,
    static_classifier: Arc<dyn GestureClassifier<KeypointSet>>,
    dynamic_classifier: Arc<dyn GestureClassifier<Window>>,
    publisher: FramePublishingService,
    capture_tasks: Mutex<Vec<JoinHandle<EndReason>>>,
}

impl Coordinator {
    /// Opens the frame source and spawns the capture loop. Returns the id of
    /// the new session.
    pub fn start_session(&self) -> Result<u64, SessionError> {
        let (ticket, source) = self.controller.start(self.sources.as_ref())?;
        let id = ticket.id();

        let inference = Inference::new(
            self.extractor.clone(),
            self.static_classifier.clone(),
            self.dynamic_classifier.clone(),
            &self.settings.session,
        );
        let processor = FrameProcessor::new(self.controller.clone(), ticket.clone(), inference);
        let capture = CaptureLoop::new(
            source,
            processor,
            self.publisher.clone(),
            self.settings.capture.mirror,
        );
        let controller = self.controller.clone();
        let task = tokio::spawn(async move {
            match tokio::spawn(capture.run()).await {
                Ok(reason) => reason,
                Err(e) => {
                    // The loop died before it could end the session itself
                    let reason = if e.is_panic() {
                        EndReason::from_panic(e.into_panic().as_ref())
                    } else {
                        EndReason::Aborted(e.to_string())
                    };
                    tracing::error!(session = ticket.id(), %reason, "Capture task failed");
                    controller.finish(&ticket, &reason);
                    reason
                }
            }
        });

        let mut tasks = self.capture_tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
        Ok(id)
    }

    pub fn stop_session(&self) {
        self.controller.stop();
    }

    pub fn set_mode(&self, mode: Mode) {
        self.controller.set_mode(mode);
    }

    pub fn status(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub fn is_streaming(&self) -> bool {
        self.controller.is_streaming()
    }

    pub fn subscribe_labels(&self) -> broadcast::Receiver<LabelEvent> {
        self.publisher.subscribe_labels()
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<EncodedFrame> {
        self.publisher.subscribe_frames()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.controller.subscribe()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Stops the running session and waits for every capture loop to release
    /// its source.
    pub async fn shutdown(&self) {
        self.controller.stop();
        let tasks: Vec<_> = self
            .capture_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            match task.await {
                Ok(reason) => tracing::debug!(%reason, "Capture task joined"),
                Err(e) => tracing::error!("Capture task failed: {}", e),
            }
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.controller.stop();
    }
}

pub struct CoordinatorBuilder {
    settings: Settings,
    sources: Option<Arc<dyn FrameSourceProvider>>,
    extractor: Option<Arc<dyn LandmarkExtractor>>,
    static_classifier: Option<Arc<dyn GestureClassifier<KeypointSet>>>,
    dynamic_classifier: Option<Arc<dyn GestureClassifier<Window>>>,
    clock: Arc<dyn Clock>,
}

impl CoordinatorBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            sources: None,
            extractor: None,
            static_classifier: None,
            dynamic_classifier: None,
            clock: Arc::new(SystemClock),
        }
    }

    // Overrides the configured window length.
    pub fn window_length(mut self, window_length: usize) -> Self {
        self.settings.session.window_length = window_length;
        self
    }

    // Overrides the configured confidence threshold.
    pub fn confidence_threshold(mut self, confidence_threshold: f32) -> Self {
        self.settings.session.confidence_threshold = confidence_threshold;
        self
    }

    pub fn source_provider(mut self, sources: Arc<dyn FrameSourceProvider>) -> Self {
        self.sources = Some(sources);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn LandmarkExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn static_classifier(
        mut self,
        classifier: Arc<dyn GestureClassifier<KeypointSet>>,
    ) -> Self {
        self.static_classifier = Some(classifier);
        self
    }

    pub fn dynamic_classifier(mut self, classifier: Arc<dyn GestureClassifier<Window>>) -> Self {
        self.dynamic_classifier = Some(classifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<Coordinator, AppError> {
        self.settings.validate().map_err(AppError::InvalidConfig)?;
        let sources = self
            .sources
            .ok_or(AppError::InvalidConfig("Frame source provider not set".to_string()))?;
        let extractor = self
            .extractor
            .ok_or(AppError::InvalidConfig("Landmark extractor not set".to_string()))?;
        let static_classifier = self
            .static_classifier
            .ok_or(AppError::InvalidConfig("Static classifier not set".to_string()))?;
        let dynamic_classifier = self
            .dynamic_classifier
            .ok_or(AppError::InvalidConfig("Dynamic classifier not set".to_string()))?;

        let server = &self.settings.server;
        let publisher = FramePublishingService::new(
            server.label_capacity,
            server.frame_capacity,
            server.jpeg_quality,
        );
        let controller = Arc::new(SessionController::new(&self.settings.session, self.clock));

        Ok(Coordinator {
            settings: self.settings,
            controller,
            sources,
            extractor,
            static_classifier,
            dynamic_classifier,
            publisher,
            capture_tasks: Mutex::new(Vec::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        CountingSourceProvider, FixedClassifier, ScriptedExtractor, UnavailableSourceProvider,
    };
    use std::sync::atomic::Ordering;

    fn builder(sources: Arc<dyn FrameSourceProvider>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(Settings::default())
            .source_provider(sources)
            .extractor(Arc::new(ScriptedExtractor::always_hand()))
            .static_classifier(Arc::new(FixedClassifier::new("5", 0.92)))
            .dynamic_classifier(Arc::new(FixedClassifier::new("hello", 0.85)))
    }

    #[tokio::test]
    async fn test_coordinator() {
        let provider = Arc::new(CountingSourceProvider::new(None));
        let coordinator = builder(provider.clone())
            .window_length(10)
            .build()
            .expect("Failed to build coordinator");
        let mut labels = coordinator.subscribe_labels();

        let session = coordinator.start_session().expect("session starts");
        assert_eq!(session, 1);
        assert!(matches!(
            coordinator.start_session(),
            Err(SessionError::AlreadyStreaming)
        ));
        assert_eq!(labels.recv().await.unwrap().label, "5");

        coordinator.set_mode(Mode::Dynamic);
        assert_eq!(coordinator.status().mode, Mode::Dynamic);
        assert_eq!(coordinator.status().window_length, 10);

        coordinator.shutdown().await;
        assert!(!coordinator.is_streaming());
        assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sessions_can_be_restarted_after_stop() {
        let provider = Arc::new(CountingSourceProvider::new(None));
        let coordinator = builder(provider.clone()).build().unwrap();

        assert_eq!(coordinator.start_session().unwrap(), 1);
        coordinator.stop_session();
        assert_eq!(coordinator.start_session().unwrap(), 2);
        assert_eq!(coordinator.status().mode, Mode::Static);

        coordinator.shutdown().await;
        assert_eq!(provider.released.load(Ordering::SeqCst), 2);
    }

    async fn wait_until_idle(coordinator: &Coordinator) {
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while coordinator.is_streaming() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("session ends on its own");
    }

    #[tokio::test]
    async fn panicking_extractor_does_not_wedge_the_session() {
        let provider = Arc::new(CountingSourceProvider::new(None));
        let coordinator = builder(provider.clone())
            .extractor(Arc::new(ScriptedExtractor::panicking()))
            .build()
            .unwrap();

        assert_eq!(coordinator.start_session().unwrap(), 1);
        wait_until_idle(&coordinator).await;
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);

        assert_eq!(coordinator.start_session().unwrap(), 2);
        coordinator.shutdown().await;
        assert_eq!(provider.released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panic_outside_the_frame_loop_still_ends_the_session() {
        let provider = Arc::new(CountingSourceProvider::new(Some(3)).panicking_on_release());
        let coordinator = builder(provider.clone()).build().unwrap();
        let mut events = coordinator.subscribe_events();

        assert_eq!(coordinator.start_session().unwrap(), 1);
        wait_until_idle(&coordinator).await;
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
        let mut reasons = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::EndOfStream { reason, .. } = event {
                reasons.push(reason);
            }
        }
        assert_eq!(reasons, ["aborted: device driver crashed on close"]);

        assert_eq!(coordinator.start_session().unwrap(), 2);
        coordinator.shutdown().await;
    }

    #[tokio::test]
    async fn unavailable_device_is_reported() {
        let coordinator = builder(Arc::new(UnavailableSourceProvider)).build().unwrap();
        assert!(matches!(
            coordinator.start_session(),
            Err(SessionError::DeviceUnavailable(_))
        ));
        assert!(!coordinator.is_streaming());
    }

    #[test]
    fn build_requires_every_collaborator() {
        let result = CoordinatorBuilder::new(Settings::default())
            .source_provider(Arc::new(CountingSourceProvider::new(None)))
            .build();
        assert!(matches!(result, Err(AppError::InvalidConfig(_))));

        let result = builder(Arc::new(CountingSourceProvider::new(None)))
            .confidence_threshold(2.0)
            .build();
        assert!(matches!(result, Err(AppError::InvalidConfig(_))));
    }
}
