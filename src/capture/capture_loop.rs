use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tower::{Service, ServiceExt};
use tracing::{debug, error, info, warn};

use crate::capture::source::FrameSource;
use crate::error::FrameError;
use crate::pipeline::FramePublishingService;
use crate::session::FrameProcessor;

/// Why a capture loop exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    Stopped,
    EndOfStream,
    ReadFailure(String),
    /// The source or the frame pipeline panicked.
    Aborted(String),
}

impl EndReason {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        EndReason::Aborted(message)
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Stopped => write!(f, "stopped"),
            EndReason::EndOfStream => write!(f, "end of stream"),
            EndReason::ReadFailure(e) => write!(f, "read failure: {}", e),
            EndReason::Aborted(e) => write!(f, "aborted: {}", e),
        }
    }
}

/// The only place `step` is called from. Pulls frames until the session is
/// stopped or the source runs dry, then releases the source. A panic while
/// reading or processing a frame ends the session the same way.
pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    processor: FrameProcessor,
    publisher: FramePublishingService,
    mirror: bool,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        processor: FrameProcessor,
        publisher: FramePublishingService,
        mirror: bool,
    ) -> Self {
        Self {
            source,
            processor,
            publisher,
            mirror,
        }
    }

    pub async fn run(self) -> EndReason {
        let CaptureLoop {
            mut source,
            mut processor,
            mut publisher,
            mirror,
        } = self;
        let ticket = processor.ticket().clone();
        info!(session = ticket.id(), "Capture loop running");

        let reason = loop {
            let next = tokio::select! {
                biased;
                _ = ticket.cancelled() => break EndReason::Stopped,
                next = AssertUnwindSafe(source.next_frame()).catch_unwind() => next,
            };
            let frame = match next {
                Ok(Ok(frame)) => frame,
                Ok(Err(FrameError::EndOfStream)) => break EndReason::EndOfStream,
                Ok(Err(e)) => {
                    warn!(session = ticket.id(), "Frame source failed, ending session: {}", e);
                    break EndReason::ReadFailure(e.to_string());
                }
                Err(panic) => break EndReason::from_panic(panic.as_ref()),
            };
            let frame = if mirror { frame.mirrored() } else { frame };

            let output = match AssertUnwindSafe(processor.step(frame)).catch_unwind().await {
                Ok(Some(output)) => output,
                Ok(None) => break EndReason::Stopped,
                Err(panic) => break EndReason::from_panic(panic.as_ref()),
            };
            let published = match publisher.ready().await {
                Ok(publisher) => publisher.call(output).await,
                Err(e) => Err(e),
            };
            if let Err(e) = published {
                debug!("Frame not published: {}", e);
            }
        };
        if let EndReason::Aborted(e) = &reason {
            error!(session = ticket.id(), "Capture loop panicked: {}", e);
        }

        source.release();
        processor.controller().finish(&ticket, &reason);
        info!(session = ticket.id(), %reason, "Capture loop exited");
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FrameSourceProvider;
    use crate::common::RawFrame;
    use crate::config::SessionSettings;
    use crate::pipeline::Inference;
    use crate::session::{SessionController, SessionEvent, SystemClock};
    use crate::test_support::{CountingSourceProvider, FixedClassifier, ScriptedExtractor};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn inference() -> Inference {
        Inference::new(
            Arc::new(ScriptedExtractor::always_hand()),
            Arc::new(FixedClassifier::new("5", 0.92)),
            Arc::new(FixedClassifier::new("hello", 0.85)),
            &SessionSettings::default(),
        )
    }

    fn start(
        controller: &Arc<SessionController>,
        provider: &dyn FrameSourceProvider,
        publisher: FramePublishingService,
    ) -> CaptureLoop {
        let (ticket, source) = controller.start(provider).unwrap();
        let processor = FrameProcessor::new(controller.clone(), ticket, inference());
        CaptureLoop::new(source, processor, publisher, true)
    }

    fn controller() -> Arc<SessionController> {
        Arc::new(SessionController::new(
            &SessionSettings::default(),
            Arc::new(SystemClock),
        ))
    }

    #[tokio::test]
    async fn finite_source_ends_the_session_and_is_released_once() {
        let controller = controller();
        let provider = CountingSourceProvider::new(Some(5));
        let publisher = FramePublishingService::new(16, 1, 80);
        let mut labels = publisher.subscribe_labels();
        let mut events = controller.subscribe();

        let reason = start(&controller, &provider, publisher).run().await;

        assert_eq!(reason, EndReason::EndOfStream);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
        assert!(!controller.is_streaming());
        for _ in 0..5 {
            assert_eq!(labels.recv().await.unwrap().label, "5");
        }
        assert!(labels.try_recv().is_err());

        let mut ended = false;
        while let Ok(event) = events.try_recv() {
            ended |= matches!(event, SessionEvent::EndOfStream { .. });
        }
        assert!(ended);
    }

    #[tokio::test]
    async fn stop_ends_the_loop_without_end_of_stream() {
        let controller = controller();
        let provider = CountingSourceProvider::new(None);
        let publisher = FramePublishingService::new(16, 1, 80);
        let mut labels = publisher.subscribe_labels();
        let capture = tokio::spawn(start(&controller, &provider, publisher).run());

        let _ = labels.recv().await;
        let mut events = controller.subscribe();
        controller.stop();

        let reason = tokio::time::timeout(Duration::from_secs(2), capture)
            .await
            .expect("loop exits promptly")
            .unwrap();
        assert_eq!(reason, EndReason::Stopped);
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
        assert!(matches!(
            events.try_recv(),
            Ok(SessionEvent::Stopped { .. })
        ));
        assert!(events.try_recv().is_err());
    }

    struct BrokenSource {
        released: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FrameSource for BrokenSource {
        async fn next_frame(&mut self) -> Result<RawFrame, FrameError> {
            Err(FrameError::Read("cable unplugged".to_string()))
        }

        fn release(self: Box<Self>) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn read_failure_is_treated_as_end_of_stream() {
        let controller = controller();
        let provider = CountingSourceProvider::new(None);
        let (ticket, _counting) = controller.start(&provider).unwrap();
        let processor = FrameProcessor::new(controller.clone(), ticket, inference());
        let publisher = FramePublishingService::new(16, 1, 80);
        let mut labels = publisher.subscribe_labels();

        let released = Arc::new(AtomicUsize::new(0));
        let source = BrokenSource {
            released: released.clone(),
        };

        let reason = CaptureLoop::new(Box::new(source), processor, publisher, false)
            .run()
            .await;

        assert!(matches!(reason, EndReason::ReadFailure(ref e) if e.contains("cable unplugged")));
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(!controller.is_streaming());
        assert!(labels.try_recv().is_err());
    }

    #[tokio::test]
    async fn panicking_extractor_ends_the_session_and_releases_the_source() {
        let controller = controller();
        let provider = CountingSourceProvider::new(None);
        let (ticket, source) = controller.start(&provider).unwrap();
        let inference = Inference::new(
            Arc::new(ScriptedExtractor::panicking()),
            Arc::new(FixedClassifier::new("5", 0.92)),
            Arc::new(FixedClassifier::new("hello", 0.85)),
            &SessionSettings::default(),
        );
        let processor = FrameProcessor::new(controller.clone(), ticket, inference);
        let mut events = controller.subscribe();

        let publisher = FramePublishingService::new(4, 1, 80);
        let reason = CaptureLoop::new(source, processor, publisher, false).run().await;

        assert!(
            matches!(reason, EndReason::Aborted(ref e) if e.contains("landmark model crashed"))
        );
        assert_eq!(provider.released.load(Ordering::SeqCst), 1);
        assert!(!controller.is_streaming());
        let mut aborted = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::EndOfStream { reason, .. } = event {
                aborted |= reason.starts_with("aborted");
            }
        }
        assert!(aborted);
        assert!(controller.start(&provider).is_ok());
    }
}
