use std::sync::Arc;
use std::time::Duration;

use tower::timeout::TimeoutLayer;
use tower::timeout::error::Elapsed;
use tower::util::BoxService;
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};

use crate::common::{KeypointSet, Prediction, RawFrame, Window};
use crate::config::SessionSettings;
use crate::error::PipelineError;
use crate::pipeline::classifier::GestureClassifier;
use crate::pipeline::landmarks::LandmarkExtractor;
use crate::pipeline::services::{ClassificationService, ExtractionService};

/// The external collaborators of one capture session, each behind an
/// optional timeout. An elapsed timeout surfaces as `PipelineError::Timeout`.
pub struct Inference {
    extraction: BoxService<RawFrame, Option<KeypointSet>, BoxError>,
    static_classification: BoxService<KeypointSet, Prediction, BoxError>,
    dynamic_classification: BoxService<Window, Prediction, BoxError>,
    extractor_timeout: Option<Duration>,
    classifier_timeout: Option<Duration>,
}

impl Inference {
    pub fn new(
        extractor: Arc<dyn LandmarkExtractor>,
        static_classifier: Arc<dyn GestureClassifier<KeypointSet>>,
        dynamic_classifier: Arc<dyn GestureClassifier<Window>>,
        settings: &SessionSettings,
    ) -> Self {
        let extractor_timeout = settings.extractor_timeout();
        let classifier_timeout = settings.classifier_timeout();

        let extraction = ServiceBuilder::new()
            .option_layer(extractor_timeout.map(TimeoutLayer::new))
            .map_err(boxed)
            .service(ExtractionService::new(extractor));
        let static_classification = ServiceBuilder::new()
            .option_layer(classifier_timeout.map(TimeoutLayer::new))
            .map_err(boxed)
            .service(ClassificationService::new(static_classifier));
        let dynamic_classification = ServiceBuilder::new()
            .option_layer(classifier_timeout.map(TimeoutLayer::new))
            .map_err(boxed)
            .service(ClassificationService::new(dynamic_classifier));

        Self {
            extraction: BoxService::new(extraction),
            static_classification: BoxService::new(static_classification),
            dynamic_classification: BoxService::new(dynamic_classification),
            extractor_timeout,
            classifier_timeout,
        }
    }

    pub async fn extract(&mut self, frame: RawFrame) -> Result<Option<KeypointSet>, PipelineError> {
        let timeout = self.extractor_timeout;
        self.extraction
            .ready()
            .await
            .map_err(|e| into_pipeline_error(e, "landmark extraction", timeout))?
            .call(frame)
            .await
            .map_err(|e| into_pipeline_error(e, "landmark extraction", timeout))
    }

    pub async fn classify_static(
        &mut self,
        keypoints: KeypointSet,
    ) -> Result<Prediction, PipelineError> {
        let timeout = self.classifier_timeout;
        self.static_classification
            .ready()
            .await
            .map_err(|e| into_pipeline_error(e, "static classification", timeout))?
            .call(keypoints)
            .await
            .map_err(|e| into_pipeline_error(e, "static classification", timeout))
    }

    pub async fn classify_window(&mut self, window: Window) -> Result<Prediction, PipelineError> {
        let timeout = self.classifier_timeout;
        self.dynamic_classification
            .ready()
            .await
            .map_err(|e| into_pipeline_error(e, "dynamic classification", timeout))?
            .call(window)
            .await
            .map_err(|e| into_pipeline_error(e, "dynamic classification", timeout))
    }
}

fn boxed(error: PipelineError) -> BoxError {
    Box::new(error)
}

fn into_pipeline_error(
    error: BoxError,
    stage: &'static str,
    timeout: Option<Duration>,
) -> PipelineError {
    if error.is::<Elapsed>() {
        return PipelineError::Timeout(stage, timeout.unwrap_or_default());
    }
    match error.downcast::<PipelineError>() {
        Ok(error) => *error,
        Err(other) => PipelineError::Classification(format!("{}: {}", stage, other)),
    }
}
