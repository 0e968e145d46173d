use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use signstream::capture::{FrameSourceProvider, ImageSequenceProvider, SyntheticSourceProvider};
use signstream::common::keypoints::{HAND_LANDMARKS, LANDMARK_DIMENSIONS};
use signstream::config::Settings;
use signstream::coordinator::CoordinatorBuilder;
use signstream::error::AppError;
use signstream::network::{ControlServer, VideoServer};
use signstream::pipeline::{ReplayLandmarkExtractor, TemplateClassifier};
use tokio_util::sync::CancellationToken;
use tracing::Level;

fn init_logging(level: &str) {
    let level = Level::from_str(level).unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn source_provider(settings: &Settings) -> Arc<dyn FrameSourceProvider> {
    let capture = &settings.capture;
    match &capture.frames_dir {
        Some(directory) => Arc::new(ImageSequenceProvider::new(
            directory.clone(),
            capture.frame_interval(),
            capture.loop_frames,
        )),
        None => Arc::new(SyntheticSourceProvider::new(
            capture.width,
            capture.height,
            capture.frame_interval(),
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    init_logging(&settings.logging.level);

    let models = &settings.models;
    let extractor = ReplayLandmarkExtractor::from_path(&models.landmark_track)?;
    let static_classifier = Arc::new(TemplateClassifier::from_path(&models.static_model)?);
    let dynamic_classifier = Arc::new(TemplateClassifier::from_path(&models.dynamic_model)?);
    let window_features = settings.session.window_length * HAND_LANDMARKS * LANDMARK_DIMENSIONS;
    if dynamic_classifier.feature_len() != window_features {
        return Err(AppError::InvalidConfig(format!(
            "dynamic model expects {} features, a window of {} frames has {}",
            dynamic_classifier.feature_len(),
            settings.session.window_length,
            window_features
        )));
    }
    tracing::info!(
        static_labels = ?static_classifier.labels(),
        dynamic_labels = ?dynamic_classifier.labels(),
        track_frames = extractor.len(),
        "Models loaded"
    );

    let coordinator = Arc::new(
        CoordinatorBuilder::new(settings.clone())
            .source_provider(source_provider(&settings))
            .extractor(Arc::new(extractor))
            .static_classifier(static_classifier)
            .dynamic_classifier(dynamic_classifier)
            .build()?,
    );

    let server = &settings.server;
    let control =
        ControlServer::bind(&server.host, server.control_port, coordinator.clone()).await?;
    let video = VideoServer::bind(
        &server.host,
        server.video_port,
        coordinator.clone(),
        server.auto_start_on_view,
    )
    .await?;

    let cancel = CancellationToken::new();
    let control_task = tokio::spawn(control.serve(cancel.clone()));
    let video_task = tokio::spawn(video.serve(cancel.clone()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    cancel.cancel();
    coordinator.shutdown().await;
    for task in [control_task, video_task] {
        if let Err(e) = task.await {
            tracing::error!("Server task failed: {}", e);
        }
    }
    Ok(())
}
