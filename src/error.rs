use std::time::Duration;

use thiserror::Error;

// Main Application Error Type

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Session Error: {0}")]
    Session(#[from] SessionError),
    #[error("Pipeline Error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Configuration Error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to bind to {1}: {0}")]
    Bind(std::io::Error, String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors visible to whoever drives the session lifecycle.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Frame source unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("A capture session is already streaming")]
    AlreadyStreaming,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame source exhausted")]
    EndOfStream,
    #[error("Failed to read frame: {0}")]
    Read(String),
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// Failures of the landmark extractor or the classifiers. These never cross
/// the capture loop boundary.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Landmark extraction failed: {0}")]
    Extraction(String),
    #[error("Classification failed: {0}")]
    Classification(String),
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
    #[error("Invalid model: {0}")]
    Model(String),
}
