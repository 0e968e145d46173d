use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_FILE: &str = "signstream.toml";
const ENV_PREFIX: &str = "SIGNSTREAM";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionSettings,
    pub capture: CaptureSettings,
    pub models: ModelSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
}

/// Tuning for the gesture session controller
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Number of keypoint sets in one dynamic classification window
    pub window_length: usize,
    /// Minimum dynamic confidence for a gesture to be confirmed
    pub confidence_threshold: f32,
    /// How long a confirmed dynamic gesture stays eligible for display
    pub display_duration_ms: u64,
    /// Consecutive extraction failures before a degraded signal is raised
    pub degraded_after_failures: u32,
    /// 0 disables the timeout
    pub classifier_timeout_ms: u64,
    /// 0 disables the timeout
    pub extractor_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            window_length: 50,
            confidence_threshold: 0.7,
            display_duration_ms: 2500,
            degraded_after_failures: 3,
            classifier_timeout_ms: 2000,
            extractor_timeout_ms: 2000,
        }
    }
}

impl SessionSettings {
    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_duration_ms)
    }

    pub fn classifier_timeout(&self) -> Option<Duration> {
        (self.classifier_timeout_ms > 0).then(|| Duration::from_millis(self.classifier_timeout_ms))
    }

    pub fn extractor_timeout(&self) -> Option<Duration> {
        (self.extractor_timeout_ms > 0).then(|| Duration::from_millis(self.extractor_timeout_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Directory of still images used as the frame device. When unset a
    /// synthetic source is used.
    pub frames_dir: Option<PathBuf>,
    pub frame_rate: u32,
    pub loop_frames: bool,
    /// Flip frames horizontally before processing (selfie view)
    pub mirror: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            frames_dir: None,
            frame_rate: 30,
            loop_frames: true,
            mirror: true,
            width: 640,
            height: 480,
        }
    }
}

impl CaptureSettings {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frame_rate.max(1)))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub static_model: PathBuf,
    pub dynamic_model: PathBuf,
    pub landmark_track: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            static_model: PathBuf::from("models/static_gestures.json"),
            dynamic_model: PathBuf::from("models/dynamic_gestures.json"),
            landmark_track: PathBuf::from("models/landmarks.jsonl"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub control_port: u16,
    pub video_port: u16,
    pub label_capacity: usize,
    pub frame_capacity: usize,
    pub jpeg_quality: u8,
    /// Start a session when a viewer opens the video feed
    pub auto_start_on_view: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            control_port: 3344,
            video_port: 3345,
            label_capacity: 64,
            frame_capacity: 2,
            jpeg_quality: 80,
            auto_start_on_view: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional TOML file, overridden by
    /// `SIGNSTREAM__SECTION__KEY` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        settings.validate().map_err(AppError::InvalidConfig)?;
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self, AppError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate().map_err(AppError::InvalidConfig)?;
        Ok(settings)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.session.window_length == 0 {
            return Err("Window length must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.session.confidence_threshold) {
            return Err("Confidence threshold must be between 0.0 and 1.0".to_string());
        }

        if self.session.degraded_after_failures == 0 {
            return Err("Degraded failure count must be greater than 0".to_string());
        }

        if self.capture.frame_rate == 0 {
            return Err("Frame rate must be greater than 0".to_string());
        }

        if self.server.label_capacity == 0 || self.server.frame_capacity == 0 {
            return Err("Publish channel capacities must be greater than 0".to_string());
        }

        if !(1..=100).contains(&self.server.jpeg_quality) {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }

        Ok(())
    }
}
