use serde::Deserialize;
use std::time::Duration;

use crate::error::PipelineError;
use crate::intake::DetectorOptions;

const SAME_ORIGIN: &str = "http://localhost:5000";
pub const MAX_TARGET_FPS: u32 = 1_000;

/// How observations are sent to the classification service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    /// JSON body `{"landmarks": [{"x","y","z"}, ...]}`.
    Landmarks,
    /// Multipart form with a JPEG crop of the hand in the `image` field.
    Image,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub api_base: String,
    pub wire_format: WireFormat,
    pub request_timeout_ms: u64,
    pub history_capacity: usize,
    pub target_fps: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    pub detection_buffer_size: usize,
    pub detector: DetectorOptions,
    pub replay_path: Option<String>,
    pub log_level: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            wire_format: WireFormat::Landmarks,
            request_timeout_ms: 8_000,
            history_capacity: 20,
            target_fps: 30,
            frame_width: 640,
            frame_height: 480,
            detection_buffer_size: 8,
            detector: DetectorOptions::default(),
            replay_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl Configuration {
    /// Layers an optional `signsight.*` file, `SIGNSIGHT_*` variables and
    /// finally `API_BASE` over the defaults.
    pub fn load() -> Result<Self, PipelineError> {
        Self::load_from(std::env::vars().collect())
    }

    /// Same as [`Configuration::load`] with `vars` standing in for the
    /// process environment.
    pub fn load_from(vars: config::Map<String, String>) -> Result<Self, PipelineError> {
        let api_base = vars.get("API_BASE").cloned();
        let built = config::Config::builder()
            .add_source(config::File::with_name("signsight").required(false))
            .add_source(
                config::Environment::with_prefix("SIGNSIGHT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(vars)),
            )
            .set_override_option("api_base", api_base)?
            .build()?;
        let configuration: Configuration = built.try_deserialize()?;
        configuration.validate()?;
        Ok(configuration)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.request_timeout_ms == 0 {
            return Err(PipelineError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(PipelineError::Config(
                "History capacity must be greater than 0".to_string(),
            ));
        }
        if self.target_fps == 0 || self.target_fps > MAX_TARGET_FPS {
            return Err(PipelineError::Config(format!(
                "Target frame rate must be between 1 and {}",
                MAX_TARGET_FPS
            )));
        }
        if self.detection_buffer_size == 0 {
            return Err(PipelineError::Config(
                "Detection buffer size must be greater than 0".to_string(),
            ));
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(PipelineError::Config(
                "Frame dimensions must be greater than 0".to_string(),
            ));
        }
        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(PipelineError::Config(format!(
                "Unknown log level '{}'",
                self.log_level
            )));
        }
        self.detector.validate()
    }

    /// Empty `api_base` means same origin as the classifier backend.
    pub fn predict_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        if base.is_empty() {
            format!("{}/predict", SAME_ORIGIN)
        } else {
            format!("{}/predict", base)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps as f64)
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}
