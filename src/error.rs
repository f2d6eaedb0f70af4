use thiserror::Error;

use crate::common::FailureReason;

// Lifecycle errors, these stop the pipeline.

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Hand detector failed to initialize: {0}")]
    DetectorInit(String),
    #[error("Camera could not be accessed: {0}")]
    CameraAccess(String),
    #[error("Hand detector rejected a frame: {0}")]
    Detector(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("A landmark set needs exactly 21 points, got {0}")]
    InvalidLandmarkSet(usize),
    #[error("Teardown step failed: {0}")]
    Teardown(String),
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

// Classification errors, these never leave the request gate.

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Classification request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Classification service answered with status {0}")]
    Status(u16),
    #[error("Malformed classification response: {0}")]
    Malformed(String),
    #[error("Classification request timed out")]
    Timeout,
    #[error("Failed to encode hand image: {0}")]
    Encoding(String),
}

impl ClassifyError {
    pub fn reason(&self) -> FailureReason {
        match self {
            ClassifyError::Network(_) => FailureReason::Network,
            ClassifyError::Status(status) if *status >= 500 => FailureReason::ServerError,
            ClassifyError::Status(_) => FailureReason::Rejected,
            ClassifyError::Malformed(_) => FailureReason::MalformedResponse,
            ClassifyError::Timeout => FailureReason::Timeout,
            ClassifyError::Encoding(_) => FailureReason::Encoding,
        }
    }
}
