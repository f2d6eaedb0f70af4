use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::common::{Landmark, VideoFrame};
use crate::error::PipelineError;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    pub max_hands: usize,
    pub detection_confidence: f32,
    pub tracking_confidence: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            max_hands: 1,
            detection_confidence: 0.7,
            tracking_confidence: 0.7,
        }
    }
}

impl DetectorOptions {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_hands == 0 {
            return Err(PipelineError::Config(
                "Detector must track at least one hand".to_string(),
            ));
        }
        for (name, value) in [
            ("detection", self.detection_confidence),
            ("tracking", self.tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Config(format!(
                    "Detector {} confidence must be between 0.0 and 1.0",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Raw detector output for one frame: zero or more hands, each a list of
/// points as the detector reported them.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub frame_sequence: u64,
    pub captured_at: DateTime<Utc>,
    pub hands: Vec<Vec<Landmark>>,
    pub image: Option<Arc<RgbImage>>,
}

impl DetectionResult {
    pub fn for_frame(frame: &VideoFrame, hands: Vec<Vec<Landmark>>) -> Self {
        Self {
            frame_sequence: frame.sequence(),
            captured_at: frame.captured_at(),
            hands,
            image: Some(frame.image().clone()),
        }
    }
}

/// A hand landmark model. Results for submitted frames are delivered
/// asynchronously on the channel handed over in `initialize`.
#[async_trait]
pub trait HandDetector: Send {
    async fn initialize(
        &mut self,
        options: &DetectorOptions,
        results: mpsc::Sender<DetectionResult>,
    ) -> Result<(), PipelineError>;

    /// Resolves once the detector has accepted the frame.
    async fn send(&mut self, frame: &VideoFrame) -> Result<(), PipelineError>;

    async fn close(&mut self) -> Result<(), PipelineError>;
}
