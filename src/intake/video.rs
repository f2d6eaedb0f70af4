use async_trait::async_trait;
use chrono::Utc;
use image::RgbImage;
use std::time::Duration;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::common::VideoFrame;
use crate::error::PipelineError;

/// A live camera feed.
#[async_trait]
pub trait VideoSource: Send {
    /// Resolves once the device is streaming.
    async fn ready(&mut self) -> Result<(), PipelineError>;

    /// Waits for the next frame. `None` once the source stopped or ended.
    async fn next_frame(&mut self) -> Option<VideoFrame>;

    async fn stop(&mut self) -> Result<(), PipelineError>;
}

/// Emits blank frames on a fixed interval. Stands in for a camera when a
/// replaying detector supplies the landmarks.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    frame_interval: Duration,
    max_frames: Option<u64>,
    ticker: Option<Interval>,
    sequence: u64,
    stopped: bool,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, frame_interval: Duration) -> Self {
        Self {
            width,
            height,
            frame_interval,
            max_frames: None,
            ticker: None,
            sequence: 0,
            stopped: false,
        }
    }

    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }
}

#[async_trait]
impl VideoSource for SyntheticCamera {
    async fn ready(&mut self) -> Result<(), PipelineError> {
        if self.stopped {
            return Err(PipelineError::CameraAccess(
                "camera was already stopped".to_string(),
            ));
        }
        if self.frame_interval.is_zero() {
            return Err(PipelineError::CameraAccess(
                "frame interval must be greater than 0".to_string(),
            ));
        }
        let mut ticker = tokio::time::interval(self.frame_interval);
        // Late ticks are skipped instead of bursting to catch up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        info!(
            "Synthetic camera streaming {}x{} every {:?}",
            self.width, self.height, self.frame_interval
        );
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<VideoFrame> {
        if self.stopped {
            return None;
        }
        if let Some(max_frames) = self.max_frames {
            if self.sequence >= max_frames {
                debug!("Synthetic camera reached its frame limit");
                return None;
            }
        }
        let ticker = self.ticker.as_mut()?;
        ticker.tick().await;
        let frame = VideoFrame::new(
            self.sequence,
            RgbImage::new(self.width, self.height),
            Utc::now(),
        );
        self.sequence += 1;
        Some(frame)
    }

    async fn stop(&mut self) -> Result<(), PipelineError> {
        self.stopped = true;
        self.ticker = None;
        Ok(())
    }
}
