use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::VideoFrame;
use crate::error::PipelineError;
use crate::intake::{HandDetector, VideoSource};

pub type SharedDetector = Arc<Mutex<Box<dyn HandDetector>>>;

/// Consumer of frames. `on_frame` resolving is the acknowledgement that
/// lets the feeder request the next frame.
#[async_trait]
pub trait FrameSink: Send {
    async fn on_frame(&mut self, frame: VideoFrame) -> Result<(), PipelineError>;
}

/// Forwards frames to the hand detector.
pub struct DetectorSink {
    detector: SharedDetector,
}

impl DetectorSink {
    pub fn new(detector: SharedDetector) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl FrameSink for DetectorSink {
    async fn on_frame(&mut self, frame: VideoFrame) -> Result<(), PipelineError> {
        self.detector.lock().await.send(&frame).await
    }
}

/// Pulls frames from the video source one at a time. Calls to the sink
/// never overlap.
pub struct FrameFeeder {
    cancel: CancellationToken,
    task: Option<JoinHandle<Box<dyn VideoSource>>>,
}

impl FrameFeeder {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Hands the source straight back if the feeder was already started.
    pub fn start(
        &mut self,
        video: Box<dyn VideoSource>,
        sink: Box<dyn FrameSink>,
    ) -> Result<(), Box<dyn VideoSource>> {
        if self.task.is_some() || self.cancel.is_cancelled() {
            warn!("Frame feeder already started");
            return Err(video);
        }
        self.task = Some(tokio::spawn(Self::feed(video, sink, self.cancel.clone())));
        Ok(())
    }

    /// Stops feeding and returns the video source. Safe to call repeatedly
    /// and before `start`, later calls return `None`.
    pub async fn stop(&mut self) -> Option<Box<dyn VideoSource>> {
        self.cancel.cancel();
        let task = self.task.take()?;
        match task.await {
            Ok(video) => Some(video),
            Err(e) => {
                error!("Frame feeder task failed: {}", e);
                None
            }
        }
    }

    async fn feed(
        mut video: Box<dyn VideoSource>,
        mut sink: Box<dyn FrameSink>,
        cancel: CancellationToken,
    ) -> Box<dyn VideoSource> {
        info!("Frame feeder started");
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                frame = video.next_frame() => frame,
            };
            let Some(frame) = frame else {
                info!("Video source ended");
                break;
            };
            let sequence = frame.sequence();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = sink.on_frame(frame) => {
                    if let Err(e) = result {
                        warn!("Error processing frame {}: {}", sequence, e);
                    } else {
                        debug!("Frame {} submitted", sequence);
                    }
                }
            }
        }
        info!("Frame feeder stopped");
        video
    }
}

impl Default for FrameFeeder {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FrameFeeder {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
