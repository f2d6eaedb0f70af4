use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

use super::detector::{DetectionResult, DetectorOptions, HandDetector};
use crate::common::{Landmark, VideoFrame};
use crate::error::PipelineError;

enum ScriptSource {
    File(PathBuf),
    Inline(Vec<Vec<Landmark>>),
}

/// Replays recorded landmarks, one script line per submitted frame,
/// looping at the end. Each line of a script file is a JSON array of
/// `{"x","y","z"}` points; an empty array means no hand in that frame.
pub struct ReplayDetector {
    source: ScriptSource,
    script: Vec<Vec<Landmark>>,
    cursor: usize,
    results: Option<mpsc::Sender<DetectionResult>>,
}

impl ReplayDetector {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::with_source(ScriptSource::File(path.into()))
    }

    pub fn from_script(script: Vec<Vec<Landmark>>) -> Self {
        Self::with_source(ScriptSource::Inline(script))
    }

    fn with_source(source: ScriptSource) -> Self {
        Self {
            source,
            script: Vec::new(),
            cursor: 0,
            results: None,
        }
    }

    fn parse_script(contents: &str) -> Result<Vec<Vec<Landmark>>, PipelineError> {
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str::<Vec<Landmark>>(line).map_err(|e| {
                    PipelineError::DetectorInit(format!(
                        "invalid replay line {}: {}",
                        number + 1,
                        e
                    ))
                })
            })
            .collect()
    }
}

#[async_trait]
impl HandDetector for ReplayDetector {
    async fn initialize(
        &mut self,
        options: &DetectorOptions,
        results: mpsc::Sender<DetectionResult>,
    ) -> Result<(), PipelineError> {
        let script = match &self.source {
            ScriptSource::File(path) => {
                let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                    PipelineError::DetectorInit(format!(
                        "failed to read {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::parse_script(&contents)?
            }
            ScriptSource::Inline(script) => script.clone(),
        };
        if script.is_empty() {
            return Err(PipelineError::DetectorInit(
                "replay script is empty".to_string(),
            ));
        }
        info!(
            "Replay detector loaded {} frames (max hands {})",
            script.len(),
            options.max_hands
        );
        self.script = script;
        self.cursor = 0;
        self.results = Some(results);
        Ok(())
    }

    async fn send(&mut self, frame: &VideoFrame) -> Result<(), PipelineError> {
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| PipelineError::Detector("detector is not initialized".to_string()))?;
        let points = self.script[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.script.len();
        let hands = if points.is_empty() { vec![] } else { vec![points] };
        match results.try_send(DetectionResult::for_frame(frame, hands)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                // Drop the result to keep real-time
                warn!("Dropping detection for frame {}: channel full", frame.sequence());
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(PipelineError::Detector(
                "detection channel closed".to_string(),
            )),
        }
    }

    async fn close(&mut self) -> Result<(), PipelineError> {
        self.results = None;
        self.script.clear();
        Ok(())
    }
}
