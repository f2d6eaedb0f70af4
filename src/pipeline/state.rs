use serde::Serialize;

use super::history::HistoryBuffer;
use crate::common::{FailureReason, Prediction, PredictionOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    /// Detector model loading.
    Initializing,
    /// Detector loaded, video not streaming yet.
    Ready,
    /// Video attached, first frames pending.
    Starting,
    /// A hand is in view.
    Detecting,
    /// No hand in view.
    Idle,
    /// Detector failed to initialize. Terminal for the session.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    DetectorReady,
    DetectorFailed(String),
    VideoAttached,
    CameraFailed(String),
    HandObserved,
    NoHandObserved,
    Outcome(PredictionOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Transition {
        from: PipelineState,
        to: PipelineState,
    },
    Updated,
    Ignored,
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSnapshot {
    pub state: PipelineState,
    pub current: Option<Prediction>,
    pub history: Vec<String>,
    pub transient_error: Option<FailureReason>,
    pub fatal_error: Option<String>,
    pub consecutive_failures: u32,
}

pub struct PipelineStateMachine {
    state: PipelineState,
    current: Option<Prediction>,
    history: HistoryBuffer,
    transient_error: Option<FailureReason>,
    fatal_error: Option<String>,
    consecutive_failures: u32,
}

impl PipelineStateMachine {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: PipelineState::Initializing,
            current: None,
            history: HistoryBuffer::new(history_capacity),
            transient_error: None,
            fatal_error: None,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn current(&self) -> Option<&Prediction> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn is_halted(&self) -> bool {
        self.fatal_error.is_some()
    }

    pub fn apply(&mut self, event: PipelineEvent) -> Applied {
        use PipelineState::*;

        if self.is_halted() {
            return Applied::Ignored;
        }

        match (self.state, event) {
            (Initializing, PipelineEvent::DetectorReady) => self.transition(Ready),
            (Initializing, PipelineEvent::DetectorFailed(reason)) => {
                self.fatal_error = Some(reason);
                self.transition(Failed)
            }
            (Ready, PipelineEvent::VideoAttached) => self.transition(Starting),
            // The pipeline halts where it is, the camera view is replaced
            // by the error.
            (Ready | Starting, PipelineEvent::CameraFailed(reason)) => {
                self.fatal_error = Some(reason);
                Applied::Updated
            }
            (Starting | Idle, PipelineEvent::HandObserved) => self.transition(Detecting),
            (Starting | Detecting, PipelineEvent::NoHandObserved) => self.transition(Idle),
            (Detecting, PipelineEvent::HandObserved) | (Idle, PipelineEvent::NoHandObserved) => {
                Applied::Ignored
            }
            (Detecting, PipelineEvent::Outcome(PredictionOutcome::Success(prediction))) => {
                self.history.push(prediction.label.clone());
                self.current = Some(prediction);
                self.transient_error = None;
                self.consecutive_failures = 0;
                Applied::Updated
            }
            (
                Starting | Detecting | Idle,
                PipelineEvent::Outcome(PredictionOutcome::Failure { reason }),
            ) => {
                self.transient_error = Some(reason);
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                Applied::Updated
            }
            _ => Applied::Ignored,
        }
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            state: self.state,
            current: self.current.clone(),
            history: self.history.to_vec(),
            transient_error: self.transient_error,
            fatal_error: self.fatal_error.clone(),
            consecutive_failures: self.consecutive_failures,
        }
    }

    fn transition(&mut self, to: PipelineState) -> Applied {
        let from = self.state;
        self.state = to;
        Applied::Transition { from, to }
    }
}
