use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::drawing::DrawingSink;
use super::gate::RequestGate;
use super::state_manager::StateHandle;
use crate::common::{LandmarkSet, Observation};
use crate::intake::DetectionResult;

#[derive(Debug)]
pub enum HandSignal {
    HandObserved(Observation),
    NoHandObserved,
}

/// Turns raw detector output into hand signals and routes them to the
/// overlay, the state manager and the request gate.
pub struct LandmarkEventAdapter {
    drawing: Box<dyn DrawingSink>,
    gate: RequestGate,
    state: StateHandle,
    mounted: CancellationToken,
}

impl LandmarkEventAdapter {
    pub fn new(
        drawing: Box<dyn DrawingSink>,
        gate: RequestGate,
        state: StateHandle,
        mounted: CancellationToken,
    ) -> Self {
        Self {
            drawing,
            gate,
            state,
            mounted,
        }
    }

    /// Only the first reported hand is used. A hand with the wrong number
    /// of points counts as no hand.
    pub fn normalize(result: DetectionResult) -> HandSignal {
        let DetectionResult {
            frame_sequence,
            captured_at,
            hands,
            image,
        } = result;
        let Some(points) = hands.into_iter().next() else {
            return HandSignal::NoHandObserved;
        };
        match LandmarkSet::try_from(points) {
            Ok(landmarks) => HandSignal::HandObserved(Observation::new(
                landmarks,
                frame_sequence,
                captured_at,
                image,
            )),
            Err(e) => {
                warn!("Discarding hand from frame {}: {}", frame_sequence, e);
                HandSignal::NoHandObserved
            }
        }
    }

    pub fn handle(&mut self, result: DetectionResult) {
        if self.mounted.is_cancelled() {
            debug!("Discarding detection for frame {} after teardown", result.frame_sequence);
            return;
        }
        match Self::normalize(result) {
            HandSignal::HandObserved(observation) => {
                self.drawing.draw(Some(observation.landmarks()));
                self.state.hand_observed();
                self.gate.submit(observation);
            }
            HandSignal::NoHandObserved => {
                self.drawing.draw(None);
                self.state.no_hand_observed();
            }
        }
    }

    pub async fn run(mut self, mut results: mpsc::Receiver<DetectionResult>) {
        loop {
            tokio::select! {
                biased;
                _ = self.mounted.cancelled() => break,
                result = results.recv() => match result {
                    Some(result) => self.handle(result),
                    None => break,
                },
            }
        }
        debug!("Landmark event adapter stopped");
    }
}
