use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::classifier::ClassifierClient;
use super::state_manager::StateHandle;
use crate::common::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Dropped,
}

/// Admission control in front of the classifier: at most one request in
/// flight, anything arriving meanwhile is dropped rather than queued.
pub struct RequestGate {
    // Single permit. Holding it means a request is in flight.
    token: Arc<Semaphore>,
    classifier: ClassifierClient,
    state: StateHandle,
    mounted: CancellationToken,
}

impl RequestGate {
    pub fn new(classifier: ClassifierClient, state: StateHandle, mounted: CancellationToken) -> Self {
        Self {
            token: Arc::new(Semaphore::new(1)),
            classifier,
            state,
            mounted,
        }
    }

    pub fn submit(&self, observation: Observation) -> Admission {
        if self.mounted.is_cancelled() {
            return Admission::Dropped;
        }
        let permit = match self.token.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(
                    "Request in flight, dropping observation from frame {}",
                    observation.frame_sequence()
                );
                return Admission::Dropped;
            }
        };
        debug!(
            "Admitted observation {} from frame {}",
            observation.id(),
            observation.frame_sequence()
        );

        let classify = self.classifier.classify(observation);
        let state = self.state.clone();
        let mounted = self.mounted.clone();
        tokio::spawn(async move {
            // Released when this task ends, however it ends.
            let _permit = permit;
            tokio::select! {
                biased;
                _ = mounted.cancelled() => {
                    debug!("Teardown abandoned an in-flight classification");
                }
                outcome = classify => {
                    state.outcome(outcome);
                }
            }
        });
        Admission::Admitted
    }
}
