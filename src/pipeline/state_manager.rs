use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{Applied, PipelineEvent, PipelineSnapshot, PipelineStateMachine};
use crate::common::PredictionOutcome;

/// Sole owner of the pipeline state machine. Other components talk to it
/// through a [`StateHandle`].
pub struct StateManager {
    machine: PipelineStateMachine,
    events_rx: mpsc::UnboundedReceiver<PipelineEvent>,
    snapshot_tx: watch::Sender<PipelineSnapshot>,
    mounted: CancellationToken,
}

#[derive(Clone)]
pub struct StateHandle {
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    snapshot_rx: watch::Receiver<PipelineSnapshot>,
}

impl StateManager {
    /// Starts the manager task. It stops applying events as soon as
    /// `mounted` is cancelled and returns the last snapshot.
    pub fn spawn(
        history_capacity: usize,
        mounted: CancellationToken,
    ) -> (StateHandle, JoinHandle<PipelineSnapshot>) {
        let machine = PipelineStateMachine::new(history_capacity);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());
        let manager = Self {
            machine,
            events_rx,
            snapshot_tx,
            mounted,
        };
        let task = tokio::spawn(manager.run());
        (
            StateHandle {
                events_tx,
                snapshot_rx,
            },
            task,
        )
    }

    async fn run(mut self) -> PipelineSnapshot {
        loop {
            tokio::select! {
                biased;
                _ = self.mounted.cancelled() => {
                    debug!("State manager unmounted");
                    break;
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
            }
        }
        self.machine.snapshot()
    }

    fn handle_event(&mut self, event: PipelineEvent) {
        if self.mounted.is_cancelled() {
            debug!("Ignoring {:?} after teardown", event);
            return;
        }
        if let PipelineEvent::Outcome(PredictionOutcome::Failure { reason }) = &event {
            warn!("Classification failed: {}", reason);
        }
        match self.machine.apply(event) {
            Applied::Transition { from, to } => {
                info!("Pipeline state {:?} -> {:?}", from, to);
            }
            Applied::Updated => {
                debug!("Pipeline state {:?} updated", self.machine.state());
            }
            Applied::Ignored => return,
        }
        self.snapshot_tx.send_replace(self.machine.snapshot());
    }
}

impl StateHandle {
    pub fn notify(&self, event: PipelineEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("State manager stopped, dropping event");
        }
    }

    pub fn hand_observed(&self) {
        self.notify(PipelineEvent::HandObserved);
    }

    pub fn no_hand_observed(&self) {
        self.notify(PipelineEvent::NoHandObserved);
    }

    pub fn outcome(&self, outcome: PredictionOutcome) {
        self.notify(PipelineEvent::Outcome(outcome));
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.snapshot_rx.clone()
    }
}
