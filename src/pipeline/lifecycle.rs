use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::adapter::LandmarkEventAdapter;
use super::classifier::ClassifierClient;
use super::drawing::{DrawingSink, NullDrawingSink};
use super::feeder::{DetectorSink, FrameFeeder, SharedDetector};
use super::gate::RequestGate;
use super::state::{PipelineEvent, PipelineSnapshot};
use super::state_manager::{StateHandle, StateManager};
use crate::config::Configuration;
use crate::error::PipelineError;
use crate::intake::{HandDetector, VideoSource};

/// Owns every pipeline resource. Start-up runs detector, then video, then
/// frame feeding. Teardown runs once and releases feeder, video and
/// detector in that order, each step running even if an earlier one failed.
pub struct LifecycleController {
    session_id: Uuid,
    configuration: Configuration,
    mounted: CancellationToken,
    state: StateHandle,
    state_task: Option<JoinHandle<PipelineSnapshot>>,
    detector: SharedDetector,
    video: Option<Box<dyn VideoSource>>,
    feeder: FrameFeeder,
    adapter: Option<LandmarkEventAdapter>,
    adapter_task: Option<JoinHandle<()>>,
    torn_down: bool,
}

impl LifecycleController {
    fn new(
        configuration: Configuration,
        detector: Box<dyn HandDetector>,
        video: Box<dyn VideoSource>,
        drawing: Box<dyn DrawingSink>,
        classifier: ClassifierClient,
    ) -> Self {
        let mounted = CancellationToken::new();
        let (state, state_task) =
            StateManager::spawn(configuration.history_capacity, mounted.clone());
        let gate = RequestGate::new(classifier, state.clone(), mounted.clone());
        let adapter = LandmarkEventAdapter::new(drawing, gate, state.clone(), mounted.clone());
        Self {
            session_id: Uuid::new_v4(),
            configuration,
            mounted,
            state,
            state_task: Some(state_task),
            detector: Arc::new(Mutex::new(detector)),
            video: Some(video),
            feeder: FrameFeeder::new(),
            adapter: Some(adapter),
            adapter_task: None,
            torn_down: false,
        }
    }

    pub fn builder(configuration: Configuration) -> PipelineBuilder {
        PipelineBuilder::new(configuration)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineSnapshot> {
        self.state.subscribe()
    }

    pub async fn start(&mut self) -> Result<(), PipelineError> {
        if self.torn_down {
            return Err(PipelineError::Config("Pipeline was torn down".to_string()));
        }
        let Some(adapter) = self.adapter.take() else {
            return Err(PipelineError::Config("Pipeline already started".to_string()));
        };

        info!("Session {}: initializing hand detector", self.session_id);
        let (results_tx, results_rx) = mpsc::channel(self.configuration.detection_buffer_size);
        let initialized = self
            .detector
            .lock()
            .await
            .initialize(&self.configuration.detector, results_tx)
            .await;
        if let Err(e) = initialized {
            let e = match e {
                PipelineError::DetectorInit(_) => e,
                other => PipelineError::DetectorInit(other.to_string()),
            };
            error!("Session {}: {}", self.session_id, e);
            self.state.notify(PipelineEvent::DetectorFailed(e.to_string()));
            return Err(e);
        }
        self.state.notify(PipelineEvent::DetectorReady);
        self.adapter_task = Some(tokio::spawn(adapter.run(results_rx)));

        let Some(mut video) = self.video.take() else {
            return Err(PipelineError::CameraAccess(
                "video source already released".to_string(),
            ));
        };
        self.state.notify(PipelineEvent::VideoAttached);
        info!("Session {}: waiting for video source", self.session_id);
        if let Err(e) = video.ready().await {
            let e = match e {
                PipelineError::CameraAccess(_) => e,
                other => PipelineError::CameraAccess(other.to_string()),
            };
            error!("Session {}: {}", self.session_id, e);
            self.state.notify(PipelineEvent::CameraFailed(e.to_string()));
            self.video = Some(video);
            return Err(e);
        }

        let sink = DetectorSink::new(self.detector.clone());
        if let Err(video) = self.feeder.start(video, Box::new(sink)) {
            self.video = Some(video);
            return Err(PipelineError::Config("Frame feeder already started".to_string()));
        }
        info!("Session {}: pipeline streaming", self.session_id);
        Ok(())
    }

    /// Releases everything. Later calls are no-ops.
    pub async fn teardown(&mut self) -> Result<(), PipelineError> {
        if self.torn_down {
            debug!("Session {}: already torn down", self.session_id);
            return Ok(());
        }
        self.torn_down = true;
        info!("Session {}: tearing down", self.session_id);
        self.mounted.cancel();

        let mut failures = Vec::new();

        if let Some(video) = self.feeder.stop().await {
            self.video = Some(video);
        }
        if let Some(mut video) = self.video.take() {
            if let Err(e) = video.stop().await {
                warn!("Session {}: failed to stop video source: {}", self.session_id, e);
                failures.push(format!("video source: {}", e));
            }
        }
        if let Err(e) = self.detector.lock().await.close().await {
            warn!("Session {}: failed to release detector: {}", self.session_id, e);
            failures.push(format!("detector: {}", e));
        }

        self.adapter.take();
        if let Some(task) = self.adapter_task.take() {
            if let Err(e) = task.await {
                warn!("Session {}: adapter task failed: {}", self.session_id, e);
            }
        }
        if let Some(task) = self.state_task.take() {
            match task.await {
                Ok(snapshot) => info!(
                    "Session {}: final state {:?}, {} predictions in history",
                    self.session_id,
                    snapshot.state,
                    snapshot.history.len()
                ),
                Err(e) => warn!("Session {}: state manager failed: {}", self.session_id, e),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Teardown(failures.join("; ")))
        }
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        if !self.torn_down {
            warn!(
                "Session {}: dropped without teardown, cancelling tasks",
                self.session_id
            );
            self.mounted.cancel();
            if let Some(task) = self.adapter_task.take() {
                task.abort();
            }
        }
    }
}

pub struct PipelineBuilder {
    configuration: Configuration,
    detector: Option<Box<dyn HandDetector>>,
    video: Option<Box<dyn VideoSource>>,
    drawing: Option<Box<dyn DrawingSink>>,
    classifier: Option<ClassifierClient>,
}

impl PipelineBuilder {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration,
            detector: None,
            video: None,
            drawing: None,
            classifier: None,
        }
    }

    pub fn detector(mut self, detector: Box<dyn HandDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn video_source(mut self, video: Box<dyn VideoSource>) -> Self {
        self.video = Some(video);
        self
    }

    // Defaults to a sink that draws nothing.
    pub fn drawing_sink(mut self, drawing: Box<dyn DrawingSink>) -> Self {
        self.drawing = Some(drawing);
        self
    }

    // Defaults to the HTTP classifier described by the configuration.
    pub fn classifier(mut self, classifier: ClassifierClient) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Must be called inside a tokio runtime, the state manager is spawned
    /// here so the initial state can be observed before `start`.
    pub fn build(self) -> Result<LifecycleController, PipelineError> {
        self.configuration.validate()?;
        let detector = self
            .detector
            .ok_or(PipelineError::Config("Hand detector not set".to_string()))?;
        let video = self
            .video
            .ok_or(PipelineError::Config("Video source not set".to_string()))?;
        let classifier = match self.classifier {
            Some(classifier) => classifier,
            None => ClassifierClient::from_config(&self.configuration)?,
        };
        let drawing = self
            .drawing
            .unwrap_or_else(|| Box::new(NullDrawingSink));
        Ok(LifecycleController::new(
            self.configuration,
            detector,
            video,
            drawing,
            classifier,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::landmark::sample_hand;
    use crate::common::{FailureReason, Observation, Prediction, VideoFrame};
    use crate::error::ClassifyError;
    use crate::intake::{DetectionResult, DetectorOptions, ReplayDetector, SyntheticCamera};
    use crate::pipeline::state::PipelineState;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    type Journal = Arc<std::sync::Mutex<Vec<&'static str>>>;

    fn entries(journal: &Journal) -> Vec<&'static str> {
        journal.lock().unwrap().clone()
    }

    struct RecordingDetector {
        inner: ReplayDetector,
        journal: Journal,
        fail_init: bool,
        fail_close: bool,
    }

    #[async_trait]
    impl HandDetector for RecordingDetector {
        async fn initialize(
            &mut self,
            options: &DetectorOptions,
            results: mpsc::Sender<DetectionResult>,
        ) -> Result<(), PipelineError> {
            self.journal.lock().unwrap().push("detector.init");
            if self.fail_init {
                return Err(PipelineError::DetectorInit("model not found".to_string()));
            }
            self.inner.initialize(options, results).await
        }

        async fn send(&mut self, frame: &VideoFrame) -> Result<(), PipelineError> {
            self.inner.send(frame).await
        }

        async fn close(&mut self) -> Result<(), PipelineError> {
            self.journal.lock().unwrap().push("detector.close");
            self.inner.close().await?;
            if self.fail_close {
                return Err(PipelineError::Detector("close failed".to_string()));
            }
            Ok(())
        }
    }

    struct RecordingVideo {
        inner: SyntheticCamera,
        journal: Journal,
        fail_ready: bool,
        fail_stop: bool,
    }

    #[async_trait]
    impl VideoSource for RecordingVideo {
        async fn ready(&mut self) -> Result<(), PipelineError> {
            self.journal.lock().unwrap().push("video.ready");
            if self.fail_ready {
                return Err(PipelineError::CameraAccess("permission denied".to_string()));
            }
            self.inner.ready().await
        }

        async fn next_frame(&mut self) -> Option<VideoFrame> {
            self.inner.next_frame().await
        }

        async fn stop(&mut self) -> Result<(), PipelineError> {
            self.journal.lock().unwrap().push("video.stop");
            self.inner.stop().await?;
            if self.fail_stop {
                return Err(PipelineError::CameraAccess("device busy".to_string()));
            }
            Ok(())
        }
    }

    struct Harness {
        journal: Journal,
        calls: Arc<AtomicUsize>,
        fail_init: bool,
        fail_ready: bool,
        fail_stop: bool,
        fail_close: bool,
        answer: fn() -> Result<Prediction, ClassifyError>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                journal: Arc::default(),
                calls: Arc::default(),
                fail_init: false,
                fail_ready: false,
                fail_stop: false,
                fail_close: false,
                answer: || {
                    Ok(Prediction {
                        label: "A".to_string(),
                        confidence: 0.9,
                    })
                },
            }
        }

        fn build(&self) -> LifecycleController {
            let hand = sample_hand().points().to_vec();
            let detector = RecordingDetector {
                inner: ReplayDetector::from_script(vec![hand]),
                journal: self.journal.clone(),
                fail_init: self.fail_init,
                fail_close: self.fail_close,
            };
            let video = RecordingVideo {
                inner: SyntheticCamera::new(32, 32, Duration::from_millis(2)),
                journal: self.journal.clone(),
                fail_ready: self.fail_ready,
                fail_stop: self.fail_stop,
            };
            let calls = self.calls.clone();
            let answer = self.answer;
            let service = tower::service_fn(move |_obs: Observation| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    answer()
                }
            });
            LifecycleController::builder(Configuration::default())
                .detector(Box::new(detector))
                .video_source(Box::new(video))
                .classifier(ClassifierClient::new(service, Duration::from_secs(1)))
                .build()
                .expect("Failed to build pipeline")
        }
    }

    async fn wait_for(
        controller: &LifecycleController,
        predicate: impl FnMut(&PipelineSnapshot) -> bool,
    ) -> PipelineSnapshot {
        let mut rx = controller.subscribe();
        let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(predicate))
            .await
            .expect("timed out waiting for pipeline state")
            .expect("state manager stopped")
            .clone();
        snapshot
    }

    #[test]
    fn builder_requires_detector_and_video() {
        let result = PipelineBuilder::new(Configuration::default()).build();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn runs_end_to_end_and_tears_down_once() {
        let harness = Harness::new();
        let mut controller = harness.build();
        assert_eq!(controller.snapshot().state, PipelineState::Initializing);

        controller.start().await.unwrap();
        let snapshot = wait_for(&controller, |s| s.history.len() >= 2).await;
        assert_eq!(snapshot.state, PipelineState::Detecting);
        assert_eq!(snapshot.current.as_ref().unwrap().label, "A");

        controller.teardown().await.unwrap();
        controller.teardown().await.unwrap();
        assert_eq!(
            entries(&harness.journal),
            vec!["detector.init", "video.ready", "video.stop", "detector.close"]
        );

        let calls = harness.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(harness.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn classification_failures_do_not_stop_the_pipeline() {
        let mut harness = Harness::new();
        harness.answer = || Err(ClassifyError::Status(500));
        let mut controller = harness.build();
        controller.start().await.unwrap();
        let snapshot = wait_for(&controller, |s| s.consecutive_failures >= 2).await;
        assert_eq!(snapshot.state, PipelineState::Detecting);
        assert_eq!(snapshot.transient_error, Some(FailureReason::ServerError));
        assert!(snapshot.current.is_none());
        controller.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn detector_failure_skips_video_but_still_releases() {
        let mut harness = Harness::new();
        harness.fail_init = true;
        let mut controller = harness.build();

        let result = controller.start().await;
        assert!(matches!(result, Err(PipelineError::DetectorInit(_))));
        let snapshot = wait_for(&controller, |s| s.state == PipelineState::Failed).await;
        assert_eq!(
            snapshot.fatal_error.as_deref(),
            Some("Hand detector failed to initialize: model not found")
        );

        controller.teardown().await.unwrap();
        assert_eq!(
            entries(&harness.journal),
            vec!["detector.init", "video.stop", "detector.close"]
        );
        assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn camera_failure_halts_at_starting() {
        let mut harness = Harness::new();
        harness.fail_ready = true;
        let mut controller = harness.build();

        let result = controller.start().await;
        assert!(matches!(result, Err(PipelineError::CameraAccess(_))));
        let snapshot = wait_for(&controller, |s| s.fatal_error.is_some()).await;
        assert_eq!(snapshot.state, PipelineState::Starting);

        controller.teardown().await.unwrap();
        assert_eq!(
            entries(&harness.journal),
            vec!["detector.init", "video.ready", "video.stop", "detector.close"]
        );
    }

    #[tokio::test]
    async fn teardown_runs_every_step_despite_failures() {
        let mut harness = Harness::new();
        harness.fail_stop = true;
        harness.fail_close = true;
        let mut controller = harness.build();
        controller.start().await.unwrap();

        let result = controller.teardown().await;
        match result {
            Err(PipelineError::Teardown(message)) => {
                assert!(message.contains("video source"));
                assert!(message.contains("detector"));
            }
            other => panic!("expected teardown error, got {:?}", other),
        }
        assert!(controller.teardown().await.is_ok());
        assert_eq!(
            entries(&harness.journal),
            vec!["detector.init", "video.ready", "video.stop", "detector.close"]
        );
    }

    #[tokio::test]
    async fn teardown_before_start_releases_resources() {
        let harness = Harness::new();
        let mut controller = harness.build();
        controller.teardown().await.unwrap();
        assert_eq!(entries(&harness.journal), vec!["video.stop", "detector.close"]);
        assert!(matches!(
            controller.start().await,
            Err(PipelineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let harness = Harness::new();
        let mut controller = harness.build();
        controller.start().await.unwrap();
        assert!(matches!(
            controller.start().await,
            Err(PipelineError::Config(_))
        ));
        controller.teardown().await.unwrap();
    }
}
