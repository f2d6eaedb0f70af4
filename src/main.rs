use signsight::intake::{ReplayDetector, SyntheticCamera};
use signsight::{Configuration, LifecycleController, PipelineError};
use tracing::{error, info, warn};

fn init_logging(configuration: &Configuration) {
    tracing_subscriber::fmt()
        .with_max_level(configuration.log_level())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    let configuration = Configuration::load()?;
    init_logging(&configuration);

    let replay_path = configuration.replay_path.clone().ok_or_else(|| {
        PipelineError::Config(
            "No landmark source configured, set SIGNSIGHT_REPLAY_PATH".to_string(),
        )
    })?;
    info!(
        "Classifying replayed landmarks from {} via {}",
        replay_path,
        configuration.predict_url()
    );

    let camera = SyntheticCamera::new(
        configuration.frame_width,
        configuration.frame_height,
        configuration.frame_interval(),
    );
    let mut controller = LifecycleController::builder(configuration)
        .detector(Box::new(ReplayDetector::from_file(replay_path)))
        .video_source(Box::new(camera))
        .build()?;

    let mut snapshots = controller.subscribe();
    let started = controller.start().await;
    if let Err(e) = &started {
        error!("Pipeline failed to start: {}", e);
    } else {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    match (&snapshot.current, snapshot.transient_error) {
                        (_, Some(reason)) => warn!("{:?}: classification error ({})", snapshot.state, reason),
                        (Some(prediction), None) => info!(
                            "{:?}: {} ({:.2}), history {:?}",
                            snapshot.state, prediction.label, prediction.confidence, snapshot.history
                        ),
                        (None, None) => info!("{:?}", snapshot.state),
                    }
                }
            }
        }
    }

    if let Err(e) = controller.teardown().await {
        error!("Teardown incomplete: {}", e);
    }
    started
}
