pub mod frame;
pub mod landmark;
pub mod observation;
pub mod prediction;

pub use frame::VideoFrame;
pub use landmark::{BoundingBox, LANDMARK_COUNT, Landmark, LandmarkSet};
pub use observation::Observation;
pub use prediction::{FailureReason, Prediction, PredictionOutcome};
