pub mod detector;
pub mod replay;
pub mod video;

pub use detector::{DetectionResult, DetectorOptions, HandDetector};
pub use replay::ReplayDetector;
pub use video::{SyntheticCamera, VideoSource};
