use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;

/// One frame pulled from the video source. The pixel buffer is shared, so
/// clones are cheap.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    sequence: u64,
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
}

impl VideoFrame {
    pub fn new(sequence: u64, image: RgbImage, captured_at: DateTime<Utc>) -> Self {
        Self {
            sequence,
            image: Arc::new(image),
            captured_at,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn image(&self) -> &Arc<RgbImage> {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
