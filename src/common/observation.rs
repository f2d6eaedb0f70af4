use chrono::{DateTime, Utc};
use image::RgbImage;
use std::sync::Arc;
use uuid::Uuid;

use super::LandmarkSet;

/// A hand seen in one frame, waiting to be classified.
#[derive(Debug, Clone)]
pub struct Observation {
    id: Uuid,
    landmarks: LandmarkSet,
    frame_sequence: u64,
    captured_at: DateTime<Utc>,
    // Source pixels, only needed by the image wire format.
    image: Option<Arc<RgbImage>>,
}

impl Observation {
    pub fn new(
        landmarks: LandmarkSet,
        frame_sequence: u64,
        captured_at: DateTime<Utc>,
        image: Option<Arc<RgbImage>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            landmarks,
            frame_sequence,
            captured_at,
            image,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn landmarks(&self) -> &LandmarkSet {
        &self.landmarks
    }

    pub fn frame_sequence(&self) -> u64 {
        self.frame_sequence
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn image(&self) -> Option<&Arc<RgbImage>> {
        self.image.as_ref()
    }
}
