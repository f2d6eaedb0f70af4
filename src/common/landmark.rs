use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

pub const LANDMARK_COUNT: usize = 21;

/// A single tracked point. `x`/`y` are normalized to the frame, `z` is
/// depth relative to the wrist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// The 21-point skeleton of one hand. Can only be built with exactly
/// [`LANDMARK_COUNT`] points, and keeps their order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LandmarkSet(Vec<Landmark>);

impl LandmarkSet {
    pub fn points(&self) -> &[Landmark] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.0.get(index)
    }

    pub fn wrist(&self) -> &Landmark {
        &self.0[WRIST]
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox {
            x_min: f32::INFINITY,
            y_min: f32::INFINITY,
            x_max: f32::NEG_INFINITY,
            y_max: f32::NEG_INFINITY,
        };
        for point in &self.0 {
            bbox.x_min = bbox.x_min.min(point.x);
            bbox.y_min = bbox.y_min.min(point.y);
            bbox.x_max = bbox.x_max.max(point.x);
            bbox.y_max = bbox.y_max.max(point.y);
        }
        bbox
    }
}

impl TryFrom<Vec<Landmark>> for LandmarkSet {
    type Error = PipelineError;

    fn try_from(points: Vec<Landmark>) -> Result<Self, Self::Error> {
        if points.len() != LANDMARK_COUNT {
            return Err(PipelineError::InvalidLandmarkSet(points.len()));
        }
        Ok(Self(points))
    }
}

impl<'de> Deserialize<'de> for LandmarkSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let points = Vec::<Landmark>::deserialize(deserializer)?;
        LandmarkSet::try_from(points).map_err(serde::de::Error::custom)
    }
}

/// Normalized extent of a hand within the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    /// Scales the box to pixel coordinates, clamped to the frame.
    /// Returns `(x, y, width, height)`.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let scale = |value: f32, extent: u32| -> u32 {
            (value.clamp(0.0, 1.0) * extent as f32).round() as u32
        };
        let x0 = scale(self.x_min, width);
        let y0 = scale(self.y_min, height);
        let x1 = scale(self.x_max, width).max(x0);
        let y1 = scale(self.y_max, height).max(y0);
        (x0, y0, x1 - x0, y1 - y0)
    }
}

#[cfg(test)]
pub(crate) fn sample_hand() -> LandmarkSet {
    let points = (0..LANDMARK_COUNT)
        .map(|i| Landmark::new(0.3 + i as f32 * 0.01, 0.4 + i as f32 * 0.005, -0.01 * i as f32))
        .collect::<Vec<_>>();
    LandmarkSet::try_from(points).expect("21 points")
}
