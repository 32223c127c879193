// THEORY:
// The `source` module is the boundary with the outside world. Whatever produces hand
// positions (a camera feeding a landmark estimator, a recorded session, a test) talks
// to the engine through the types in this file and nothing else.
//
// A landmark estimator reports positions relative to the frame, each axis in [0, 1].
// Zones are drawn in frame pixels. `FrameGeometry` is the single place where one is
// mapped onto the other; past this point the engine only ever sees `Observation`s in
// the zones' coordinate space.

use crate::core_modules::event::Observation;
use crate::core_modules::zone::Point;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A hand position relative to the frame, as reported by a landmark estimator.
/// The engine tracks the wrist landmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandLandmark {
    pub x: f64,
    pub y: f64,
}

impl HandLandmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Pixel dimensions of the source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Maps a relative landmark into frame pixel space. Values are not truncated or clamped.
    pub fn to_frame_space(&self, landmark: HandLandmark) -> Point {
        Point::new(landmark.x * self.width as f64, landmark.y * self.height as f64)
    }
}

/// Every hand detected in one captured frame, in detector-reported order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub timestamp: Duration,
    pub hands: Vec<HandLandmark>,
}

impl LandmarkFrame {
    pub fn new(timestamp: Duration, hands: Vec<HandLandmark>) -> Self {
        Self { timestamp, hands }
    }

    /// One observation per detected hand, sharing the frame's timestamp.
    pub fn observations<'a>(&'a self, geometry: &'a FrameGeometry) -> impl Iterator<Item = Observation> + 'a {
        self.hands
            .iter()
            .map(move |&hand| Observation::new(geometry.to_frame_space(hand), self.timestamp))
    }
}
