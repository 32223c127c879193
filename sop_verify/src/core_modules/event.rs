use crate::core_modules::zone::Point;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single hand position, already mapped into the station's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub point: Point,
    /// Capture time, measured from the start of the stream.
    pub timestamp: Duration,
}

impl Observation {
    pub fn new(point: impl Into<Point>, timestamp: Duration) -> Self {
        Self {
            point: point.into(),
            timestamp,
        }
    }
}

/// A discrete status transition produced by the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationEvent {
    /// A zone required by the current step was touched for the first time this cycle.
    ZoneVerified { zone: String },
    /// Every zone of the step at `step_index` has been touched.
    StepCompleted { step_index: usize },
    /// The last step completed; `cycle_count` is the new lifetime total.
    CycleCompleted { cycle_count: u64 },
    /// The hand entered `zone`, which the current step does not require.
    OutOfSequenceAlert { timestamp: Duration, zone: String },
}
