// THEORY:
// The `pipeline` module is the top-level, synchronous API of the verification
// engine. It bundles the validated station (zones, plan, cooldown) with the frame
// geometry that maps landmark output into zone space, and exposes a single call per
// captured frame. Callers hand it everything the landmark estimator saw in that
// frame and get back a `Report` describing what, if anything, changed.

use crate::config::StationConfig;
use crate::core_modules::event::Observation;
use crate::core_modules::source::{FrameGeometry, LandmarkFrame};
use crate::core_modules::verifier::VerificationStateMachine;
use crate::error::{ConfigurationError, SessionError};
use tracing::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::event::VerificationEvent;
pub use crate::core_modules::verifier::{StatusSnapshot, ZoneStatus};

/// The detailed data package for a frame that changed the verification status.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportData {
    /// Events from every accepted hand, in detector order.
    pub events: Vec<VerificationEvent>,
    /// Hands dropped because their coordinates were not finite.
    pub rejected_observations: usize,
}

/// The primary output of the pipeline for a single frame. A frame whose hands were
/// all rejected still yields `StatusChanged`, with no events, so the rejections are
/// not lost.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    NoStatusChange,
    StatusChanged(ReportData),
}

impl Report {
    pub fn events(&self) -> &[VerificationEvent] {
        match self {
            Report::NoStatusChange => &[],
            Report::StatusChanged(data) => &data.events,
        }
    }
}

/// The main, top-level struct for the verification engine.
pub struct VerificationPipeline {
    machine: VerificationStateMachine,
    geometry: FrameGeometry,
    instructions: Vec<String>,
}

impl VerificationPipeline {
    pub fn new(machine: VerificationStateMachine, geometry: FrameGeometry) -> Self {
        Self {
            machine,
            geometry,
            instructions: Vec::new(),
        }
    }

    pub fn from_config(config: &StationConfig) -> Result<Self, ConfigurationError> {
        Ok(Self {
            machine: config.build_state_machine()?,
            geometry: config.frame_geometry()?,
            instructions: config.instructions.clone(),
        })
    }

    pub fn start(&mut self) -> Result<(), SessionError> {
        self.machine.start_session()
    }

    pub fn stop(&mut self) -> bool {
        self.machine.stop_session()
    }

    pub fn status_change_detected(&mut self, frame: &LandmarkFrame) -> bool {
        !self.generate_report(frame).events().is_empty()
    }

    /// Processes every hand of one captured frame.
    pub fn generate_report(&mut self, frame: &LandmarkFrame) -> Report {
        let geometry = self.geometry;
        self.process_observations(frame.observations(&geometry))
    }

    /// Processes observations that are already in zone space.
    pub fn process_observations(&mut self, observations: impl IntoIterator<Item = Observation>) -> Report {
        let mut events = Vec::new();
        let mut rejected_observations = 0;

        for observation in observations {
            match self.machine.observe(observation) {
                Ok(produced) => events.extend(produced),
                Err(e) => {
                    debug!("observation discarded: {}", e);
                    rejected_observations += 1;
                }
            }
        }

        if events.is_empty() && rejected_observations == 0 {
            Report::NoStatusChange
        } else {
            Report::StatusChanged(ReportData {
                events,
                rejected_observations,
            })
        }
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.machine.status_snapshot()
    }

    pub fn state_machine(&self) -> &VerificationStateMachine {
        &self.machine
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn instructions(&self) -> &[String] {
        &self.instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::source::HandLandmark;
    use std::time::Duration;

    fn pipeline() -> VerificationPipeline {
        let mut pipeline = VerificationPipeline::from_config(&StationConfig::default()).unwrap();
        pipeline.start().unwrap();
        pipeline
    }

    /// Relative position of a pixel point on the default 640x480 frame.
    fn hand(x: f64, y: f64) -> HandLandmark {
        HandLandmark::new(x / 640.0, y / 480.0)
    }

    fn frame(ms: u64, hands: Vec<HandLandmark>) -> LandmarkFrame {
        LandmarkFrame::new(Duration::from_millis(ms), hands)
    }

    #[test]
    fn frame_without_hands_reports_nothing() {
        let mut pipeline = pipeline();
        assert_eq!(pipeline.generate_report(&frame(0, vec![])), Report::NoStatusChange);
    }

    #[test]
    fn landmarks_are_normalized_before_verification() {
        let mut pipeline = pipeline();
        let report = pipeline.generate_report(&frame(0, vec![hand(100.0, 100.0)]));
        assert_eq!(
            report.events(),
            &[
                VerificationEvent::ZoneVerified { zone: "box1".to_string() },
                VerificationEvent::StepCompleted { step_index: 0 },
            ]
        );
    }

    #[test]
    fn two_hands_in_one_frame_are_applied_in_detector_order() {
        let mut pipeline = pipeline();
        pipeline.generate_report(&frame(0, vec![hand(100.0, 100.0)]));

        let report = pipeline.generate_report(&frame(40, vec![hand(100.0, 400.0), hand(400.0, 100.0)]));
        assert_eq!(
            report.events(),
            &[
                VerificationEvent::ZoneVerified { zone: "box2".to_string() },
                VerificationEvent::ZoneVerified { zone: "box3".to_string() },
                VerificationEvent::StepCompleted { step_index: 1 },
            ]
        );
    }

    #[test]
    fn rejected_hands_do_not_block_valid_ones() {
        let mut pipeline = pipeline();
        let report = pipeline.generate_report(&frame(
            0,
            vec![HandLandmark::new(f64::NAN, 0.5), hand(100.0, 100.0)],
        ));

        match report {
            Report::StatusChanged(data) => {
                assert_eq!(data.rejected_observations, 1);
                assert_eq!(data.events.len(), 2);
            }
            Report::NoStatusChange => panic!("expected box1 to be verified"),
        }
    }

    #[test]
    fn nothing_changes_before_start() {
        let mut pipeline = VerificationPipeline::from_config(&StationConfig::default()).unwrap();
        assert!(!pipeline.status_change_detected(&frame(0, vec![hand(100.0, 100.0)])));
        assert!(!pipeline.status_snapshot().session_active);
        assert_eq!(pipeline.instructions().len(), 4);
    }

    #[test]
    fn frame_of_only_rejected_hands_still_reports_them() {
        let mut pipeline = pipeline();
        let report = pipeline.generate_report(&frame(
            0,
            vec![HandLandmark::new(f64::NAN, 0.5), HandLandmark::new(0.5, f64::INFINITY)],
        ));

        assert_eq!(
            report,
            Report::StatusChanged(ReportData {
                events: Vec::new(),
                rejected_observations: 2,
            })
        );
        assert!(!pipeline.status_change_detected(&frame(40, vec![HandLandmark::new(f64::NAN, 0.0)])));
        assert_eq!(pipeline.status_snapshot().progress, 0.0);
    }
}
