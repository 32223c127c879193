// THEORY:
// The `VerificationStateMachine` is the heart of the engine. It turns a stream of
// hand positions into the narrative of an assembly: which zones were touched, when
// a step was finished, when the operator reached for the wrong part, and how many
// complete assemblies have been produced.
//
// Key architectural principles:
// 1.  **Single Writer**: The machine owns its `VerificationSession` outright. Every
//     mutation happens inside `process_observation`, `start_session` or
//     `stop_session`, all of which take `&mut self`. Callers that receive
//     observations from several producers must funnel them through one queue
//     (see `service`), never share the machine.
// 2.  **Ordered Evaluation**: Each observation runs through a fixed sequence:
//     verification of required zones, out-of-sequence detection, step completion,
//     cycle completion. The events are returned in exactly that order.
// 3.  **Overlap Is Not Order**: When a point lies in several required zones, all of
//     them are verified in the same call. Enumeration order of the registry never
//     decides which zone "wins".
// 4.  **Alert Throttling**: A hand lingers in a wrong zone for many frames. Only the
//     first out-of-sequence touch inside a cooldown window raises an alert; the rest
//     are counted but stay silent.
// 5.  **Lifetime Counter**: `cycle_count` belongs to the machine, not the session, so
//     it survives stop/start and only resets with the process.

use crate::core_modules::event::{Observation, VerificationEvent};
use crate::core_modules::session::VerificationSession;
use crate::core_modules::sop_plan::SopPlan;
use crate::core_modules::spatial_gate::spatial_gate::{contains, zones_containing};
use crate::core_modules::zone::{Point, ZoneRegistry};
use crate::error::{ConfigurationError, ObservationError, SessionError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Lifecycle of the verification session.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// Waiting for the operator to start verification. Observations are ignored.
    Idle,
    /// Consuming observations.
    Active(VerificationSession),
}

/// The verified/unverified status of one zone, for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub name: String,
    pub verified: bool,
}

/// A point-in-time view of everything a presentation layer needs to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub session_active: bool,
    /// Zones in configuration order.
    pub zones: Vec<ZoneStatus>,
    /// Touched zones over all registered zones, in [0, 1].
    pub progress: f64,
    /// `None` while idle.
    pub current_step: Option<usize>,
    pub step_count: usize,
    pub cycle_count: u64,
    pub out_of_sequence_touches: u64,
    pub last_alert_time: Option<Duration>,
}

pub struct VerificationStateMachine {
    registry: ZoneRegistry,
    plan: SopPlan,
    alert_cooldown: Duration,
    /// Completed assembly cycles since the machine was created.
    cycle_count: u64,
    state: SessionState,
}

impl VerificationStateMachine {
    /// Fails with `InvalidPlan` when the plan names a zone this registry does not have.
    pub fn new(registry: ZoneRegistry, plan: SopPlan, alert_cooldown: Duration) -> Result<Self, ConfigurationError> {
        let stray = plan
            .steps()
            .iter()
            .enumerate()
            .find_map(|(index, step)| {
                step.required_zones()
                    .iter()
                    .find(|zone| zone.index() >= registry.len())
                    .map(|zone| (index, *zone))
            });
        if let Some((step_index, zone)) = stray {
            return Err(ConfigurationError::InvalidPlan(format!(
                "step {} refers to zone #{} but the registry holds {} zones",
                step_index,
                zone.index(),
                registry.len()
            )));
        }

        Ok(Self {
            registry,
            plan,
            alert_cooldown,
            cycle_count: 0,
            state: SessionState::Idle,
        })
    }

    /// Begins a fresh session: every zone untouched, first step current.
    pub fn start_session(&mut self) -> Result<(), SessionError> {
        if self.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        self.state = SessionState::Active(VerificationSession::new(self.registry.len()));
        info!(
            zones = self.registry.len(),
            steps = self.plan.step_count(),
            cycle_count = self.cycle_count,
            "verification session started"
        );
        Ok(())
    }

    /// Discards the active session, if any. Returns whether one was active.
    pub fn stop_session(&mut self) -> bool {
        let was_active = self.is_active();
        self.state = SessionState::Idle;
        if was_active {
            info!(cycle_count = self.cycle_count, "verification session stopped");
        }
        was_active
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    pub fn observe(&mut self, observation: Observation) -> Result<Vec<VerificationEvent>, ObservationError> {
        self.process_observation(observation.point, observation.timestamp)
    }

    /// Applies one hand position to the session and returns the resulting events in order.
    ///
    /// While idle this is a no-op. A point with non-finite coordinates is rejected
    /// without touching any state.
    pub fn process_observation(
        &mut self,
        point: Point,
        timestamp: Duration,
    ) -> Result<Vec<VerificationEvent>, ObservationError> {
        let SessionState::Active(session) = &mut self.state else {
            return Ok(Vec::new());
        };

        if !point.is_finite() {
            warn!(x = point.x, y = point.y, "dropping observation with non-finite coordinates");
            return Err(ObservationError::InvalidObservation { x: point.x, y: point.y });
        }

        // --- 1. Current Step ---
        let step_index = session.current_step_index();
        let step = match self.plan.step_at(step_index) {
            Ok(step) => step,
            Err(e) => {
                error!("session step is not part of the plan: {}", e);
                return Ok(Vec::new());
            }
        };

        let mut events = Vec::new();

        // --- 2. Zone Verification ---
        // Every untouched required zone that contains the point is verified.
        for &zone in step.required_zones() {
            if !session.is_touched(zone) && self.registry.bounds(zone).is_some_and(|bounds| contains(point, bounds)) {
                session.mark_touched(zone);
                let name = self.registry.name(zone);
                debug!(zone = name, step = step_index, "zone verified");
                events.push(VerificationEvent::ZoneVerified { zone: name.to_string() });
            }
        }

        // --- 3. Out-of-Sequence Detection ---
        if let Some(stray) = zones_containing(point, &self.registry).find(|&zone| !step.requires(zone)) {
            session.record_out_of_sequence_touch();
            let name = self.registry.name(stray);
            if session.alert_allowed(timestamp, self.alert_cooldown) {
                session.record_alert(timestamp);
                warn!(zone = name, step = step_index, ?timestamp, "hand detected out of sequence");
                events.push(VerificationEvent::OutOfSequenceAlert {
                    timestamp,
                    zone: name.to_string(),
                });
            } else {
                debug!(zone = name, ?timestamp, "out-of-sequence touch within alert cooldown");
            }
        }

        // --- 4. Step Completion ---
        if step.required_zones().iter().all(|&zone| session.is_touched(zone)) {
            session.advance_step();
            debug!(step = step_index, "step completed");
            events.push(VerificationEvent::StepCompleted { step_index });

            // --- 5. Cycle Completion ---
            if session.current_step_index() == self.plan.step_count() {
                self.cycle_count += 1;
                info!(cycle_count = self.cycle_count, "assembly cycle completed");
                events.push(VerificationEvent::CycleCompleted {
                    cycle_count: self.cycle_count,
                });
                session.reset_cycle();
            }
        }

        Ok(events)
    }

    /// Touched zones across all registered zones over the number of registered zones.
    pub fn current_progress(&self) -> f64 {
        match &self.state {
            SessionState::Active(session) if session.zone_count() > 0 => {
                session.touched_count() as f64 / session.zone_count() as f64
            }
            _ => 0.0,
        }
    }

    pub fn zone_status_snapshot(&self) -> Vec<ZoneStatus> {
        self.registry
            .ids()
            .map(|id| ZoneStatus {
                name: self.registry.name(id).to_string(),
                verified: match &self.state {
                    SessionState::Active(session) => session.is_touched(id),
                    SessionState::Idle => false,
                },
            })
            .collect()
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Index of the step being satisfied, or `None` while idle.
    pub fn current_step_index(&self) -> Option<usize> {
        match &self.state {
            SessionState::Active(session) => Some(session.current_step_index()),
            SessionState::Idle => None,
        }
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        let (out_of_sequence_touches, last_alert_time) = match &self.state {
            SessionState::Active(session) => (session.out_of_sequence_touches(), session.last_alert_time()),
            SessionState::Idle => (0, None),
        };
        StatusSnapshot {
            session_active: self.is_active(),
            zones: self.zone_status_snapshot(),
            progress: self.current_progress(),
            current_step: self.current_step_index(),
            step_count: self.plan.step_count(),
            cycle_count: self.cycle_count,
            out_of_sequence_touches,
            last_alert_time,
        }
    }

    pub fn registry(&self) -> &ZoneRegistry {
        &self.registry
    }

    pub fn plan(&self) -> &SopPlan {
        &self.plan
    }

    pub fn alert_cooldown(&self) -> Duration {
        self.alert_cooldown
    }
}
