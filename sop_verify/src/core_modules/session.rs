// THEORY:
// A `VerificationSession` is the mutable half of the engine. It lives from the
// moment the operator starts verification until it is stopped, and it is owned
// by exactly one `VerificationStateMachine`. Nothing else can reach its fields.
//
// It holds two kinds of state with different lifetimes:
// 1.  **Per-cycle state**: the touched flags and the current step index. These are
//     cleared every time a full assembly cycle completes.
// 2.  **Per-session state**: the time of the last out-of-sequence alert and the
//     number of out-of-sequence touches seen, suppressed ones included. These
//     survive cycle resets so the alert cooldown is not defeated by finishing a cycle.

use crate::core_modules::zone::ZoneId;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VerificationSession {
    /// One flag per registered zone, indexed by `ZoneId`.
    zone_status: Vec<bool>,
    current_step_index: usize,
    /// `None` until the first alert of the session fires.
    last_alert_time: Option<Duration>,
    /// Out-of-sequence touches detected this session, alerted or not.
    out_of_sequence_touches: u64,
}

impl VerificationSession {
    pub fn new(zone_count: usize) -> Self {
        Self {
            zone_status: vec![false; zone_count],
            current_step_index: 0,
            last_alert_time: None,
            out_of_sequence_touches: 0,
        }
    }

    pub fn is_touched(&self, zone: ZoneId) -> bool {
        self.zone_status.get(zone.index()).copied().unwrap_or(false)
    }

    /// Marks a zone touched. Returns true only on the false -> true transition.
    pub fn mark_touched(&mut self, zone: ZoneId) -> bool {
        match self.zone_status.get_mut(zone.index()) {
            Some(status) if !*status => {
                *status = true;
                true
            }
            _ => false,
        }
    }

    pub fn touched_count(&self) -> usize {
        self.zone_status.iter().filter(|&&touched| touched).count()
    }

    pub fn zone_count(&self) -> usize {
        self.zone_status.len()
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    pub fn advance_step(&mut self) {
        self.current_step_index += 1;
    }

    pub fn last_alert_time(&self) -> Option<Duration> {
        self.last_alert_time
    }

    /// True when an alert at `now` would respect the cooldown.
    pub fn alert_allowed(&self, now: Duration, cooldown: Duration) -> bool {
        match self.last_alert_time {
            None => true,
            // Timestamps that run backwards count as zero elapsed time.
            Some(last) => now.saturating_sub(last) >= cooldown,
        }
    }

    pub fn record_alert(&mut self, now: Duration) {
        self.last_alert_time = Some(now);
    }

    pub fn out_of_sequence_touches(&self) -> u64 {
        self.out_of_sequence_touches
    }

    pub fn record_out_of_sequence_touch(&mut self) {
        self.out_of_sequence_touches += 1;
    }

    /// Clears the per-cycle state after the final step completes.
    pub fn reset_cycle(&mut self) {
        self.zone_status.iter_mut().for_each(|status| *status = false);
        self.current_step_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::zone::{Bounds, Zone, ZoneRegistry};

    fn ids() -> (ZoneId, ZoneId) {
        let registry = ZoneRegistry::new(vec![
            Zone::new("a", Bounds::new((0.0, 0.0), (1.0, 1.0))),
            Zone::new("b", Bounds::new((2.0, 2.0), (3.0, 3.0))),
        ])
        .unwrap();
        (registry.lookup("a").unwrap(), registry.lookup("b").unwrap())
    }

    #[test]
    fn mark_touched_reports_only_the_first_transition() {
        let (a, b) = ids();
        let mut session = VerificationSession::new(2);

        assert!(session.mark_touched(a));
        assert!(!session.mark_touched(a));
        assert!(session.is_touched(a));
        assert!(!session.is_touched(b));
        assert_eq!(session.touched_count(), 1);
    }

    #[test]
    fn reset_cycle_keeps_alert_history() {
        let (a, _) = ids();
        let mut session = VerificationSession::new(2);
        session.mark_touched(a);
        session.advance_step();
        session.record_alert(Duration::from_millis(500));
        session.record_out_of_sequence_touch();

        session.reset_cycle();

        assert_eq!(session.touched_count(), 0);
        assert_eq!(session.current_step_index(), 0);
        assert_eq!(session.last_alert_time(), Some(Duration::from_millis(500)));
        assert_eq!(session.out_of_sequence_touches(), 1);
    }

    #[test]
    fn cooldown_gates_alerts() {
        let cooldown = Duration::from_secs(1);
        let mut session = VerificationSession::new(1);
        assert!(session.alert_allowed(Duration::ZERO, cooldown));

        session.record_alert(Duration::from_millis(2000));
        assert!(!session.alert_allowed(Duration::from_millis(2999), cooldown));
        assert!(session.alert_allowed(Duration::from_millis(3000), cooldown));
        assert!(!session.alert_allowed(Duration::from_millis(1000), cooldown));
    }
}
