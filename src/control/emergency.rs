// src/control/emergency.rs
//
// Emergency vehicle priority controller.
//
// Deterministic five-state machine with absolute priority over normal
// signal control while active. Consumes only the intersection snapshot
// (never raw perception) and the aggregator-surfaced nearest emergency:
// with multiple simultaneous emergency vehicles, closest wins upstream.
//
//     NORMAL -> DETECTED -> PREEMPTING -> CLEARING -> COOLDOWN -> NORMAL
//
// Phase forcing is immediate at the PREEMPTING transition; no
// yellow/all-red interlude is modeled. That is a deliberate
// simplification of this controller, not an oversight; interposing
// transition phases belongs to the signal-mapping layer.

use crate::control::events::{TransitionLog, TransitionRecord};
use crate::control::phases::PhaseType;
use crate::estimation::IntersectionState;
use crate::types::Approach;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EmergencyState {
    /// Pass-through; the normal controller drives signals.
    Normal,
    /// Emergency seen within detection range; debounce, no override yet.
    Detected,
    /// Absolute override: forcing the corridor-clearing phase.
    Preempting,
    /// Vehicle at/through the stop line (or gone); flush conflicting
    /// traffic for a fixed hold.
    Clearing,
    /// Stabilization window; new detections are ignored entirely.
    Cooldown,
}

impl EmergencyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyState::Normal => "NORMAL",
            EmergencyState::Detected => "DETECTED",
            EmergencyState::Preempting => "PREEMPTING",
            EmergencyState::Clearing => "CLEARING",
            EmergencyState::Cooldown => "COOLDOWN",
        }
    }
}

/// Result of the side-effect-free signal query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SignalCommand {
    /// True while this controller overrides normal control.
    pub active: bool,
    /// The phase to force while active.
    pub phase: Option<PhaseType>,
}

pub struct EmergencyPriorityController {
    state: EmergencyState,

    emergency_approach: Option<Approach>,
    emergency_distance: Option<f64>,
    forced_phase: Option<PhaseType>,

    state_entry_time: f64,
    transitions: TransitionLog,
}

impl EmergencyPriorityController {
    /// Start monitoring an emergency vehicle at this range (m).
    pub const DETECTION_THRESHOLD_M: f64 = 100.0;
    /// Force the phase change at this range (m).
    pub const PREEMPTION_THRESHOLD_M: f64 = 80.0;
    /// The vehicle has effectively passed the stop line at this range (m).
    pub const CLEARING_DISTANCE_M: f64 = 5.0;
    /// Hold the forced phase this long after the vehicle passes (s).
    pub const CLEARANCE_TIME_S: f64 = 5.0;
    /// Ignore new emergencies this long after clearing (s).
    pub const COOLDOWN_TIME_S: f64 = 10.0;

    /// Capacity of the transition journal between drains.
    const JOURNAL_CAPACITY: usize = 64;

    pub fn new() -> Self {
        info!(
            "✓ Emergency priority controller ready (detect {}m, preempt {}m, clear {}s, cooldown {}s)",
            Self::DETECTION_THRESHOLD_M,
            Self::PREEMPTION_THRESHOLD_M,
            Self::CLEARANCE_TIME_S,
            Self::COOLDOWN_TIME_S
        );
        Self {
            state: EmergencyState::Normal,
            emergency_approach: None,
            emergency_distance: None,
            forced_phase: None,
            state_entry_time: 0.0,
            transitions: TransitionLog::new(Self::JOURNAL_CAPACITY),
        }
    }

    /// Advance the state machine one tick.
    ///
    /// Internal transition only; read the decision via
    /// `signal_command()`. Total over every syntactically valid
    /// snapshot; degraded input (emergency flag without a usable
    /// distance) reads as "no emergency".
    pub fn update(&mut self, snapshot: &IntersectionState, current_time: f64) {
        let detected = Self::detect(snapshot);

        match self.state {
            EmergencyState::Normal => self.on_normal(detected, current_time),
            EmergencyState::Detected => self.on_detected(detected, current_time),
            EmergencyState::Preempting => self.on_preempting(detected, current_time),
            EmergencyState::Clearing => self.on_clearing(current_time),
            EmergencyState::Cooldown => self.on_cooldown(current_time),
        }
    }

    /// Current control decision. Pure query: no state mutation, safe to
    /// call any number of times between updates.
    pub fn signal_command(&self) -> SignalCommand {
        match self.state {
            EmergencyState::Preempting | EmergencyState::Clearing => SignalCommand {
                active: true,
                phase: self.forced_phase,
            },
            _ => SignalCommand {
                active: false,
                phase: None,
            },
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            EmergencyState::Preempting | EmergencyState::Clearing
        )
    }

    pub fn state(&self) -> EmergencyState {
        self.state
    }

    pub fn emergency_approach(&self) -> Option<Approach> {
        self.emergency_approach
    }

    /// Drain journaled transitions for external observability.
    pub fn drain_transitions(&mut self) -> Vec<TransitionRecord> {
        self.transitions.drain()
    }

    /// Unconditionally back to NORMAL, for the start of a new episode.
    pub fn reset(&mut self) {
        self.state = EmergencyState::Normal;
        self.emergency_approach = None;
        self.emergency_distance = None;
        self.forced_phase = None;
        self.state_entry_time = 0.0;
    }

    // ── State handlers ──

    fn on_normal(&mut self, detected: Option<(Approach, f64)>, current_time: f64) {
        if let Some((approach, distance)) = detected {
            if distance <= Self::DETECTION_THRESHOLD_M {
                self.emergency_approach = Some(approach);
                self.emergency_distance = Some(distance);
                self.transition(
                    EmergencyState::Detected,
                    current_time,
                    &format!("emergency on {} at {:.1}m", approach.as_str(), distance),
                );
            }
        }
    }

    fn on_detected(&mut self, detected: Option<(Approach, f64)>, current_time: f64) {
        let Some((approach, distance)) = detected else {
            self.emergency_approach = None;
            self.emergency_distance = None;
            self.transition(
                EmergencyState::Normal,
                current_time,
                "false alarm, emergency gone",
            );
            return;
        };

        self.emergency_approach = Some(approach);
        self.emergency_distance = Some(distance);

        if distance <= Self::PREEMPTION_THRESHOLD_M {
            let phase = PhaseType::emergency_for(approach);
            self.forced_phase = Some(phase);
            self.transition(
                EmergencyState::Preempting,
                current_time,
                &format!("{:.1}m from stop line, forcing {}", distance, phase.as_str()),
            );
        }
    }

    fn on_preempting(&mut self, detected: Option<(Approach, f64)>, current_time: f64) {
        // Disappearance during preemption completes safely through
        // CLEARING, never an abrupt return to NORMAL.
        let Some((_, distance)) = detected else {
            self.transition(
                EmergencyState::Clearing,
                current_time,
                "emergency left detection range",
            );
            return;
        };

        self.emergency_distance = Some(distance);

        if distance <= Self::CLEARING_DISTANCE_M {
            self.transition(
                EmergencyState::Clearing,
                current_time,
                &format!("vehicle cleared stop line ({:.1}m)", distance),
            );
        }
    }

    fn on_clearing(&mut self, current_time: f64) {
        if current_time - self.state_entry_time >= Self::CLEARANCE_TIME_S {
            self.transition(
                EmergencyState::Cooldown,
                current_time,
                "clearance hold complete",
            );
        }
    }

    fn on_cooldown(&mut self, current_time: f64) {
        // New emergencies are ignored entirely in this state.
        if current_time - self.state_entry_time >= Self::COOLDOWN_TIME_S {
            self.emergency_approach = None;
            self.emergency_distance = None;
            self.forced_phase = None;
            self.transition(EmergencyState::Normal, current_time, "cooldown complete");
        }
    }

    // ── Helpers ──

    /// The aggregator-surfaced nearest emergency, if usable.
    fn detect(snapshot: &IntersectionState) -> Option<(Approach, f64)> {
        if !snapshot.has_emergency {
            return None;
        }
        match (snapshot.emergency_approach, snapshot.emergency_distance) {
            (Some(approach), Some(distance)) => Some((approach, distance)),
            _ => None,
        }
    }

    fn transition(&mut self, to: EmergencyState, current_time: f64, reason: &str) {
        let from = self.state;
        info!(
            "🚨 Emergency priority: {} -> {} ({})",
            from.as_str(),
            to.as_str(),
            reason
        );
        self.transitions.publish(TransitionRecord {
            timestamp: current_time,
            from,
            to,
            reason: reason.to_string(),
        });
        self.state = to;
        self.state_entry_time = current_time;
    }
}

impl Default for EmergencyPriorityController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn snapshot(emergency: Option<(Approach, f64)>, timestamp: f64) -> IntersectionState {
        IntersectionState {
            timestamp,
            lane_states: HashMap::new(),
            approach_metrics: HashMap::new(),
            total_vehicles: 0,
            total_stopped: 0,
            total_waiting_time: 0.0,
            max_queue_length: 0.0,
            has_emergency: emergency.is_some(),
            emergency_approach: emergency.map(|(a, _)| a),
            emergency_distance: emergency.map(|(_, d)| d),
        }
    }

    fn clear(timestamp: f64) -> IntersectionState {
        snapshot(None, timestamp)
    }

    #[test]
    fn test_starts_in_normal_and_inactive() {
        let controller = EmergencyPriorityController::new();
        assert_eq!(controller.state(), EmergencyState::Normal);
        assert_eq!(
            controller.signal_command(),
            SignalCommand {
                active: false,
                phase: None
            }
        );
    }

    #[test]
    fn test_far_emergency_does_not_trigger_detection() {
        let mut controller = EmergencyPriorityController::new();
        controller.update(&snapshot(Some((Approach::North, 150.0)), 0.0), 0.0);
        assert_eq!(controller.state(), EmergencyState::Normal);
    }

    #[test]
    fn test_full_preemption_cycle() {
        let mut controller = EmergencyPriorityController::new();

        controller.update(&snapshot(Some((Approach::North, 95.0)), 0.0), 0.0);
        assert_eq!(controller.state(), EmergencyState::Detected);
        assert!(!controller.is_active(), "debounce must not override yet");

        controller.update(&snapshot(Some((Approach::North, 75.0)), 1.0), 1.0);
        assert_eq!(controller.state(), EmergencyState::Preempting);
        let command = controller.signal_command();
        assert!(command.active);
        assert_eq!(command.phase, Some(PhaseType::EmergencyNs));

        controller.update(&snapshot(Some((Approach::North, 3.0)), 2.0), 2.0);
        assert_eq!(controller.state(), EmergencyState::Clearing);
        assert!(controller.is_active(), "clearing still holds the phase");

        // Clearance hold: 5.0s from entry at t=2.
        controller.update(&clear(6.0), 6.0);
        assert_eq!(controller.state(), EmergencyState::Clearing);
        controller.update(&clear(7.0), 7.0);
        assert_eq!(controller.state(), EmergencyState::Cooldown);
        assert!(!controller.is_active());

        // Cooldown: 10.0s from entry at t=7.
        controller.update(&clear(16.0), 16.0);
        assert_eq!(controller.state(), EmergencyState::Cooldown);
        controller.update(&clear(17.0), 17.0);
        assert_eq!(controller.state(), EmergencyState::Normal);
    }

    #[test]
    fn test_cooldown_ignores_new_emergencies() {
        let mut controller = EmergencyPriorityController::new();
        controller.update(&snapshot(Some((Approach::North, 95.0)), 0.0), 0.0);
        controller.update(&snapshot(Some((Approach::North, 75.0)), 1.0), 1.0);
        controller.update(&snapshot(Some((Approach::North, 3.0)), 2.0), 2.0);
        controller.update(&clear(7.0), 7.0);
        assert_eq!(controller.state(), EmergencyState::Cooldown);

        // Second emergency mid-cooldown: no transition at all.
        controller.update(&snapshot(Some((Approach::East, 40.0)), 10.0), 10.0);
        assert_eq!(controller.state(), EmergencyState::Cooldown);
        assert!(!controller.is_active());
    }

    #[test]
    fn test_detection_resumes_after_cooldown() {
        let mut controller = EmergencyPriorityController::new();
        controller.update(&snapshot(Some((Approach::North, 95.0)), 0.0), 0.0);
        controller.update(&snapshot(Some((Approach::North, 75.0)), 1.0), 1.0);
        controller.update(&snapshot(Some((Approach::North, 3.0)), 2.0), 2.0);
        controller.update(&clear(7.0), 7.0);
        controller.update(&clear(17.0), 17.0);
        assert_eq!(controller.state(), EmergencyState::Normal);

        controller.update(&snapshot(Some((Approach::East, 60.0)), 18.0), 18.0);
        assert_eq!(controller.state(), EmergencyState::Detected);
    }

    #[test]
    fn test_false_alarm_returns_to_normal() {
        let mut controller = EmergencyPriorityController::new();
        controller.update(&snapshot(Some((Approach::West, 90.0)), 0.0), 0.0);
        assert_eq!(controller.state(), EmergencyState::Detected);

        controller.update(&clear(1.0), 1.0);
        assert_eq!(controller.state(), EmergencyState::Normal);
    }

    #[test]
    fn test_disappearance_during_preemption_goes_through_clearing() {
        let mut controller = EmergencyPriorityController::new();
        controller.update(&snapshot(Some((Approach::South, 95.0)), 0.0), 0.0);
        controller.update(&snapshot(Some((Approach::South, 70.0)), 1.0), 1.0);
        assert_eq!(controller.state(), EmergencyState::Preempting);

        controller.update(&clear(2.0), 2.0);
        assert_eq!(
            controller.state(),
            EmergencyState::Clearing,
            "disappearance must complete safely, not jump to NORMAL"
        );
        assert!(controller.is_active());
    }

    #[test]
    fn test_east_west_emergency_forces_ew_phase() {
        let mut controller = EmergencyPriorityController::new();
        controller.update(&snapshot(Some((Approach::East, 95.0)), 0.0), 0.0);
        controller.update(&snapshot(Some((Approach::East, 79.0)), 1.0), 1.0);
        assert_eq!(
            controller.signal_command().phase,
            Some(PhaseType::EmergencyEw)
        );
    }

    #[test]
    fn test_degenerate_snapshot_is_handled_gracefully() {
        let mut controller = EmergencyPriorityController::new();
        let mut degenerate = clear(0.0);
        degenerate.has_emergency = true; // flag set, but no approach/distance

        controller.update(&degenerate, 0.0);
        assert_eq!(controller.state(), EmergencyState::Normal);
    }

    #[test]
    fn test_signal_command_is_idempotent() {
        let mut controller = EmergencyPriorityController::new();
        controller.update(&snapshot(Some((Approach::North, 95.0)), 0.0), 0.0);
        controller.update(&snapshot(Some((Approach::North, 75.0)), 1.0), 1.0);

        let first = controller.signal_command();
        let second = controller.signal_command();
        assert_eq!(first, second);
        assert_eq!(controller.state(), EmergencyState::Preempting);
    }

    #[test]
    fn test_reset_returns_to_normal_unconditionally() {
        let mut controller = EmergencyPriorityController::new();
        controller.update(&snapshot(Some((Approach::North, 95.0)), 0.0), 0.0);
        controller.update(&snapshot(Some((Approach::North, 75.0)), 1.0), 1.0);
        assert!(controller.is_active());

        controller.reset();
        assert_eq!(controller.state(), EmergencyState::Normal);
        assert!(!controller.is_active());
        assert_eq!(controller.signal_command().phase, None);
    }

    #[test]
    fn test_transition_journal_records_the_cycle() {
        let mut controller = EmergencyPriorityController::new();
        controller.update(&snapshot(Some((Approach::North, 95.0)), 0.0), 0.0);
        controller.update(&snapshot(Some((Approach::North, 75.0)), 1.0), 1.0);
        controller.update(&snapshot(Some((Approach::North, 3.0)), 2.0), 2.0);

        let records = controller.drain_transitions();
        let path: Vec<(EmergencyState, EmergencyState)> =
            records.iter().map(|r| (r.from, r.to)).collect();
        assert_eq!(
            path,
            vec![
                (EmergencyState::Normal, EmergencyState::Detected),
                (EmergencyState::Detected, EmergencyState::Preempting),
                (EmergencyState::Preempting, EmergencyState::Clearing),
            ]
        );
        assert!(controller.drain_transitions().is_empty());
    }
}
