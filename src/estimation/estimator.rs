// src/estimation/estimator.rs
//
// Estimation facade: raw observations → lane tracker → smoothing →
// one immutable intersection snapshot per tick. The snapshot is the
// only thing control ever sees; it is complete (every configured lane)
// and internally consistent (totals are sums over the same lane set).

use crate::estimation::lane_tracker::{LaneState, LaneStateTracker};
use crate::estimation::smoothing::MetricSmoother;
use crate::types::{Approach, Config, VehicleObservation};
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Aggregate metrics for one approach (all lanes sharing a cardinal
/// direction into the intersection).
#[derive(Debug, Clone, Serialize)]
pub struct ApproachMetrics {
    pub total_vehicles: usize,
    pub stopped_vehicles: usize,
    pub total_queue_length: f64,
    pub avg_density: f64,
    pub avg_waiting_time: f64,
    pub has_emergency: bool,
}

impl ApproachMetrics {
    fn zero() -> Self {
        Self {
            total_vehicles: 0,
            stopped_vehicles: 0,
            total_queue_length: 0.0,
            avg_density: 0.0,
            avg_waiting_time: 0.0,
            has_emergency: false,
        }
    }
}

/// Complete intersection traffic state for one timestamp.
///
/// Input to control. Immutable; superseded wholesale by the next
/// update. `lane_states` always contains exactly the configured lane
/// set, and every contained state carries the same timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct IntersectionState {
    pub timestamp: f64,

    pub lane_states: HashMap<String, LaneState>,
    pub approach_metrics: HashMap<Approach, ApproachMetrics>,

    pub total_vehicles: usize,
    pub total_stopped: usize,
    /// Sum of per-vehicle waiting times across all lanes (s).
    pub total_waiting_time: f64,
    /// Longest queue anywhere in the intersection (m).
    pub max_queue_length: f64,

    pub has_emergency: bool,
    pub emergency_approach: Option<Approach>,
    /// Distance to the stop line of the nearest emergency vehicle (m).
    pub emergency_distance: Option<f64>,
}

/// Complete traffic state estimation pipeline for one intersection.
pub struct TrafficStateEstimator {
    tracker: LaneStateTracker,
    smoother: MetricSmoother,
    enable_smoothing: bool,
}

impl TrafficStateEstimator {
    pub fn new(
        lane_ids: Vec<String>,
        enable_smoothing: bool,
        history_length: usize,
    ) -> Result<Self> {
        let tracker = LaneStateTracker::new(lane_ids, history_length)?;
        info!(
            "✓ State estimator ready (smoothing {})",
            if enable_smoothing { "enabled" } else { "disabled" }
        );
        Ok(Self {
            tracker,
            smoother: MetricSmoother::new(),
            enable_smoothing,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.intersection.lanes.clone(),
            config.estimation.enable_smoothing,
            config.estimation.history_length,
        )
    }

    /// Fold one observation batch into an intersection snapshot.
    ///
    /// Tolerates an empty batch (full zero-valued snapshot). The only
    /// `Err` here is the tracker's internal-consistency failure, which
    /// is a logic defect, not an input problem.
    pub fn update(
        &mut self,
        observations: &[VehicleObservation],
        current_time: f64,
    ) -> Result<IntersectionState> {
        self.tracker.update(observations, current_time)?;

        // Smoothed (or raw) lane set, in configured order so smoothing
        // state and tie-breaks never depend on hash iteration.
        let mut lane_states: HashMap<String, LaneState> =
            HashMap::with_capacity(self.tracker.lane_ids().len());
        for lane_id in self.tracker.lane_ids() {
            let raw = self
                .tracker
                .lane_state(lane_id)
                .expect("tracker guarantees a state per configured lane")
                .clone();
            let state = if self.enable_smoothing {
                Self::smooth_lane_state(&mut self.smoother, raw)
            } else {
                raw
            };
            lane_states.insert(lane_id.clone(), state);
        }

        let approach_metrics = self.compute_approach_metrics(&lane_states);

        let total_vehicles = lane_states.values().map(|s| s.vehicle_count).sum();
        let total_stopped = lane_states.values().map(|s| s.stopped_vehicles).sum();
        let total_waiting_time = lane_states
            .values()
            .map(|s| s.avg_waiting_time * s.stopped_vehicles as f64)
            .sum();
        let max_queue_length = lane_states
            .values()
            .map(|s| s.queue_length)
            .fold(0.0, f64::max);

        // Nearest emergency vehicle across all lanes; its lane's
        // approach is the one surfaced. Ties go to the first lane in
        // configured order.
        let mut emergency_approach = None;
        let mut emergency_distance: Option<f64> = None;
        for lane_id in self.tracker.lane_ids() {
            let state = &lane_states[lane_id];
            if !state.has_emergency_vehicle {
                continue;
            }
            if let Some(distance) = state.emergency_vehicle_distance {
                if emergency_distance.map_or(true, |best| distance < best) {
                    emergency_distance = Some(distance);
                    emergency_approach = Approach::from_lane_id(lane_id);
                }
            }
        }
        let has_emergency = lane_states.values().any(|s| s.has_emergency_vehicle);

        Ok(IntersectionState {
            timestamp: current_time,
            lane_states,
            approach_metrics,
            total_vehicles,
            total_stopped,
            total_waiting_time,
            max_queue_length,
            has_emergency,
            emergency_approach,
            emergency_distance,
        })
    }

    /// New immutable state with the smoothed metric subset replaced.
    /// Emergency fields, stopped count, avg_speed, and the raw arrays
    /// pass through untouched.
    fn smooth_lane_state(smoother: &mut MetricSmoother, raw: LaneState) -> LaneState {
        let smoothed = smoother.update(
            &raw.lane_id,
            raw.queue_length,
            raw.density,
            raw.avg_waiting_time,
            raw.vehicle_count as f64,
        );
        LaneState {
            queue_length: smoothed.queue_length,
            density: smoothed.density,
            avg_waiting_time: smoothed.avg_waiting_time,
            vehicle_count: smoothed.vehicle_count as usize,
            ..raw
        }
    }

    fn compute_approach_metrics(
        &self,
        lane_states: &HashMap<String, LaneState>,
    ) -> HashMap<Approach, ApproachMetrics> {
        let mut metrics = HashMap::with_capacity(Approach::ALL.len());
        for approach in Approach::ALL {
            let states: Vec<&LaneState> = self
                .tracker
                .lane_ids()
                .iter()
                .filter(|lid| Approach::from_lane_id(lid.as_str()) == Some(approach))
                .map(|lid| &lane_states[lid.as_str()])
                .collect();

            if states.is_empty() {
                metrics.insert(approach, ApproachMetrics::zero());
                continue;
            }

            let total_vehicles = states.iter().map(|s| s.vehicle_count).sum();
            let stopped_vehicles: usize = states.iter().map(|s| s.stopped_vehicles).sum();
            let total_queue_length = states.iter().map(|s| s.queue_length).sum();
            let avg_density =
                states.iter().map(|s| s.density).sum::<f64>() / states.len() as f64;

            // Waiting averaged per stopped vehicle, not per lane.
            let total_waiting: f64 = states
                .iter()
                .map(|s| s.avg_waiting_time * s.stopped_vehicles as f64)
                .sum();
            let avg_waiting_time = if stopped_vehicles > 0 {
                total_waiting / stopped_vehicles as f64
            } else {
                0.0
            };

            metrics.insert(
                approach,
                ApproachMetrics {
                    total_vehicles,
                    stopped_vehicles,
                    total_queue_length,
                    avg_density,
                    avg_waiting_time,
                    has_emergency: states.iter().any(|s| s.has_emergency_vehicle),
                },
            );
        }
        metrics
    }

    /// Check a produced snapshot against the physical and consistency
    /// invariants. Returns violations; raising is the caller's call.
    pub fn validate(&self, state: &IntersectionState) -> Vec<String> {
        let mut errors = Vec::new();

        for lane_id in self.tracker.lane_ids() {
            match state.lane_states.get(lane_id) {
                None => errors.push(format!("lane {} missing from snapshot", lane_id)),
                Some(lane_state) => {
                    for e in lane_state.validate() {
                        errors.push(format!("lane {}: {}", lane_id, e));
                    }
                }
            }
        }
        if state.lane_states.len() != self.tracker.lane_ids().len() {
            errors.push(format!(
                "snapshot has {} lanes, {} configured",
                state.lane_states.len(),
                self.tracker.lane_ids().len()
            ));
        }

        let sum_vehicles: usize = state.lane_states.values().map(|s| s.vehicle_count).sum();
        if sum_vehicles != state.total_vehicles {
            errors.push(format!(
                "vehicle count mismatch: sum={}, total={}",
                sum_vehicles, state.total_vehicles
            ));
        }
        let sum_stopped: usize = state.lane_states.values().map(|s| s.stopped_vehicles).sum();
        if sum_stopped != state.total_stopped {
            errors.push(format!(
                "stopped count mismatch: sum={}, total={}",
                sum_stopped, state.total_stopped
            ));
        }

        if state.max_queue_length < 0.0 {
            errors.push(format!("negative max queue: {}", state.max_queue_length));
        }
        if state.total_waiting_time < 0.0 {
            errors.push(format!(
                "negative total waiting: {}",
                state.total_waiting_time
            ));
        }

        errors
    }

    pub fn lane_ids(&self) -> &[String] {
        self.tracker.lane_ids()
    }

    pub fn tracker(&self) -> &LaneStateTracker {
        &self.tracker
    }

    /// Reset for a new episode: clears all tracking bookkeeping and
    /// smoothing history. No snapshot exists until the next update.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.smoother.reset();
        info!("State estimator reset");
    }
}
