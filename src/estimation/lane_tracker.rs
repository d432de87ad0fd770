// src/estimation/lane_tracker.rs
//
// Per-lane traffic state from raw per-vehicle observations.
//
// Design:
//   - One immutable LaneState per configured lane per update, always;
//     empty lanes produce zero-valued states, never missing entries.
//   - Waiting time is measured from the stop event, not first appearance.
//   - Per-vehicle bookkeeping is bounded: identities absent from the
//     current batch are purged once their last sighting is stale.

use crate::types::VehicleObservation;
use anyhow::{ensure, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

/// Below this speed a vehicle is effectively stopped (m/s).
pub const STOPPED_SPEED_THRESHOLD: f64 = 0.5;

/// Queue detection zone, measured from the stop line (m).
pub const QUEUE_DISTANCE_THRESHOLD: f64 = 30.0;

/// Reference lane length used to normalize density (m). Densities are
/// per-100 m regardless of a lane's physical length so they stay
/// comparable across lanes and perception sources.
pub const LANE_LENGTH: f64 = 100.0;

/// Bookkeeping for a vehicle survives this long past its last sighting (s).
pub const CLEANUP_TIMEOUT: f64 = 10.0;

/// Jam density bound used by validation (vehicles per 100 m).
pub const JAM_DENSITY: f64 = 20.0;

/// Traffic state for a single lane at a single timestamp.
///
/// Immutable by convention and by API: the tracker hands out shared
/// references and replaces whole snapshots on the next update.
///
/// Physical interpretation:
///   - `queue_length`: spatial extent of the stopped queue (m)
///   - `density`: vehicles per 100 m
///   - `avg_waiting_time`: mean delay of currently stopped vehicles (s)
///   - `avg_speed`: mean speed of all vehicles in the lane (m/s)
#[derive(Debug, Clone, Serialize)]
pub struct LaneState {
    pub lane_id: String,
    pub timestamp: f64,

    pub vehicle_count: usize,
    pub stopped_vehicles: usize,

    pub queue_length: f64,
    pub queue_vehicle_count: usize,

    pub density: f64,
    pub avg_speed: f64,
    pub avg_waiting_time: f64,

    pub has_emergency_vehicle: bool,
    pub emergency_vehicle_distance: Option<f64>,

    // Raw per-vehicle data, retained for diagnostics only.
    pub vehicle_distances: Vec<f64>,
    pub vehicle_speeds: Vec<f64>,
}

impl LaneState {
    /// Zero-valued state for a lane with no observed vehicles.
    pub fn empty(lane_id: &str, timestamp: f64) -> Self {
        Self {
            lane_id: lane_id.to_string(),
            timestamp,
            vehicle_count: 0,
            stopped_vehicles: 0,
            queue_length: 0.0,
            queue_vehicle_count: 0,
            density: 0.0,
            avg_speed: 0.0,
            avg_waiting_time: 0.0,
            has_emergency_vehicle: false,
            emergency_vehicle_distance: None,
            vehicle_distances: Vec::new(),
            vehicle_speeds: Vec::new(),
        }
    }

    /// Check this state against its physical invariants.
    ///
    /// Returns human-readable violations instead of panicking; the
    /// caller decides whether a non-empty list is fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.queue_length < 0.0 {
            errors.push(format!("negative queue length: {}", self.queue_length));
        }
        if self.queue_length > LANE_LENGTH {
            errors.push(format!(
                "queue exceeds lane: {} > {}",
                self.queue_length, LANE_LENGTH
            ));
        }

        if self.density < 0.0 {
            errors.push(format!("negative density: {}", self.density));
        }
        if self.density > JAM_DENSITY {
            errors.push(format!(
                "density exceeds jam bound: {} > {}",
                self.density, JAM_DENSITY
            ));
        }

        if self.avg_waiting_time < 0.0 {
            errors.push(format!("negative waiting time: {}", self.avg_waiting_time));
        }

        if self.queue_vehicle_count > self.vehicle_count {
            errors.push(format!(
                "more queued than total: {} > {}",
                self.queue_vehicle_count, self.vehicle_count
            ));
        }
        if self.stopped_vehicles > self.vehicle_count {
            errors.push(format!(
                "more stopped than total: {} > {}",
                self.stopped_vehicles, self.vehicle_count
            ));
        }

        errors
    }
}

/// Cross-call bookkeeping for one tracked vehicle identity.
#[derive(Debug, Clone, Copy)]
struct VehicleRecord {
    first_seen: f64,
    last_seen: f64,
    /// Start of the currently open stop event, if any. Cleared the
    /// moment the vehicle moves again.
    stop_time: Option<f64>,
}

/// Tracks traffic state for every configured lane at the intersection.
///
/// Holds no snapshot until the first `update` call; there are no
/// placeholder states. After any update, `current_states` contains
/// exactly one entry per configured lane.
pub struct LaneStateTracker {
    lane_ids: Vec<String>,
    history_length: usize,

    current_states: HashMap<String, LaneState>,
    history: HashMap<String, VecDeque<LaneState>>,

    vehicles: HashMap<u32, VehicleRecord>,
}

impl LaneStateTracker {
    /// Fails on an empty or duplicate lane-identity set: configuration
    /// errors are fatal at construction, not discovered mid-run.
    pub fn new(lane_ids: Vec<String>, history_length: usize) -> Result<Self> {
        ensure!(!lane_ids.is_empty(), "lane set must not be empty");
        let unique: HashSet<&String> = lane_ids.iter().collect();
        ensure!(
            unique.len() == lane_ids.len(),
            "lane set contains duplicate ids"
        );

        let history = lane_ids
            .iter()
            .map(|lid| (lid.clone(), VecDeque::with_capacity(history_length)))
            .collect();

        info!(
            "✓ Lane tracker initialized for {} lanes (queue zone {}m, stop threshold {}m/s)",
            lane_ids.len(),
            QUEUE_DISTANCE_THRESHOLD,
            STOPPED_SPEED_THRESHOLD
        );

        Ok(Self {
            lane_ids,
            history_length,
            current_states: HashMap::new(),
            history,
            vehicles: HashMap::new(),
        })
    }

    /// Fold one observation batch into a complete per-lane snapshot set.
    ///
    /// Postcondition: one `LaneState` per configured lane, all stamped
    /// `current_time`. A violation is a logic defect and comes back as
    /// `Err`, never as a partial snapshot.
    pub fn update(
        &mut self,
        observations: &[VehicleObservation],
        current_time: f64,
    ) -> Result<()> {
        self.update_stop_events(observations, current_time);

        // Group by lane. Every configured lane gets a bucket up front so
        // empty lanes still produce states; vehicles without a lane
        // assignment (or in an unconfigured lane) are excluded.
        let mut by_lane: HashMap<&str, Vec<&VehicleObservation>> = self
            .lane_ids
            .iter()
            .map(|lid| (lid.as_str(), Vec::new()))
            .collect();
        for obs in observations {
            if let Some(lane_id) = obs.lane_id.as_deref() {
                if let Some(bucket) = by_lane.get_mut(lane_id) {
                    bucket.push(obs);
                }
            }
        }

        let mut new_states = HashMap::with_capacity(self.lane_ids.len());
        for lane_id in &self.lane_ids {
            let vehicles = &by_lane[lane_id.as_str()];
            let state = self.compute_lane_state(lane_id, vehicles, current_time);
            new_states.insert(lane_id.clone(), state);
        }

        ensure!(
            new_states.len() == self.lane_ids.len(),
            "incomplete snapshot: {} states for {} lanes",
            new_states.len(),
            self.lane_ids.len()
        );

        for (lane_id, state) in &new_states {
            let ring = self
                .history
                .get_mut(lane_id)
                .expect("history ring exists for every configured lane");
            if ring.len() >= self.history_length {
                ring.pop_front();
            }
            ring.push_back(state.clone());
        }
        self.current_states = new_states;

        self.cleanup_departed(observations, current_time);
        Ok(())
    }

    /// Open/close stop events and refresh sighting times for every
    /// vehicle in the batch, lane-assigned or not.
    fn update_stop_events(&mut self, observations: &[VehicleObservation], current_time: f64) {
        for obs in observations {
            let speed = obs.speed();
            let record = self
                .vehicles
                .entry(obs.track_id)
                .or_insert(VehicleRecord {
                    first_seen: current_time,
                    last_seen: current_time,
                    stop_time: None,
                });
            record.last_seen = current_time;

            if speed < STOPPED_SPEED_THRESHOLD {
                if record.stop_time.is_none() {
                    record.stop_time = Some(current_time);
                    debug!(
                        "Vehicle {} stopped at t={:.1}s (speed {:.2}m/s)",
                        obs.track_id, current_time, speed
                    );
                }
            } else {
                record.stop_time = None;
            }
        }
    }

    fn compute_lane_state(
        &self,
        lane_id: &str,
        vehicles: &[&VehicleObservation],
        current_time: f64,
    ) -> LaneState {
        if vehicles.is_empty() {
            return LaneState::empty(lane_id, current_time);
        }

        let mut distances = Vec::with_capacity(vehicles.len());
        let mut speeds = Vec::with_capacity(vehicles.len());
        let mut stopped_count = 0usize;
        let mut queued_distances: Vec<f64> = Vec::new();
        let mut waiting_times: Vec<f64> = Vec::new();

        for obs in vehicles {
            let speed = obs.speed();
            speeds.push(speed);

            // Negative distance means "not valid": tolerated, excluded.
            if obs.distance_to_stop_line >= 0.0 {
                distances.push(obs.distance_to_stop_line);
            }

            if speed < STOPPED_SPEED_THRESHOLD {
                stopped_count += 1;

                // Waiting accrues only inside an open stop event.
                if let Some(record) = self.vehicles.get(&obs.track_id) {
                    if let Some(stop_time) = record.stop_time {
                        waiting_times.push(current_time - stop_time);
                    }
                }
            }

            if obs.distance_to_stop_line >= 0.0
                && obs.distance_to_stop_line <= QUEUE_DISTANCE_THRESHOLD
                && speed < STOPPED_SPEED_THRESHOLD
            {
                queued_distances.push(obs.distance_to_stop_line);
            }
        }

        // Queue extent: max distance among queued vehicles, gaps included.
        let queue_length = queued_distances.iter().cloned().fold(0.0, f64::max);
        let queue_vehicle_count = queued_distances.len();

        let vehicle_count = vehicles.len();
        let density = (vehicle_count as f64 / LANE_LENGTH) * 100.0;

        let avg_speed = speeds.iter().sum::<f64>() / speeds.len() as f64;
        let avg_waiting_time = if waiting_times.is_empty() {
            0.0
        } else {
            waiting_times.iter().sum::<f64>() / waiting_times.len() as f64
        };

        // A moving emergency vehicle still flags the lane; it just
        // contributes nothing to queue metrics.
        let emergency_vehicle_distance = vehicles
            .iter()
            .filter(|v| v.is_emergency && v.distance_to_stop_line >= 0.0)
            .map(|v| v.distance_to_stop_line)
            .fold(None, |best: Option<f64>, d| match best {
                Some(b) if b <= d => Some(b),
                _ => Some(d),
            });
        let has_emergency_vehicle = vehicles.iter().any(|v| v.is_emergency);

        LaneState {
            lane_id: lane_id.to_string(),
            timestamp: current_time,
            vehicle_count,
            stopped_vehicles: stopped_count,
            queue_length,
            queue_vehicle_count,
            density,
            avg_speed,
            avg_waiting_time,
            has_emergency_vehicle,
            emergency_vehicle_distance,
            vehicle_distances: distances,
            vehicle_speeds: speeds,
        }
    }

    /// Drop bookkeeping for identities absent from the current batch
    /// whose last sighting is older than `CLEANUP_TIMEOUT`. Bounds
    /// memory to vehicles seen recently.
    fn cleanup_departed(&mut self, observations: &[VehicleObservation], current_time: f64) {
        let present: HashSet<u32> = observations.iter().map(|o| o.track_id).collect();
        let before = self.vehicles.len();
        self.vehicles.retain(|track_id, record| {
            present.contains(track_id) || current_time - record.last_seen <= CLEANUP_TIMEOUT
        });
        let purged = before - self.vehicles.len();
        if purged > 0 {
            debug!("Purged {} departed vehicles at t={:.1}s", purged, current_time);
        }
    }

    // ── Queries ──

    pub fn lane_ids(&self) -> &[String] {
        &self.lane_ids
    }

    /// No entries exist before the first `update` call.
    pub fn current_states(&self) -> &HashMap<String, LaneState> {
        &self.current_states
    }

    pub fn lane_state(&self, lane_id: &str) -> Option<&LaneState> {
        self.current_states.get(lane_id)
    }

    /// Bounded ring of recent snapshots for a lane, oldest first.
    pub fn history(&self, lane_id: &str) -> Option<&VecDeque<LaneState>> {
        self.history.get(lane_id)
    }

    /// Number of vehicle identities currently held in bookkeeping.
    pub fn tracked_vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Age of a vehicle's first sighting, if it is still tracked.
    pub fn vehicle_age(&self, track_id: u32, current_time: f64) -> Option<f64> {
        self.vehicles
            .get(&track_id)
            .map(|r| current_time - r.first_seen)
    }

    /// Return to the just-constructed condition: no snapshots, no
    /// vehicle bookkeeping, empty history rings.
    pub fn reset(&mut self) {
        self.current_states.clear();
        for ring in self.history.values_mut() {
            ring.clear();
        }
        self.vehicles.clear();
    }
}
