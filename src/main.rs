// src/main.rs
//
// Demo driver. Stands in for the external simulation adapter: feeds a
// deterministic synthetic observation stream (a standing queue on the
// east approach plus an ambulance run on the north approach) through
// the estimation pipeline and the emergency priority controller, and
// logs what a signal-actuation collaborator would consume.

mod config;
mod control;
mod estimation;
mod metrics;
mod types;

use anyhow::Result;
use control::{EmergencyPriorityController, EmergencyState, PhaseType};
use estimation::{QueueEstimator, TrafficStateEstimator};
use metrics::RunMetrics;
use tracing::{debug, info, warn};
use types::{Approach, Config, VehicleObservation};

const TICK_SECONDS: f64 = 0.5;
const RUN_SECONDS: f64 = 60.0;

/// Ambulance kinematics for the scenario: appears 140m out on the
/// north approach and closes at 12 m/s until it crosses the stop line.
const AMBULANCE_START_M: f64 = 140.0;
const AMBULANCE_SPEED: f64 = 12.0;

fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("intersection_control={}", config.logging.level))
        .init();

    info!("🚦 Intersection control starting");
    info!(
        "Configured lanes: {} | smoothing: {}",
        config.intersection.lanes.len(),
        config.estimation.enable_smoothing
    );

    let mut estimator = TrafficStateEstimator::from_config(&config)?;
    let mut controller = EmergencyPriorityController::new();
    let queue_diag = QueueEstimator::default();
    let run_metrics = RunMetrics::new();

    let east_lane = estimator
        .lane_ids()
        .iter()
        .find(|l| Approach::from_lane_id(l.as_str()) == Some(Approach::East))
        .cloned();

    let ticks = (RUN_SECONDS / TICK_SECONDS) as u64;
    for tick in 0..=ticks {
        let now = tick as f64 * TICK_SECONDS;
        let batch = scenario_batch(now);

        run_metrics.inc(&run_metrics.updates);
        run_metrics.add(&run_metrics.observations, batch.len() as u64);
        if batch.is_empty() {
            run_metrics.inc(&run_metrics.empty_batches);
        }

        let state = estimator.update(&batch, now)?;

        let violations = estimator.validate(&state);
        if !violations.is_empty() {
            run_metrics.add(&run_metrics.validation_violations, violations.len() as u64);
            for violation in &violations {
                warn!("t={:.1}s snapshot violation: {}", now, violation);
            }
        }

        controller.update(&state, now);
        for record in controller.drain_transitions() {
            if record.to == EmergencyState::Preempting {
                run_metrics.inc(&run_metrics.preemptions);
            }
        }

        let command = controller.signal_command();
        if command.active {
            if let Some(phase) = command.phase {
                debug!(
                    "t={:.1}s override active on {}, forcing {}",
                    now,
                    controller
                        .emergency_approach()
                        .map_or("?", |a| a.as_str()),
                    phase.as_str()
                );
            }
        } else {
            // The external normal controller owns the signal plan here;
            // the demo just shows which nominal phase it would hold.
            let nominal = if (now / 20.0) as u64 % 2 == 0 {
                PhaseType::NsThrough
            } else {
                PhaseType::EwThrough
            };
            debug!("t={:.1}s pass-through, nominal {}", now, nominal.as_str());
        }

        if tick % 20 == 0 {
            info!(
                "t={:5.1}s | {} vehicles ({} stopped) | wait {:.1}s | max queue {:.1}m | emergency {}",
                now,
                state.total_vehicles,
                state.total_stopped,
                state.total_waiting_time,
                state.max_queue_length,
                controller.state().as_str()
            );
            for approach in Approach::ALL {
                let m = &state.approach_metrics[&approach];
                if m.total_vehicles > 0 {
                    info!(
                        "  {}: {:2} veh | queue {:5.1}m | wait {:4.1}s | stopped {}",
                        approach.as_str(),
                        m.total_vehicles,
                        m.total_queue_length,
                        m.avg_waiting_time,
                        m.stopped_vehicles
                    );
                }
            }
            if let Some(lane_id) = &east_lane {
                let lane = &state.lane_states[lane_id];
                let (extent, segments) =
                    queue_diag.estimate(&lane.vehicle_distances, &lane.vehicle_speeds);
                if !segments.is_empty() {
                    info!(
                        "  {} queue structure: {:.1}m in {} segment(s), est. clear {:.1}s",
                        lane_id,
                        extent,
                        segments.len(),
                        queue_diag.estimate_clear_time(extent)
                    );
                }
            }
        }
    }

    info!(
        "✓ Run complete, controller finished in {}",
        controller.state().as_str()
    );
    info!(
        "Run metrics:\n{}",
        serde_json::to_string_pretty(&run_metrics.summary())?
    );

    Ok(())
}

fn car(
    track_id: u32,
    lane: &str,
    distance: f64,
    speed: f64,
    is_emergency: bool,
    timestamp: f64,
) -> VehicleObservation {
    VehicleObservation {
        track_id,
        is_emergency,
        confidence: 1.0,
        position: (0.0, distance),
        velocity: (speed, 0.0),
        lane_id: Some(lane.to_string()),
        distance_to_stop_line: distance,
        timestamp,
    }
}

/// Deterministic observation batch for time `now`.
fn scenario_batch(now: f64) -> Vec<VehicleObservation> {
    let mut batch = Vec::new();

    // Standing queue on the east approach for the whole run.
    batch.push(car(1, "E_in_0", 4.0, 0.0, false, now));
    batch.push(car(2, "E_in_0", 11.0, 0.0, false, now));
    batch.push(car(3, "E_in_0", 18.0, 0.0, false, now));

    // One through vehicle on the west approach; disappears once it
    // crosses the stop line (its bookkeeping then ages out).
    let west_distance = 90.0 - 8.0 * now;
    if west_distance >= 0.0 {
        batch.push(car(4, "W_in_1", west_distance, 8.0, false, now));
    }

    // The ambulance run on the north approach.
    let ambulance_distance = AMBULANCE_START_M - AMBULANCE_SPEED * now;
    if ambulance_distance >= 0.0 {
        batch.push(car(99, "N_in_0", ambulance_distance, AMBULANCE_SPEED, true, now));
    }

    batch
}
