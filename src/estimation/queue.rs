// src/estimation/queue.rs
//
// Spatial queue-structure diagnostics. Bins stopped vehicles along the
// distance-to-stop-line axis and extracts contiguous occupied segments,
// which exposes gaps the scalar queue_length metric cannot (a stalled
// vehicle far upstream vs. one solid queue). Diagnostic only: lane
// snapshots keep the furthest-queued-vehicle rule for queue_length.

use serde::Serialize;

/// One contiguous run of occupied bins.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueSegment {
    /// Near edge, meters from the stop line.
    pub start_distance: f64,
    /// Far edge, meters from the stop line.
    pub end_distance: f64,
    pub vehicle_count: usize,
    /// Vehicles per meter within this segment.
    pub density: f64,
}

#[derive(Debug, Clone)]
pub struct QueueEstimatorConfig {
    /// Spatial bin size in meters.
    pub bin_size: f64,
    /// Furthest distance considered.
    pub max_distance: f64,
    /// Below this speed a vehicle counts as stopped (m/s).
    pub speed_threshold: f64,
    /// Saturation discharge rate in vehicles per second.
    pub discharge_rate: f64,
}

impl Default for QueueEstimatorConfig {
    fn default() -> Self {
        Self {
            bin_size: 5.0,
            max_distance: 100.0,
            speed_threshold: 0.5,
            discharge_rate: 0.5,
        }
    }
}

/// Average stopped-vehicle headway used for the discharge estimate (m).
const VEHICLE_HEADWAY: f64 = 7.0;

pub struct QueueEstimator {
    config: QueueEstimatorConfig,
    num_bins: usize,
}

impl QueueEstimator {
    pub fn new(config: QueueEstimatorConfig) -> Self {
        let num_bins = (config.max_distance / config.bin_size).ceil() as usize;
        Self { config, num_bins }
    }

    /// Bin the stopped vehicles and extract contiguous queue segments,
    /// nearest the stop line first. Returns the extent of the nearest
    /// segment (the operative queue) plus all segments.
    pub fn estimate(
        &self,
        distances: &[f64],
        speeds: &[f64],
    ) -> (f64, Vec<QueueSegment>) {
        let mut occupancy = vec![0usize; self.num_bins];
        for (&d, &s) in distances.iter().zip(speeds.iter()) {
            if s < self.config.speed_threshold && d >= 0.0 && d <= self.config.max_distance {
                let bin = ((d / self.config.bin_size) as usize).min(self.num_bins - 1);
                occupancy[bin] += 1;
            }
        }

        let mut segments = Vec::new();
        let mut run_start: Option<usize> = None;
        for (i, &count) in occupancy.iter().enumerate() {
            match (count > 0, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(start)) => {
                    segments.push(self.segment(start, i, &occupancy));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            segments.push(self.segment(start, self.num_bins, &occupancy));
        }

        let queue_length = segments.first().map_or(0.0, |s| s.end_distance);
        (queue_length, segments)
    }

    fn segment(&self, start_bin: usize, end_bin: usize, occupancy: &[usize]) -> QueueSegment {
        let start_distance = start_bin as f64 * self.config.bin_size;
        let end_distance = end_bin as f64 * self.config.bin_size;
        let vehicle_count = occupancy[start_bin..end_bin].iter().sum();
        let length = end_distance - start_distance;
        QueueSegment {
            start_distance,
            end_distance,
            vehicle_count,
            density: if length > 0.0 {
                vehicle_count as f64 / length
            } else {
                0.0
            },
        }
    }

    /// Rough time to discharge a queue of the given extent, assuming
    /// `VEHICLE_HEADWAY` spacing and the configured discharge rate.
    pub fn estimate_clear_time(&self, queue_length: f64) -> f64 {
        if self.config.discharge_rate <= 0.0 {
            return 0.0;
        }
        (queue_length / VEHICLE_HEADWAY) / self.config.discharge_rate
    }
}

impl Default for QueueEstimator {
    fn default() -> Self {
        Self::new(QueueEstimatorConfig::default())
    }
}
