// src/estimation/smoothing.rs
//
// Exponential moving averages for noisy per-lane traffic metrics.
// The first sample seeds the filter (no smoothing lag), after which
// smoothed_t = alpha * raw_t + (1 - alpha) * smoothed_{t-1}.

use std::collections::HashMap;

/// Scalar EMA filter keyed by lane id.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    state: HashMap<String, f64>,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            state: HashMap::new(),
        }
    }

    pub fn update(&mut self, key: &str, value: f64) -> f64 {
        let smoothed = match self.state.get(key) {
            None => value,
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
        };
        self.state.insert(key.to_string(), smoothed);
        smoothed
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.state.get(key).copied()
    }

    pub fn reset(&mut self) {
        self.state.clear();
    }
}

/// Smoothed values for the fixed metric subset of one lane.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedMetrics {
    pub queue_length: f64,
    pub density: f64,
    pub avg_waiting_time: f64,
    pub vehicle_count: f64,
}

/// Per-metric EMA bank with fixed smoothing factors.
///
/// Factors are tuned per signal character, not configurable:
///   - queue_length 0.3: moderate, balance stability and response
///   - density 0.4: lighter, density changes quickly
///   - avg_waiting_time 0.2: heavy, saw-tooth noise from departures
///   - vehicle_count 0.5: light, discrete jumps need responsiveness
///
/// Everything else (emergency fields, stopped count, avg_speed, raw
/// arrays) passes through the smoothing stage untouched.
#[derive(Debug, Clone)]
pub struct MetricSmoother {
    queue_length: Ema,
    density: Ema,
    avg_waiting_time: Ema,
    vehicle_count: Ema,
}

pub const ALPHA_QUEUE_LENGTH: f64 = 0.3;
pub const ALPHA_DENSITY: f64 = 0.4;
pub const ALPHA_WAITING_TIME: f64 = 0.2;
pub const ALPHA_VEHICLE_COUNT: f64 = 0.5;

impl MetricSmoother {
    pub fn new() -> Self {
        Self {
            queue_length: Ema::new(ALPHA_QUEUE_LENGTH),
            density: Ema::new(ALPHA_DENSITY),
            avg_waiting_time: Ema::new(ALPHA_WAITING_TIME),
            vehicle_count: Ema::new(ALPHA_VEHICLE_COUNT),
        }
    }

    pub fn update(
        &mut self,
        lane_id: &str,
        queue_length: f64,
        density: f64,
        avg_waiting_time: f64,
        vehicle_count: f64,
    ) -> SmoothedMetrics {
        SmoothedMetrics {
            queue_length: self.queue_length.update(lane_id, queue_length),
            density: self.density.update(lane_id, density),
            avg_waiting_time: self.avg_waiting_time.update(lane_id, avg_waiting_time),
            vehicle_count: self.vehicle_count.update(lane_id, vehicle_count),
        }
    }

    /// Drop all per-lane filter state; the next sample re-seeds.
    pub fn reset(&mut self) {
        self.queue_length.reset();
        self.density.reset();
        self.avg_waiting_time.reset();
        self.vehicle_count.reset();
    }
}

impl Default for MetricSmoother {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_passes_through() {
        let mut ema = Ema::new(0.3);
        assert_eq!(ema.update("N_in_0", 12.5), 12.5);
    }

    #[test]
    fn test_ema_update_formula() {
        let mut ema = Ema::new(0.3);
        ema.update("N_in_0", 10.0);
        let smoothed = ema.update("N_in_0", 20.0);
        assert!((smoothed - 13.0).abs() < 1e-9);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut ema = Ema::new(0.3);
        ema.update("N_in_0", 10.0);
        assert_eq!(ema.update("S_in_0", 50.0), 50.0);
        assert_eq!(ema.get("N_in_0"), Some(10.0));
    }

    #[test]
    fn test_constant_input_converges_to_constant() {
        let mut ema = Ema::new(0.2);
        ema.update("N_in_0", 0.0);
        let mut last = 0.0;
        for _ in 0..200 {
            last = ema.update("N_in_0", 8.0);
        }
        assert!((last - 8.0).abs() < 1e-6, "EMA should converge, got {}", last);
    }

    #[test]
    fn test_reset_reseeds_on_next_sample() {
        let mut smoother = MetricSmoother::new();
        smoother.update("N_in_0", 10.0, 5.0, 3.0, 5.0);
        smoother.update("N_in_0", 30.0, 5.0, 3.0, 5.0);
        smoother.reset();

        let metrics = smoother.update("N_in_0", 30.0, 5.0, 3.0, 5.0);
        assert_eq!(metrics.queue_length, 30.0);
    }

    #[test]
    fn test_metrics_use_their_own_factors() {
        let mut smoother = MetricSmoother::new();
        smoother.update("N_in_0", 0.0, 0.0, 0.0, 0.0);
        let metrics = smoother.update("N_in_0", 10.0, 10.0, 10.0, 10.0);

        assert!((metrics.queue_length - 3.0).abs() < 1e-9);
        assert!((metrics.density - 4.0).abs() < 1e-9);
        assert!((metrics.avg_waiting_time - 2.0).abs() < 1e-9);
        assert!((metrics.vehicle_count - 5.0).abs() < 1e-9);
    }
}
