// src/types.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub intersection: IntersectionConfig,
    pub estimation: EstimationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntersectionConfig {
    pub lanes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimationConfig {
    pub enable_smoothing: bool,
    pub history_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            intersection: IntersectionConfig {
                lanes: vec![
                    "N_in_0".to_string(),
                    "S_in_0".to_string(),
                    "E_in_0".to_string(),
                    "W_in_0".to_string(),
                ],
            },
            estimation: EstimationConfig {
                enable_smoothing: true,
                history_length: 50,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

/// One perceived vehicle at one timestep: the boundary between the
/// external perception collaborator and state estimation.
///
/// Field guarantees (perception contract):
///   - `track_id` is stable across frames for the same physical vehicle
///   - `lane_id` is None when the vehicle is not in any approach lane
///   - `distance_to_stop_line` is meters ahead of the stop line, >= 0
///     for lane-assigned vehicles; negative values mean "not valid"
///   - `is_emergency` is conservative (false negatives acceptable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleObservation {
    pub track_id: u32,
    pub is_emergency: bool,
    pub confidence: f32,
    pub position: (f64, f64),
    pub velocity: (f64, f64),
    pub lane_id: Option<String>,
    pub distance_to_stop_line: f64,
    pub timestamp: f64,
}

impl VehicleObservation {
    /// Speed magnitude in m/s. Non-finite velocity components (a noisy
    /// perception source is tolerated, not rejected) collapse to 0.0.
    pub fn speed(&self) -> f64 {
        let speed = (self.velocity.0.powi(2) + self.velocity.1.powi(2)).sqrt();
        if speed.is_finite() {
            speed
        } else {
            0.0
        }
    }
}

/// Cardinal approach into the intersection. Lane ids carry their
/// approach as a prefix letter: "N_in_0" belongs to North.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Approach {
    North,
    South,
    East,
    West,
}

impl Approach {
    pub const ALL: [Approach; 4] = [
        Approach::North,
        Approach::South,
        Approach::East,
        Approach::West,
    ];

    pub fn from_lane_id(lane_id: &str) -> Option<Approach> {
        match lane_id.split('_').next() {
            Some("N") => Some(Approach::North),
            Some("S") => Some(Approach::South),
            Some("E") => Some(Approach::East),
            Some("W") => Some(Approach::West),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Approach::North => "N",
            Approach::South => "S",
            Approach::East => "E",
            Approach::West => "W",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approach_from_lane_id() {
        assert_eq!(Approach::from_lane_id("N_in_0"), Some(Approach::North));
        assert_eq!(Approach::from_lane_id("W_in_3"), Some(Approach::West));
        assert_eq!(Approach::from_lane_id("X_in_0"), None);
        assert_eq!(Approach::from_lane_id(""), None);
    }

    #[test]
    fn test_speed_magnitude() {
        let obs = VehicleObservation {
            track_id: 1,
            is_emergency: false,
            confidence: 1.0,
            position: (0.0, 0.0),
            velocity: (3.0, 4.0),
            lane_id: Some("N_in_0".to_string()),
            distance_to_stop_line: 10.0,
            timestamp: 0.0,
        };
        assert!((obs.speed() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_speed_tolerates_nan_velocity() {
        let obs = VehicleObservation {
            track_id: 2,
            is_emergency: false,
            confidence: 1.0,
            position: (0.0, 0.0),
            velocity: (f64::NAN, 1.0),
            lane_id: None,
            distance_to_stop_line: -1.0,
            timestamp: 0.0,
        };
        assert_eq!(obs.speed(), 0.0);
    }
}
