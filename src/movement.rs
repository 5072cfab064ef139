//! Movement classification for adaptive sampling.
//!
//! Turns a pair of consecutive position samples into a movement state and the
//! sampling policy the tracker should run with. The classifier is a pure
//! function so it can be tested without a live location source.

use serde::{Deserialize, Serialize};

use crate::geo_utils::distance_km;
use crate::{Position, ProximityError, Result};

/// Slack on the noise floor (1 micrometer) so a step of exactly the floor
/// distance is noise regardless of floating-point rounding.
const NOISE_FLOOR_SLACK_KM: f64 = 1e-9;

/// Coarse movement state of the tracked device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MovementState {
    Stationary,
    Walking,
    Vehicle,
    #[default]
    Unknown,
}

impl MovementState {
    pub fn is_moving(&self) -> bool {
        matches!(self, MovementState::Walking | MovementState::Vehicle)
    }
}

/// Result of classifying one sample against its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub movement_state: MovementState,
    pub recommended_interval_ms: u64,
    pub recommended_high_accuracy: bool,
}

/// Thresholds and intervals used by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MovementConfig {
    /// Displacement below which consecutive samples count as GPS noise.
    /// Default: 0.01 km (10 meters, consumer GPS noise floor)
    pub movement_noise_floor_km: f64,

    /// Speed above which a moving device is classified as in a vehicle.
    /// Default: 5.0 m/s
    pub vehicle_speed_mps: f64,

    /// Sampling interval with no previous sample or when stationary.
    /// Default: 60000 ms
    pub stationary_interval_ms: u64,

    /// Default: 15000 ms
    pub walking_interval_ms: u64,

    /// Default: 5000 ms
    pub vehicle_interval_ms: u64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            movement_noise_floor_km: 0.01,
            vehicle_speed_mps: 5.0,
            stationary_interval_ms: 60_000,
            walking_interval_ms: 15_000,
            vehicle_interval_ms: 5_000,
        }
    }
}

impl MovementConfig {
    /// Parse from JSON; missing fields fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.movement_noise_floor_km.is_finite() && self.movement_noise_floor_km >= 0.0) {
            return Err(ProximityError::config("movementNoiseFloorKm must be >= 0"));
        }
        if !(self.vehicle_speed_mps.is_finite() && self.vehicle_speed_mps >= 0.0) {
            return Err(ProximityError::config("vehicleSpeedMps must be >= 0"));
        }
        if self.stationary_interval_ms == 0
            || self.walking_interval_ms == 0
            || self.vehicle_interval_ms == 0
        {
            return Err(ProximityError::config("sampling intervals must be non-zero"));
        }
        Ok(())
    }

    /// Classify `current` against `previous` using these thresholds.
    pub fn classify(&self, previous: Option<&Position>, current: &Position) -> Classification {
        let Some(previous) = previous else {
            return Classification {
                movement_state: MovementState::Unknown,
                recommended_interval_ms: self.stationary_interval_ms,
                recommended_high_accuracy: false,
            };
        };

        let moved_km = distance_km(
            previous.latitude,
            previous.longitude,
            current.latitude,
            current.longitude,
        );

        if moved_km <= self.movement_noise_floor_km + NOISE_FLOOR_SLACK_KM {
            return Classification {
                movement_state: MovementState::Stationary,
                recommended_interval_ms: self.stationary_interval_ms,
                recommended_high_accuracy: false,
            };
        }

        // Unknown speed is treated as walking pace
        match current.speed_mps {
            Some(speed) if speed > self.vehicle_speed_mps => Classification {
                movement_state: MovementState::Vehicle,
                recommended_interval_ms: self.vehicle_interval_ms,
                recommended_high_accuracy: true,
            },
            _ => Classification {
                movement_state: MovementState::Walking,
                recommended_interval_ms: self.walking_interval_ms,
                recommended_high_accuracy: true,
            },
        }
    }
}

/// Classify with the default thresholds.
///
/// # Example
/// ```
/// use proximity_engine::{classify, MovementState, Position};
///
/// let a = Position::new(37.7749, -122.4194, 5.0, 0);
/// let b = Position::new(37.7749, -122.4194, 5.0, 1_000);
/// assert_eq!(classify(Some(&a), &b).movement_state, MovementState::Stationary);
/// ```
pub fn classify(previous: Option<&Position>, current: &Position) -> Classification {
    MovementConfig::default().classify(previous, current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Position {
        Position::new(37.7749, -122.4194, 5.0, 0)
    }

    /// A point ~50 m north of `base()`.
    fn fifty_meters_north(speed: Option<f64>) -> Position {
        let mut p = Position::new(37.7749 + 0.00045, -122.4194, 5.0, 10_000);
        p.speed_mps = speed;
        p
    }

    #[test]
    fn test_no_previous_is_unknown() {
        let c = classify(None, &base());
        assert_eq!(c.movement_state, MovementState::Unknown);
        assert_eq!(c.recommended_interval_ms, 60_000);
        assert!(!c.recommended_high_accuracy);
    }

    #[test]
    fn test_zero_distance_is_stationary() {
        let c = classify(Some(&base()), &base());
        assert_eq!(c.movement_state, MovementState::Stationary);
        assert_eq!(c.recommended_interval_ms, 60_000);
        assert!(!c.recommended_high_accuracy);
    }

    #[test]
    fn test_fast_movement_is_vehicle() {
        let c = classify(Some(&base()), &fifty_meters_north(Some(8.0)));
        assert_eq!(c.movement_state, MovementState::Vehicle);
        assert_eq!(c.recommended_interval_ms, 5_000);
        assert!(c.recommended_high_accuracy);
    }

    #[test]
    fn test_slow_movement_is_walking() {
        let c = classify(Some(&base()), &fifty_meters_north(Some(1.0)));
        assert_eq!(c.movement_state, MovementState::Walking);
        assert_eq!(c.recommended_interval_ms, 15_000);
        assert!(c.recommended_high_accuracy);
    }

    #[test]
    fn test_unknown_speed_is_walking() {
        let c = classify(Some(&base()), &fifty_meters_north(None));
        assert_eq!(c.movement_state, MovementState::Walking);
    }

    #[test]
    fn test_speed_at_threshold_is_walking() {
        let c = classify(Some(&base()), &fifty_meters_north(Some(5.0)));
        assert_eq!(c.movement_state, MovementState::Walking);
    }

    #[test]
    fn test_noise_floor_ignores_speed() {
        // ~5 m apart with a bogus high speed reading stays stationary
        let mut jitter = Position::new(37.7749 + 0.000045, -122.4194, 5.0, 500);
        jitter.speed_mps = Some(20.0);
        let c = classify(Some(&base()), &jitter);
        assert_eq!(c.movement_state, MovementState::Stationary);
    }

    #[test]
    fn test_step_of_exactly_noise_floor_is_stationary() {
        let step = crate::geo_utils::meters_to_degrees(10.0);
        let moved = Position::new(37.7749 + step, -122.4194, 5.0, 500).with_speed(0.0);
        assert!((distance_km(37.7749, -122.4194, moved.latitude, moved.longitude) - 0.01).abs() < 1e-12);
        assert_eq!(classify(Some(&base()), &moved).movement_state, MovementState::Stationary);

        // Just past the floor counts as movement
        let past = Position::new(37.7749 + step * 1.01, -122.4194, 5.0, 500).with_speed(0.0);
        assert_eq!(classify(Some(&base()), &past).movement_state, MovementState::Walking);
    }

    #[test]
    fn test_config_from_json_partial() {
        let config = MovementConfig::from_json(r#"{"vehicleSpeedMps": 8.0}"#).unwrap();
        assert_eq!(config.vehicle_speed_mps, 8.0);
        assert_eq!(config.walking_interval_ms, 15_000);
        assert!(MovementConfig::from_json(r#"{"walkingIntervalMs": 0}"#).is_err());
    }
}
