//! # Proximity Engine
//!
//! Adaptive location tracking and nearby-user detection for location-based chat.
//!
//! This library provides:
//! - Great-circle distance and bearing ([`geo_utils`])
//! - Movement classification driving power-aware sampling ([`movement`])
//! - An adaptive location tracker over a pluggable provider ([`tracker`])
//! - Nearby-set maintenance with enter/leave events ([`proximity`])
//! - Radius queries and room geofences ([`nearby`], [`geofence`])
//! - Auxiliary RSSI / RTT distance estimators ([`ranging`])
//!
//! ## Features
//!
//! - **`parallel`** - Parallel distance pass over large rosters with rayon
//! - **`rtt`** - Async round-trip-time ranging (enabled by default)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use proximity_engine::{Position, ProximityEngine, UserLocationRecord};
//!
//! let mut engine = ProximityEngine::new();
//! let me = Position::new(37.7749, -122.4194, 5.0, 0);
//! let roster = vec![UserLocationRecord::new(
//!     "u1",
//!     Some(Position::new(37.7750, -122.4195, 5.0, 0)),
//!     true,
//! )];
//!
//! let evaluation = engine.evaluate(&me, &roster).unwrap();
//! assert_eq!(evaluation.entered.len(), 1);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{ProximityError, Result};

// Geographic utilities (distance, bearing, validation)
pub mod geo_utils;
pub use geo_utils::{bearing_degrees, distance_km};

// Movement classification
pub mod movement;
pub use movement::{classify, Classification, MovementConfig, MovementState};

// Bounded sample history and analytics
pub mod history;
pub use history::{HistoryEntry, LocationAnalytics, LocationHistory};

// Adaptive location tracker
pub mod tracker;
pub use tracker::{
    LocationProvider, LocationTracker, StartOptions, SubscriptionId, TrackerStatus,
    TrackingConfig, TrackingState, UpdateCallback, WatchOptions,
};

// Nearby-set maintenance and observers
pub mod proximity;
pub use proximity::{
    Evaluation, ObserverHandle, ProximityConfig, ProximityEngine, ProximityEvent,
    ProximityEventKind, ProximityRecord,
};

// Radius queries over a roster (R-tree prefilter)
pub mod nearby;
pub use nearby::{find_nearby_users, NearbyUser};

// Room geofences
pub mod geofence;
pub use geofence::{Geofence, GeofenceEvent, GeofenceEventKind, GeofenceRegistry};

// Auxiliary distance estimators
pub mod ranging;
pub use ranging::{RangingConfig, RangingKind, RangingSample, RssiRanging};

/// Initialize logging for Android hosts.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("ProximityEngine"),
    );
}

#[cfg(not(target_os = "android"))]
pub fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// An immutable location sample from a location provider.
///
/// # Example
/// ```
/// use proximity_engine::Position;
/// let p = Position::new(51.5074, -0.1278, 8.0, 1_700_000_000_000).with_speed(1.4);
/// assert!(p.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy radius; 0 means unknown
    pub accuracy_meters: f64,
    /// Capture time, milliseconds since the Unix epoch
    pub captured_at_ms: i64,
    pub speed_mps: Option<f64>,
    pub heading_degrees: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64, captured_at_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            captured_at_ms,
            speed_mps: None,
            heading_degrees: None,
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_heading(mut self, heading_degrees: f64) -> Self {
        self.heading_degrees = Some(heading_degrees);
        self
    }

    /// Check coordinates and accuracy, returning `InvalidArgument` on failure.
    pub fn validate(&self) -> Result<()> {
        geo_utils::validate_coordinates(self.latitude, self.longitude)?;
        if !self.accuracy_meters.is_finite() || self.accuracy_meters < 0.0 {
            return Err(ProximityError::invalid_argument(format!(
                "accuracy {} must be a non-negative number",
                self.accuracy_meters
            )));
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Accuracy is usable only when known and no worse than `max_meters`.
    pub fn has_reliable_accuracy(&self, max_meters: f64) -> bool {
        self.accuracy_meters > 0.0 && self.accuracy_meters <= max_meters
    }
}

/// Roster entry for another user, owned by the friends/room membership service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocationRecord {
    pub user_id: String,
    pub position: Option<Position>,
    pub location_sharing_enabled: bool,
}

impl UserLocationRecord {
    pub fn new(user_id: impl Into<String>, position: Option<Position>, sharing: bool) -> Self {
        Self {
            user_id: user_id.into(),
            position,
            location_sharing_enabled: sharing,
        }
    }

    /// Position to evaluate, if the user shares one.
    pub fn shared_position(&self) -> Option<&Position> {
        if self.location_sharing_enabled {
            self.position.as_ref()
        } else {
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_validation() {
        assert!(Position::new(51.5074, -0.1278, 5.0, 0).is_valid());
        assert!(Position::new(51.5074, -0.1278, 0.0, 0).is_valid());
        assert!(!Position::new(91.0, 0.0, 5.0, 0).is_valid());
        assert!(!Position::new(0.0, 181.0, 5.0, 0).is_valid());
        assert!(!Position::new(f64::NAN, 0.0, 5.0, 0).is_valid());
        assert!(!Position::new(0.0, 0.0, -1.0, 0).is_valid());
    }

    #[test]
    fn test_reliable_accuracy() {
        let p = Position::new(0.0, 0.0, 0.0, 0);
        assert!(!p.has_reliable_accuracy(50.0));
        let p = Position::new(0.0, 0.0, 20.0, 0);
        assert!(p.has_reliable_accuracy(50.0));
        assert!(!p.has_reliable_accuracy(10.0));
    }

    #[test]
    fn test_shared_position() {
        let pos = Position::new(1.0, 2.0, 5.0, 0);
        assert!(UserLocationRecord::new("a", Some(pos), true).shared_position().is_some());
        assert!(UserLocationRecord::new("a", Some(pos), false).shared_position().is_none());
        assert!(UserLocationRecord::new("a", None, true).shared_position().is_none());
    }

    #[test]
    fn test_position_json_camel_case() {
        let p = Position::new(1.0, 2.0, 3.0, 4).with_heading(90.0);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"capturedAtMs\":4"));
        assert!(json.contains("\"headingDegrees\":90.0"));
    }
}
