//! # Room Geofences
//!
//! Circular geofences attached to chat rooms. Each check compares a user's
//! position with every active geofence and reports transitions only: a user
//! already inside stays silent until they leave.

use std::collections::{BTreeMap, HashSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{distance_km, validate_coordinates};
use crate::{Position, ProximityError, Result};

/// A circular area bound to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub room_id: String,
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub radius_meters: f64,
    pub name: Option<String>,
    /// Inactive geofences are skipped by [`GeofenceRegistry::check`]
    pub active: bool,
}

impl Geofence {
    /// Distance from the center in meters.
    pub fn distance_to_center_meters(&self, position: &Position) -> f64 {
        distance_km(
            self.center_latitude,
            self.center_longitude,
            position.latitude,
            position.longitude,
        ) * 1000.0
    }

    /// Inclusive: a point exactly on the boundary is inside.
    pub fn contains(&self, position: &Position) -> bool {
        self.distance_to_center_meters(position) <= self.radius_meters
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GeofenceEventKind {
    Entered,
    Exited,
}

/// A user crossed a geofence boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceEvent {
    pub user_id: String,
    pub room_id: String,
    pub kind: GeofenceEventKind,
    pub distance_to_center_meters: f64,
    pub timestamp_ms: i64,
}

/// Geofences keyed by room, plus who is currently inside which.
#[derive(Debug, Default)]
pub struct GeofenceRegistry {
    geofences: BTreeMap<String, Geofence>,
    /// (user_id, room_id) pairs currently inside
    inside: HashSet<(String, String)>,
}

impl GeofenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace the geofence for `room_id`.
    ///
    /// Replacing keeps existing inside/outside status; the next check reports
    /// any transition the new shape causes.
    pub fn create_geofence(
        &mut self,
        room_id: impl Into<String>,
        center_latitude: f64,
        center_longitude: f64,
        radius_meters: f64,
        name: Option<String>,
    ) -> Result<()> {
        let room_id = room_id.into();
        if room_id.is_empty() {
            return Err(ProximityError::invalid_argument("geofence with empty room id"));
        }
        validate_coordinates(center_latitude, center_longitude)?;
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(ProximityError::invalid_argument(format!(
                "geofence radius {} must be positive",
                radius_meters
            )));
        }

        info!(
            "[Geofence] Created geofence for room {} at ({:.5}, {:.5}) with radius {}m",
            room_id, center_latitude, center_longitude, radius_meters
        );

        self.geofences.insert(
            room_id.clone(),
            Geofence {
                room_id,
                center_latitude,
                center_longitude,
                radius_meters,
                name,
                active: true,
            },
        );
        Ok(())
    }

    /// Remove a geofence and forget every user's status for it.
    pub fn remove_geofence(&mut self, room_id: &str) -> bool {
        if self.geofences.remove(room_id).is_none() {
            return false;
        }
        self.inside.retain(|(_, room)| room != room_id);
        info!("[Geofence] Removed geofence for room {}", room_id);
        true
    }

    /// Enable or disable a geofence. Returns false for unknown rooms.
    pub fn set_active(&mut self, room_id: &str, active: bool) -> bool {
        match self.geofences.get_mut(room_id) {
            Some(geofence) => {
                geofence.active = active;
                true
            }
            None => false,
        }
    }

    /// Check `position` against every active geofence.
    ///
    /// Events come out in room-id order.
    pub fn check(&mut self, user_id: &str, position: &Position) -> Result<Vec<GeofenceEvent>> {
        if user_id.is_empty() {
            return Err(ProximityError::invalid_argument("empty user id"));
        }
        position.validate()?;

        let mut events = Vec::new();
        for geofence in self.geofences.values().filter(|g| g.active) {
            let distance = geofence.distance_to_center_meters(position);
            let is_inside = distance <= geofence.radius_meters;
            let key = (user_id.to_string(), geofence.room_id.clone());
            let was_inside = self.inside.contains(&key);

            if is_inside == was_inside {
                continue;
            }

            let kind = if is_inside {
                self.inside.insert(key);
                GeofenceEventKind::Entered
            } else {
                self.inside.remove(&key);
                GeofenceEventKind::Exited
            };

            info!(
                "[Geofence] User {} {:?} geofence for room {} ({:.1}m from center)",
                user_id, kind, geofence.room_id, distance
            );

            events.push(GeofenceEvent {
                user_id: user_id.to_string(),
                room_id: geofence.room_id.clone(),
                kind,
                distance_to_center_meters: distance,
                timestamp_ms: position.captured_at_ms,
            });
        }

        debug!(
            "[Geofence] Checked user {} against {} geofences: {} events",
            user_id,
            self.geofences.len(),
            events.len()
        );

        Ok(events)
    }

    pub fn get(&self, room_id: &str) -> Option<&Geofence> {
        self.geofences.get(room_id)
    }

    pub fn geofences(&self) -> impl Iterator<Item = &Geofence> {
        self.geofences.values()
    }

    /// Whether `user_id` was inside `room_id` at their last check.
    pub fn is_inside(&self, user_id: &str, room_id: &str) -> bool {
        self.inside
            .contains(&(user_id.to_string(), room_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.geofences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geofences.is_empty()
    }

    pub fn clear(&mut self) {
        self.geofences.clear();
        self.inside.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENTER: (f64, f64) = (40.7580, -73.9855); // Times Square

    fn at(lat: f64, lng: f64, t: i64) -> Position {
        Position::new(lat, lng, 5.0, t)
    }

    fn registry() -> GeofenceRegistry {
        let mut registry = GeofenceRegistry::new();
        registry
            .create_geofence("room-1", CENTER.0, CENTER.1, 200.0, Some("Meetup".into()))
            .unwrap();
        registry
    }

    #[test]
    fn test_enter_then_exit() {
        let mut registry = registry();

        let events = registry.check("alice", &at(CENTER.0, CENTER.1, 1)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, GeofenceEventKind::Entered);
        assert_eq!(events[0].timestamp_ms, 1);
        assert!(registry.is_inside("alice", "room-1"));

        // Still inside: no event
        let events = registry.check("alice", &at(CENTER.0 + 0.0005, CENTER.1, 2)).unwrap();
        assert!(events.is_empty());

        let events = registry.check("alice", &at(CENTER.0 + 0.01, CENTER.1, 3)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, GeofenceEventKind::Exited);
        assert!(events[0].distance_to_center_meters > 1000.0);
        assert!(!registry.is_inside("alice", "room-1"));
    }

    #[test]
    fn test_boundary_is_inside() {
        let mut registry = GeofenceRegistry::new();
        let edge = at(CENTER.0 + 0.001, CENTER.1, 0);
        let radius = distance_km(CENTER.0, CENTER.1, edge.latitude, edge.longitude) * 1000.0;
        registry
            .create_geofence("room-1", CENTER.0, CENTER.1, radius, None)
            .unwrap();
        let events = registry.check("bob", &edge).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, GeofenceEventKind::Entered);
    }

    #[test]
    fn test_inactive_skipped() {
        let mut registry = registry();
        assert!(registry.set_active("room-1", false));
        assert!(registry.check("alice", &at(CENTER.0, CENTER.1, 0)).unwrap().is_empty());
        assert!(!registry.set_active("missing", true));
    }

    #[test]
    fn test_remove_forgets_status() {
        let mut registry = registry();
        registry.check("alice", &at(CENTER.0, CENTER.1, 0)).unwrap();
        assert!(registry.remove_geofence("room-1"));
        assert!(!registry.is_inside("alice", "room-1"));
        assert!(!registry.remove_geofence("room-1"));

        // Recreated geofence reports a fresh entry
        registry
            .create_geofence("room-1", CENTER.0, CENTER.1, 200.0, None)
            .unwrap();
        let events = registry.check("alice", &at(CENTER.0, CENTER.1, 1)).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_validation() {
        let mut registry = GeofenceRegistry::new();
        assert!(registry.create_geofence("", 0.0, 0.0, 10.0, None).is_err());
        assert!(registry.create_geofence("r", 91.0, 0.0, 10.0, None).is_err());
        assert!(registry.create_geofence("r", 0.0, 0.0, 0.0, None).is_err());
        assert!(registry.create_geofence("r", 0.0, 0.0, f64::INFINITY, None).is_err());
        assert!(registry.is_empty());

        let mut registry = self::registry();
        assert!(registry.check("", &at(CENTER.0, CENTER.1, 0)).is_err());
        assert!(registry.check("a", &at(0.0, 200.0, 0)).is_err());
    }

    #[test]
    fn test_events_per_user() {
        let mut registry = registry();
        registry
            .create_geofence("room-2", CENTER.0 + 0.0005, CENTER.1, 200.0, None)
            .unwrap();
        let events = registry.check("alice", &at(CENTER.0, CENTER.1, 0)).unwrap();
        let rooms: Vec<&str> = events.iter().map(|e| e.room_id.as_str()).collect();
        assert_eq!(rooms, vec!["room-1", "room-2"]);

        // Another user has independent status
        assert_eq!(registry.check("bob", &at(CENTER.0, CENTER.1, 0)).unwrap().len(), 2);
    }
}
