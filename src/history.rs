//! Bounded location history and movement analytics.
//!
//! The tracker appends every accepted sample here. History is capped in size
//! and pruned by age, so it never grows without bound on long sessions.

use std::collections::VecDeque;

use geo::{algorithm::simplify::Simplify, Coord, LineString};
use serde::{Deserialize, Serialize};

use crate::geo_utils::haversine_distance;
use crate::movement::MovementState;
use crate::Position;

/// Default number of samples retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// One accepted sample with the state it was classified into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub position: Position,
    pub movement_state: MovementState,
}

/// Summary of recent movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationAnalytics {
    /// Path length over the window in meters
    pub total_distance_meters: f64,
    pub location_updates: u32,
    pub average_accuracy_meters: f64,
    pub current_movement_state: MovementState,
    pub time_stationary_ms: i64,
    pub time_walking_ms: i64,
    pub time_vehicle_ms: i64,
}

/// Size-capped, time-ordered sample history.
#[derive(Debug, Clone)]
pub struct LocationHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl LocationHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, dropping the oldest one when full.
    pub fn push(&mut self, position: Position, movement_state: MovementState) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            position,
            movement_state,
        });
    }

    /// Drop samples captured before `cutoff_ms`. Returns how many were removed.
    pub fn prune_older_than(&mut self, cutoff_ms: i64) -> usize {
        let before = self.entries.len();
        while self
            .entries
            .front()
            .is_some_and(|e| e.position.captured_at_ms < cutoff_ms)
        {
            self.entries.pop_front();
        }
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Movement analytics over samples captured at or after `since_ms`.
    ///
    /// Time between two consecutive samples is attributed to the state of the
    /// earlier one. Returns `None` when the window holds no samples.
    pub fn analytics(&self, since_ms: i64) -> Option<LocationAnalytics> {
        let window: Vec<&HistoryEntry> = self
            .entries
            .iter()
            .filter(|e| e.position.captured_at_ms >= since_ms)
            .collect();

        let last = window.last()?;

        let mut total_distance = 0.0;
        let mut time_stationary = 0;
        let mut time_walking = 0;
        let mut time_vehicle = 0;

        for pair in window.windows(2) {
            let (prev, curr) = (pair[0], pair[1]);
            total_distance += haversine_distance(&prev.position, &curr.position);

            let elapsed = (curr.position.captured_at_ms - prev.position.captured_at_ms).max(0);
            match prev.movement_state {
                MovementState::Stationary => time_stationary += elapsed,
                MovementState::Walking => time_walking += elapsed,
                MovementState::Vehicle => time_vehicle += elapsed,
                MovementState::Unknown => {}
            }
        }

        let accuracy_sum: f64 = window.iter().map(|e| e.position.accuracy_meters).sum();

        Some(LocationAnalytics {
            total_distance_meters: total_distance,
            location_updates: window.len() as u32,
            average_accuracy_meters: accuracy_sum / window.len() as f64,
            current_movement_state: last.movement_state,
            time_stationary_ms: time_stationary,
            time_walking_ms: time_walking,
            time_vehicle_ms: time_vehicle,
        })
    }

    /// Simplified trail for map display as `[lat, lng]` pairs.
    ///
    /// Uses Douglas-Peucker with `tolerance` in degrees (0.0001 is ~11 m).
    pub fn trail(&self, tolerance: f64) -> Vec<[f64; 2]> {
        if self.entries.len() < 3 {
            return self
                .entries
                .iter()
                .map(|e| [e.position.latitude, e.position.longitude])
                .collect();
        }

        let coords: Vec<Coord> = self
            .entries
            .iter()
            .map(|e| Coord {
                x: e.position.longitude,
                y: e.position.latitude,
            })
            .collect();

        LineString::new(coords)
            .simplify(&tolerance)
            .coords()
            .map(|c| [c.y, c.x])
            .collect()
    }
}

impl Default for LocationHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
