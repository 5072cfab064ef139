//! # Proximity Engine
//!
//! Maintains the set of users within the proximity threshold of the tracked
//! device and reports who entered and who left on every evaluation.
//!
//! ## Invariant
//!
//! After each [`ProximityEngine::evaluate`] call the record set is exactly the
//! subset of that call's roster whose distance is within the threshold. No
//! record survives past one evaluation once its user is out of range, stops
//! sharing, or disappears from the roster.
//!
//! ## Ranging override
//!
//! When either party's GPS accuracy is coarse (unknown, or worse than
//! `coarse_accuracy_meters`) and a fresh [`RangingSample`] exists for the peer,
//! the sample's distance replaces the geodesic one. Bearing stays geodesic.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::geo_utils::{bearing_degrees, distance_km};
use crate::ranging::{RangingKind, RangingSample};
use crate::{Position, ProximityError, Result, UserLocationRecord};

// ============================================================================
// Types
// ============================================================================

/// A user currently within the proximity threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityRecord {
    pub user_id: String,
    pub distance_km: f64,
    pub bearing_degrees: f64,
    pub last_updated_ms: i64,
    /// Set when a ranging sample overrode the geodesic distance
    pub ranged_by: Option<RangingKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProximityEventKind {
    Entered,
    Left,
}

/// Enter/leave notification delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityEvent {
    pub kind: ProximityEventKind,
    pub record: ProximityRecord,
}

/// Outcome of a single evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// Users newly in range, in roster order
    pub entered: Vec<ProximityRecord>,
    /// Users no longer in range, with their last known record
    pub left: Vec<ProximityRecord>,
    /// Every user in range after this evaluation, in roster order
    pub current: Vec<ProximityRecord>,
}

impl Evaluation {
    pub fn has_changes(&self) -> bool {
        !self.entered.is_empty() || !self.left.is_empty()
    }

    /// Events in delivery order: entered first, then left.
    pub fn events(&self) -> Vec<ProximityEvent> {
        let entered = self.entered.iter().map(|r| ProximityEvent {
            kind: ProximityEventKind::Entered,
            record: r.clone(),
        });
        let left = self.left.iter().map(|r| ProximityEvent {
            kind: ProximityEventKind::Left,
            record: r.clone(),
        });
        entered.chain(left).collect()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Configuration for proximity evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProximityConfig {
    /// Maximum distance at which a user counts as nearby (inclusive).
    /// Default: 0.1 km (100 meters)
    pub proximity_threshold_km: f64,

    /// GPS accuracy worse than this makes ranging samples take precedence.
    /// Default: 50.0 meters
    pub coarse_accuracy_meters: f64,

    /// Ranging samples older than this, relative to the self position, are ignored.
    /// Default: 10000 ms
    pub ranging_max_age_ms: i64,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            proximity_threshold_km: 0.1,
            coarse_accuracy_meters: 50.0,
            ranging_max_age_ms: 10_000,
        }
    }
}

impl ProximityConfig {
    /// Parse from JSON; missing fields fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.proximity_threshold_km.is_finite() && self.proximity_threshold_km >= 0.0) {
            return Err(ProximityError::config("proximityThresholdKm must be >= 0"));
        }
        if !(self.coarse_accuracy_meters.is_finite() && self.coarse_accuracy_meters > 0.0) {
            return Err(ProximityError::config("coarseAccuracyMeters must be > 0"));
        }
        if self.ranging_max_age_ms < 0 {
            return Err(ProximityError::config("rangingMaxAgeMs must be >= 0"));
        }
        Ok(())
    }
}

/// Observer callback. An `Err` is logged and does not stop other observers.
pub type ObserverFn = Box<dyn FnMut(&ProximityEvent) -> std::result::Result<(), String> + Send>;

/// Registration handle returned by [`ProximityEngine::register_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle(u64);

impl ObserverHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Distance computed for one roster candidate.
struct Measured<'a> {
    user_id: &'a str,
    distance_km: f64,
    bearing_degrees: f64,
    ranged_by: Option<RangingKind>,
}

/// A sample is fresh within `max_age_ms` of `now_ms` on either side.
fn is_fresh(sample: &RangingSample, now_ms: i64, max_age_ms: i64) -> bool {
    (now_ms - sample.timestamp_ms).abs() <= max_age_ms
}

/// Distance and bearing to one peer, applying the ranging override.
fn measure<'a>(
    config: &ProximityConfig,
    ranging: &HashMap<String, RangingSample>,
    me: &Position,
    user_id: &'a str,
    peer: &Position,
) -> Measured<'a> {
    let bearing = bearing_degrees(me.latitude, me.longitude, peer.latitude, peer.longitude);

    let coarse = !me.has_reliable_accuracy(config.coarse_accuracy_meters)
        || !peer.has_reliable_accuracy(config.coarse_accuracy_meters);

    if coarse {
        let fresh = ranging
            .get(user_id)
            .filter(|s| is_fresh(s, me.captured_at_ms, config.ranging_max_age_ms));
        if let Some(sample) = fresh {
            return Measured {
                user_id,
                distance_km: sample.distance_meters / 1000.0,
                bearing_degrees: bearing,
                ranged_by: Some(sample.kind),
            };
        }
    }

    Measured {
        user_id,
        distance_km: distance_km(me.latitude, me.longitude, peer.latitude, peer.longitude),
        bearing_degrees: bearing,
        ranged_by: None,
    }
}

// ============================================================================
// Proximity Engine
// ============================================================================

/// Stateful nearby-set tracker.
///
/// Not designed for concurrent mutation: wrap in a mutex or drive it from a
/// single event loop. All mutating methods take `&mut self`, so evaluations
/// are serialized by construction.
pub struct ProximityEngine {
    config: ProximityConfig,
    records: BTreeMap<String, ProximityRecord>,
    ranging: HashMap<String, RangingSample>,
    observers: Vec<(ObserverHandle, ObserverFn)>,
    next_observer_id: u64,
}

impl ProximityEngine {
    /// Create an engine with the default 100 m threshold.
    pub fn new() -> Self {
        Self::with_config(ProximityConfig::default())
    }

    pub fn with_config(config: ProximityConfig) -> Self {
        Self {
            config,
            records: BTreeMap::new(),
            ranging: HashMap::new(),
            observers: Vec::new(),
            next_observer_id: 0,
        }
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Evaluate the roster against the self position.
    ///
    /// Entries with sharing disabled or without a position are skipped.
    /// Malformed input (bad coordinates, empty or duplicate user ids) is
    /// rejected with `InvalidArgument` and leaves the engine untouched.
    pub fn evaluate(
        &mut self,
        self_position: &Position,
        roster: &[UserLocationRecord],
    ) -> Result<Evaluation> {
        self_position.validate()?;
        let candidates = Self::validated_candidates(roster)?;

        let measured = self.measure_all(self_position, &candidates);
        let threshold = self.config.proximity_threshold_km;
        let now_ms = self_position.captured_at_ms;

        let mut next: BTreeMap<String, ProximityRecord> = BTreeMap::new();
        let mut evaluation = Evaluation::default();

        for m in measured {
            if m.distance_km > threshold {
                continue;
            }
            let record = ProximityRecord {
                user_id: m.user_id.to_string(),
                distance_km: m.distance_km,
                bearing_degrees: m.bearing_degrees,
                last_updated_ms: now_ms,
                ranged_by: m.ranged_by,
            };
            if !self.records.contains_key(m.user_id) {
                evaluation.entered.push(record.clone());
            }
            evaluation.current.push(record.clone());
            next.insert(record.user_id.clone(), record);
        }

        evaluation.left = self
            .records
            .values()
            .filter(|r| !next.contains_key(&r.user_id))
            .cloned()
            .collect();

        self.records = next;
        self.prune_ranging(now_ms, roster);

        debug!(
            "[ProximityEngine] Evaluated {} roster entries: {} nearby, {} entered, {} left",
            roster.len(),
            evaluation.current.len(),
            evaluation.entered.len(),
            evaluation.left.len()
        );

        if evaluation.has_changes() {
            for event in evaluation.events() {
                self.dispatch(&event);
            }
        }

        Ok(evaluation)
    }

    /// Validate the roster and return the entries that take part.
    fn validated_candidates(roster: &[UserLocationRecord]) -> Result<Vec<(&str, &Position)>> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(roster.len());
        let mut candidates = Vec::with_capacity(roster.len());

        for entry in roster {
            if entry.user_id.is_empty() {
                return Err(ProximityError::invalid_argument("roster entry with empty user id"));
            }
            if !seen.insert(entry.user_id.as_str()) {
                return Err(ProximityError::invalid_argument(format!(
                    "duplicate roster entry for user '{}'",
                    entry.user_id
                )));
            }
            if let Some(position) = entry.shared_position() {
                position.validate().map_err(|e| {
                    ProximityError::invalid_argument(format!("user '{}': {}", entry.user_id, e))
                })?;
                candidates.push((entry.user_id.as_str(), position));
            }
        }
        Ok(candidates)
    }

    #[cfg(not(feature = "parallel"))]
    fn measure_all<'a>(
        &self,
        me: &Position,
        candidates: &[(&'a str, &'a Position)],
    ) -> Vec<Measured<'a>> {
        candidates
            .iter()
            .map(|&(user_id, peer)| measure(&self.config, &self.ranging, me, user_id, peer))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn measure_all<'a>(
        &self,
        me: &Position,
        candidates: &[(&'a str, &'a Position)],
    ) -> Vec<Measured<'a>> {
        let config = &self.config;
        let ranging = &self.ranging;
        candidates
            .par_iter()
            .map(|&(user_id, peer)| measure(config, ranging, me, user_id, peer))
            .collect()
    }

    /// Forget ranging samples that went stale or whose user left the roster.
    fn prune_ranging(&mut self, now_ms: i64, roster: &[UserLocationRecord]) {
        if self.ranging.is_empty() {
            return;
        }
        let max_age = self.config.ranging_max_age_ms;
        let ids: HashSet<&str> = roster.iter().map(|e| e.user_id.as_str()).collect();
        self.ranging
            .retain(|id, s| ids.contains(id.as_str()) && is_fresh(s, now_ms, max_age));
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Register an observer, invoked synchronously once per event.
    pub fn register_observer(&mut self, observer: ObserverFn) -> ObserverHandle {
        self.next_observer_id += 1;
        let handle = ObserverHandle(self.next_observer_id);
        self.observers.push((handle, observer));
        handle
    }

    /// Remove an observer. Returns false if the handle was unknown.
    pub fn unregister_observer(&mut self, handle: ObserverHandle) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(h, _)| *h != handle);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Deliver one event to every observer, isolating failures.
    fn dispatch(&mut self, event: &ProximityEvent) {
        for (handle, observer) in self.observers.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| observer(event))) {
                Ok(Ok(())) => {}
                Ok(Err(message)) => warn!(
                    "[ProximityEngine] Observer {} failed on {:?} for {}: {}",
                    handle.id(),
                    event.kind,
                    event.record.user_id,
                    message
                ),
                Err(_) => warn!(
                    "[ProximityEngine] Observer {} panicked on {:?} for {}",
                    handle.id(),
                    event.kind,
                    event.record.user_id
                ),
            }
        }
    }

    // ========================================================================
    // Ranging Input
    // ========================================================================

    /// Store an auxiliary distance sample for a peer, replacing any older one.
    ///
    /// Empty user ids and non-finite or negative distances are rejected with
    /// `InvalidArgument`; the previous sample, if any, is kept.
    pub fn record_ranging_sample(
        &mut self,
        user_id: impl Into<String>,
        sample: RangingSample,
    ) -> Result<()> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(ProximityError::invalid_argument("ranging sample with empty user id"));
        }
        sample.validate().map_err(|e| {
            warn!("[ProximityEngine] Rejected {:?} sample for {}: {}", sample.kind, user_id, e);
            e
        })?;
        debug!(
            "[ProximityEngine] {:?} sample for {}: {:.1}m",
            sample.kind, user_id, sample.distance_meters
        );
        self.ranging.insert(user_id, sample);
        Ok(())
    }

    pub fn clear_ranging_samples(&mut self) {
        self.ranging.clear();
    }

    // ========================================================================
    // Snapshot & Configuration
    // ========================================================================

    /// Records from the most recent evaluation, ordered by user id.
    pub fn snapshot(&self) -> Vec<ProximityRecord> {
        self.records.values().cloned().collect()
    }

    pub fn snapshot_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn get(&self, user_id: &str) -> Option<&ProximityRecord> {
        self.records.get(user_id)
    }

    pub fn is_nearby(&self, user_id: &str) -> bool {
        self.records.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records without emitting leave events.
    pub fn reset(&mut self) {
        self.records.clear();
        self.ranging.clear();
        info!("[ProximityEngine] Reset");
    }

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    /// Replace the configuration; takes effect at the next evaluation.
    pub fn set_config(&mut self, config: ProximityConfig) -> Result<()> {
        config.validate()?;
        info!(
            "[ProximityEngine] Threshold set to {:.3} km",
            config.proximity_threshold_km
        );
        self.config = config;
        Ok(())
    }
}

impl Default for ProximityEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
