//! # Nearby Users
//!
//! Radius queries over a roster: "who is within N meters of me?", sorted by
//! distance. Unlike [`crate::ProximityEngine`] this keeps no state and emits no
//! events; it answers one query for list views.
//!
//! Large rosters are prefiltered with an R-tree over a padded bounding box,
//! then every survivor is measured exactly with haversine. Boxes that would
//! cross a pole or the antimeridian fall back to a linear scan.

use std::collections::HashSet;

use log::debug;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_distance, meters_to_degrees, meters_to_degrees_lng};
use crate::{Position, ProximityError, Result, UserLocationRecord};

/// Default search radius in meters.
pub const DEFAULT_NEARBY_RADIUS_METERS: f64 = 1000.0;

/// Rosters smaller than this are scanned linearly.
const RTREE_MIN_ROSTER: usize = 64;

/// Safety margin on the prefilter box; the exact check happens afterwards.
const BOX_PADDING: f64 = 1.1;

/// A user within the search radius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyUser {
    pub user_id: String,
    pub distance_meters: f64,
    pub position: Position,
}

/// Roster entry indexed by its point.
struct IndexedUser<'a> {
    index: usize,
    position: &'a Position,
}

impl RTreeObject for IndexedUser<'_> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.position.longitude, self.position.latitude])
    }
}

/// Find users sharing their location within `radius_meters` of `self_position`.
///
/// `self_user_id`, when given, is excluded from the result. Users with sharing
/// disabled or without a position are skipped. Results are sorted nearest first,
/// ties broken by user id.
pub fn find_nearby_users(
    self_user_id: Option<&str>,
    self_position: &Position,
    roster: &[UserLocationRecord],
    radius_meters: f64,
) -> Result<Vec<NearbyUser>> {
    self_position.validate()?;
    if !radius_meters.is_finite() || radius_meters < 0.0 {
        return Err(ProximityError::invalid_argument(format!(
            "radius {} must be a non-negative number",
            radius_meters
        )));
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(roster.len());
    let mut candidates: Vec<(usize, &Position)> = Vec::with_capacity(roster.len());
    for (index, entry) in roster.iter().enumerate() {
        if entry.user_id.is_empty() {
            return Err(ProximityError::invalid_argument("roster entry with empty user id"));
        }
        if !seen.insert(entry.user_id.as_str()) {
            return Err(ProximityError::invalid_argument(format!(
                "duplicate roster entry for user '{}'",
                entry.user_id
            )));
        }
        if Some(entry.user_id.as_str()) == self_user_id {
            continue;
        }
        if let Some(position) = entry.shared_position() {
            position.validate().map_err(|e| {
                ProximityError::invalid_argument(format!("user '{}': {}", entry.user_id, e))
            })?;
            candidates.push((index, position));
        }
    }

    let prefiltered: Vec<(usize, &Position)> = match search_box(self_position, radius_meters) {
        Some(bounds) if candidates.len() >= RTREE_MIN_ROSTER => {
            let indexed: Vec<IndexedUser> = candidates
                .iter()
                .map(|&(index, position)| IndexedUser { index, position })
                .collect();
            let tree = RTree::bulk_load(indexed);
            tree.locate_in_envelope_intersecting(&bounds)
                .map(|u| (u.index, u.position))
                .collect()
        }
        _ => candidates,
    };

    let mut nearby: Vec<NearbyUser> = prefiltered
        .into_iter()
        .filter_map(|(index, position)| {
            let distance_meters = haversine_distance(self_position, position);
            (distance_meters <= radius_meters).then(|| NearbyUser {
                user_id: roster[index].user_id.clone(),
                distance_meters,
                position: *position,
            })
        })
        .collect();

    nearby.sort_by(|a, b| {
        a.distance_meters
            .total_cmp(&b.distance_meters)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    debug!(
        "[Nearby] {} of {} roster entries within {:.0}m",
        nearby.len(),
        roster.len(),
        radius_meters
    );

    Ok(nearby)
}

/// Padded lng/lat box around `center`, or `None` if it would wrap.
fn search_box(center: &Position, radius_meters: f64) -> Option<AABB<[f64; 2]>> {
    let padded = radius_meters * BOX_PADDING;
    let d_lat = meters_to_degrees(padded);
    let d_lng = meters_to_degrees_lng(padded, center.latitude)?;

    let (min_lat, max_lat) = (center.latitude - d_lat, center.latitude + d_lat);
    let (min_lng, max_lng) = (center.longitude - d_lng, center.longitude + d_lng);

    if min_lat < -90.0 || max_lat > 90.0 || min_lng < -180.0 || max_lng > 180.0 {
        return None;
    }

    Some(AABB::from_corners([min_lng, min_lat], [max_lng, max_lat]))
}
