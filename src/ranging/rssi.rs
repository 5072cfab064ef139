//! Signal-strength ranging.
//!
//! Maps an RSSI reading to a distance with an empirical path-loss curve. This
//! is a coarse heuristic, not a physical law: walls, bodies and interference
//! all skew it, so treat results as "very close / close / not close".

use log::debug;

use crate::ranging::{RangingConfig, RangingSample};
use crate::{ProximityError, Result};

/// Estimated distance in meters for `rssi`, given the device's RSSI at 1 m.
///
/// `ratio = (reference - rssi) / 20`; below 1 the estimate is `ratio^10`,
/// otherwise `0.89976 * ratio^7.7095 + 0.111`. Readings at or stronger than
/// the reference clamp the ratio to 0 and map to 0 m, keeping the curve
/// monotonic: a stronger signal is never farther.
pub fn rssi_to_distance_meters(rssi: f64, reference_rssi: f64) -> f64 {
    let ratio = ((reference_rssi - rssi) / 20.0).max(0.0);
    if ratio < 1.0 {
        ratio.powi(10)
    } else {
        0.89976 * ratio.powf(7.7095) + 0.111
    }
}

/// RSSI estimator bound to one device's reference power.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RssiRanging {
    reference_rssi: f64,
}

impl RssiRanging {
    pub fn new(reference_rssi: f64) -> Self {
        Self { reference_rssi }
    }

    pub fn from_config(config: &RangingConfig) -> Self {
        Self::new(config.reference_rssi_dbm)
    }

    pub fn reference_rssi(&self) -> f64 {
        self.reference_rssi
    }

    /// Turn a reading into a sample for the proximity engine.
    ///
    /// A reading of exactly 0 dBm is how scanners report "no signal" and is rejected.
    pub fn estimate(&self, rssi: f64, timestamp_ms: i64) -> Result<RangingSample> {
        if !rssi.is_finite() || rssi == 0.0 {
            return Err(ProximityError::invalid_argument(format!(
                "unusable RSSI reading {}",
                rssi
            )));
        }
        let distance = rssi_to_distance_meters(rssi, self.reference_rssi);
        debug!("[Ranging] RSSI {} dBm -> {:.2}m", rssi, distance);
        Ok(RangingSample::rssi(distance, timestamp_ms))
    }
}

impl Default for RssiRanging {
    fn default() -> Self {
        Self::from_config(&RangingConfig::default())
    }
}
