//! Auxiliary distance estimators.
//!
//! GPS is unreliable indoors. These estimators produce [`RangingSample`]s that
//! the proximity engine prefers over geodesic distance when GPS accuracy is
//! coarse:
//!
//! - **RSSI** ([`rssi`]): empirical path-loss heuristic over received signal strength
//! - **RTT** ([`rtt`], feature `rtt`): round-trip-time ranging against an access point
//!
//! Both sit behind plain types or traits so real radios and simulated ones
//! can be swapped in without touching the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ProximityError, Result};

pub mod rssi;
pub use rssi::{rssi_to_distance_meters, RssiRanging};

#[cfg(feature = "rtt")]
pub mod rtt;
#[cfg(feature = "rtt")]
pub use rtt::{measure_distance, range_peer, RttMeasurement, RttRanging, SimulatedRttRanging};

/// Which estimator produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RangingKind {
    Rssi,
    Rtt,
}

/// One auxiliary distance estimate toward a peer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangingSample {
    pub kind: RangingKind,
    pub distance_meters: f64,
    pub distance_std_dev_meters: Option<f64>,
    pub timestamp_ms: i64,
}

impl RangingSample {
    pub fn rssi(distance_meters: f64, timestamp_ms: i64) -> Self {
        Self {
            kind: RangingKind::Rssi,
            distance_meters,
            distance_std_dev_meters: None,
            timestamp_ms,
        }
    }

    pub fn rtt(distance_meters: f64, std_dev_meters: Option<f64>, timestamp_ms: i64) -> Self {
        Self {
            kind: RangingKind::Rtt,
            distance_meters,
            distance_std_dev_meters: std_dev_meters,
            timestamp_ms,
        }
    }

    /// Distances must be finite and non-negative, so a bad radio reading can
    /// never stand in for a real distance.
    pub fn validate(&self) -> Result<()> {
        if !self.distance_meters.is_finite() || self.distance_meters < 0.0 {
            return Err(ProximityError::invalid_argument(format!(
                "ranging distance {} must be a non-negative number",
                self.distance_meters
            )));
        }
        if let Some(std_dev) = self.distance_std_dev_meters {
            if !std_dev.is_finite() || std_dev < 0.0 {
                return Err(ProximityError::invalid_argument(format!(
                    "ranging standard deviation {} must be a non-negative number",
                    std_dev
                )));
            }
        }
        Ok(())
    }
}

/// Ranging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RangingConfig {
    /// Device RSSI measured at 1 meter. Default: -69 dBm
    pub reference_rssi_dbm: f64,

    /// Upper bound on a single RTT measurement. Default: 5000 ms
    pub rtt_timeout_ms: u64,
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            reference_rssi_dbm: -69.0,
            rtt_timeout_ms: 5_000,
        }
    }
}

impl RangingConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.reference_rssi_dbm.is_finite() || self.reference_rssi_dbm >= 0.0 {
            return Err(ProximityError::config("referenceRssiDbm must be a negative dBm value"));
        }
        if self.rtt_timeout_ms == 0 {
            return Err(ProximityError::config("rttTimeoutMs must be non-zero"));
        }
        Ok(())
    }

    pub fn rtt_timeout(&self) -> Duration {
        Duration::from_millis(self.rtt_timeout_ms)
    }
}
