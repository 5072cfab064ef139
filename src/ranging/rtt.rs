//! Round-trip-time ranging.
//!
//! RTT ranging asks a named access point for the flight time of a ranging frame and
//! converts it to a distance. Many platforms lack the capability; callers
//! check [`RttRanging::is_available`] and fall back to geodesic distance.
//!
//! Every measurement is bounded by a timeout. A timed-out measurement future
//! is dropped, so it can never resolve later and touch engine state.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::ranging::RangingSample;
use crate::{ProximityEngine, ProximityError, Result};

/// Result of one RTT measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RttMeasurement {
    pub distance_meters: f64,
    pub distance_std_dev_meters: f64,
    pub timestamp_ms: i64,
}

impl RttMeasurement {
    pub fn to_sample(&self) -> RangingSample {
        RangingSample::rtt(
            self.distance_meters,
            Some(self.distance_std_dev_meters),
            self.timestamp_ms,
        )
    }
}

/// Platform RTT capability.
pub trait RttRanging: Send + Sync {
    /// Capability check; `false` means callers should use geodesic distance only.
    fn is_available(&self) -> bool;

    fn measure(&self, access_point: &str) -> impl Future<Output = Result<RttMeasurement>> + Send;
}

/// Measure against `access_point`, giving up after `timeout`.
pub async fn measure_distance<R: RttRanging>(
    ranging: &R,
    access_point: &str,
    timeout: Duration,
) -> Result<RttMeasurement> {
    if !ranging.is_available() {
        return Err(ProximityError::RangingUnavailable {
            message: "RTT ranging not supported on this device".to_string(),
        });
    }

    match tokio::time::timeout(timeout, ranging.measure(access_point)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "[Ranging] RTT measurement against {} timed out after {:?}",
                access_point, timeout
            );
            Err(ProximityError::Timeout)
        }
    }
}

/// Measure and, on success, feed the result to the engine for `user_id`.
///
/// The engine is only touched after a measurement completes in time.
pub async fn range_peer<R: RttRanging>(
    engine: &mut ProximityEngine,
    user_id: &str,
    ranging: &R,
    access_point: &str,
    timeout: Duration,
) -> Result<RangingSample> {
    let measurement = measure_distance(ranging, access_point, timeout).await?;
    let sample = measurement.to_sample();
    engine.record_ranging_sample(user_id, sample)?;
    Ok(sample)
}

/// Simulated RTT radio for development and tests.
///
/// Each known access point answers with a fixed distance after `latency`.
#[derive(Debug, Clone)]
pub struct SimulatedRttRanging {
    access_points: HashMap<String, (f64, f64)>,
    latency: Duration,
    available: bool,
}

impl SimulatedRttRanging {
    pub fn new(latency: Duration) -> Self {
        Self {
            access_points: HashMap::new(),
            latency,
            available: true,
        }
    }

    /// Simulate a device without RTT support.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Duration::ZERO)
        }
    }

    pub fn with_access_point(
        mut self,
        name: impl Into<String>,
        distance_meters: f64,
        std_dev_meters: f64,
    ) -> Self {
        self.access_points
            .insert(name.into(), (distance_meters, std_dev_meters));
        self
    }
}

impl RttRanging for SimulatedRttRanging {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn measure(&self, access_point: &str) -> Result<RttMeasurement> {
        tokio::time::sleep(self.latency).await;

        let &(distance_meters, distance_std_dev_meters) =
            self.access_points.get(access_point).ok_or_else(|| {
                ProximityError::RangingUnavailable {
                    message: format!("access point '{}' does not answer RTT", access_point),
                }
            })?;

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();

        debug!(
            "[Ranging] RTT {} -> {:.2}m (±{:.2})",
            access_point, distance_meters, distance_std_dev_meters
        );

        Ok(RttMeasurement {
            distance_meters,
            distance_std_dev_meters,
            timestamp_ms,
        })
    }
}
