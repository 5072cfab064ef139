//! # Location Tracker
//!
//! Adaptive sampling state machine over an external location provider.
//!
//! The tracker runs in one of two states, `Idle` or `Tracking`. While tracking
//! it holds exactly one provider subscription. Each accepted sample is
//! classified against the previous one; when the resulting sampling policy
//! differs from the active subscription's, the subscription is torn down and
//! re-established with the new policy. Battery is traded for responsiveness
//! only while movement is detected.
//!
//! The host event loop feeds provider output back through
//! [`LocationTracker::handle_position`], [`LocationTracker::handle_error`] and
//! [`LocationTracker::handle_subscription_ended`]. Every call is tagged with
//! the subscription it came from; anything tagged with a cancelled
//! subscription is dropped, so no update is delivered after [`LocationTracker::stop`].

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::history::{LocationAnalytics, LocationHistory, DEFAULT_HISTORY_CAPACITY};
use crate::movement::{MovementConfig, MovementState};
use crate::{Position, ProximityError, Result};

/// Identifier handed out by a provider for one watch subscription.
pub type SubscriptionId = u64;

/// Callback receiving accepted samples and surfaced provider errors.
pub type UpdateCallback = Box<dyn FnMut(Result<Position>) + Send>;

/// Parameters of a provider watch subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    pub timeout_ms: u64,
    pub maximum_age_ms: u64,
    /// Desired spacing between samples
    pub interval_ms: u64,
}

/// Source of device positions (platform geolocation, GPS chip, simulator).
///
/// `watch` starts a long-lived subscription; the provider then reports
/// through the tracker's `handle_*` methods using the returned id.
pub trait LocationProvider: Send {
    fn watch(&mut self, options: &WatchOptions) -> Result<SubscriptionId>;

    /// Release a subscription. Must not fail; unknown ids are ignored.
    fn cancel(&mut self, subscription: SubscriptionId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerStatus {
    Idle,
    Tracking,
}

/// Mutable tracking state, changed only by processing samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingState {
    pub last_position: Option<Position>,
    pub movement_state: MovementState,
    pub current_interval_ms: u64,
    pub high_accuracy_requested: bool,
}

/// Initial sampling policy passed to [`LocationTracker::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartOptions {
    /// Default: 60000 ms
    pub interval_ms: u64,
    /// Default: false
    pub enable_high_accuracy: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            enable_high_accuracy: false,
        }
    }
}

/// Tracker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackingConfig {
    /// Per-request timeout in foreground. Default: 10000 ms
    pub timeout_ms: u64,

    /// Staleness ceiling while stationary or unknown. Default: 30000 ms.
    /// While moving the ceiling is the current sampling interval.
    pub stationary_maximum_age_ms: u64,

    /// Timeout used when the app is not in foreground. Default: 30000 ms
    pub background_timeout_ms: u64,

    /// Staleness ceiling when the app is not in foreground. Default: 120000 ms
    pub background_maximum_age_ms: u64,

    /// Samples retained for analytics. Default: 100
    pub history_capacity: usize,

    /// Samples older than this (relative to the newest) are pruned. Default: 2 hours
    pub history_max_age_ms: i64,

    pub movement: MovementConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            stationary_maximum_age_ms: 30_000,
            background_timeout_ms: 30_000,
            background_maximum_age_ms: 120_000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            history_max_age_ms: 2 * 60 * 60 * 1000,
            movement: MovementConfig::default(),
        }
    }
}

impl TrackingConfig {
    /// Parse from JSON; missing fields fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 || self.background_timeout_ms == 0 {
            return Err(ProximityError::config("timeouts must be non-zero"));
        }
        if self.background_timeout_ms < self.timeout_ms
            || self.background_maximum_age_ms < self.stationary_maximum_age_ms
        {
            return Err(ProximityError::config(
                "background timeout/maximum age must not be tighter than foreground",
            ));
        }
        if self.history_capacity == 0 {
            return Err(ProximityError::config("historyCapacity must be non-zero"));
        }
        self.movement.validate()
    }
}

/// Adaptive location tracker owning its provider.
pub struct LocationTracker<P: LocationProvider> {
    provider: P,
    config: TrackingConfig,
    status: TrackerStatus,
    state: TrackingState,
    subscription: Option<SubscriptionId>,
    active_options: Option<WatchOptions>,
    on_update: Option<UpdateCallback>,
    foreground: bool,
    history: LocationHistory,
}

impl<P: LocationProvider> LocationTracker<P> {
    /// Create an idle tracker with default configuration.
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, TrackingConfig::default())
    }

    pub fn with_config(provider: P, config: TrackingConfig) -> Self {
        let history = LocationHistory::new(config.history_capacity);
        Self {
            provider,
            status: TrackerStatus::Idle,
            state: Self::idle_state(&config),
            subscription: None,
            active_options: None,
            on_update: None,
            foreground: true,
            history,
            config,
        }
    }

    fn idle_state(config: &TrackingConfig) -> TrackingState {
        TrackingState {
            last_position: None,
            movement_state: MovementState::Unknown,
            current_interval_ms: config.movement.stationary_interval_ms,
            high_accuracy_requested: false,
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start tracking: Idle -> Tracking.
    ///
    /// Calling `start` while already tracking keeps the existing session and
    /// its callback; the new callback is dropped. If the provider refuses the
    /// subscription the tracker stays idle and the error is returned.
    pub fn start(&mut self, on_update: UpdateCallback, options: StartOptions) -> Result<()> {
        if self.status == TrackerStatus::Tracking {
            debug!("[LocationTracker] start ignored, already tracking");
            return Ok(());
        }

        self.state.current_interval_ms = options.interval_ms;
        self.state.high_accuracy_requested = options.enable_high_accuracy;

        let watch_options = self.effective_options();
        let subscription = self.provider.watch(&watch_options)?;

        self.subscription = Some(subscription);
        self.active_options = Some(watch_options);
        self.on_update = Some(on_update);
        self.status = TrackerStatus::Tracking;

        info!(
            "[LocationTracker] Tracking started (subscription {}, interval {}ms, high accuracy {})",
            subscription, watch_options.interval_ms, watch_options.enable_high_accuracy
        );
        Ok(())
    }

    /// Stop tracking: Tracking -> Idle. Idempotent.
    ///
    /// The provider subscription is cancelled before this returns, and the
    /// update callback is released. History belongs to one tracking session
    /// and is cleared as well.
    pub fn stop(&mut self) {
        if self.status == TrackerStatus::Idle {
            return;
        }
        if let Some(subscription) = self.subscription.take() {
            self.provider.cancel(subscription);
        }
        self.reset_to_idle();
        info!("[LocationTracker] Tracking stopped");
    }

    fn reset_to_idle(&mut self) {
        self.status = TrackerStatus::Idle;
        self.subscription = None;
        self.active_options = None;
        self.on_update = None;
        self.state = Self::idle_state(&self.config);
        self.history.clear();
    }

    /// Foreground/background hint from the host application.
    ///
    /// Applied lazily: the widened timeout and staleness ceiling (and disabled
    /// high accuracy) take effect at the next subscription refresh, which
    /// happens on the next accepted sample.
    pub fn set_foreground(&mut self, foreground: bool) {
        if self.foreground != foreground {
            info!(
                "[LocationTracker] App moved to {}",
                if foreground { "foreground" } else { "background" }
            );
        }
        self.foreground = foreground;
    }

    // ========================================================================
    // Provider Input
    // ========================================================================

    /// Process a sample from the provider.
    ///
    /// Returns `true` if the sample was accepted. Samples from stale
    /// subscriptions or arriving while idle are dropped.
    pub fn handle_position(&mut self, subscription: SubscriptionId, position: Position) -> bool {
        if !self.is_current(subscription) {
            debug!(
                "[LocationTracker] Dropping sample from stale subscription {}",
                subscription
            );
            return false;
        }

        if let Err(e) = position.validate() {
            warn!("[LocationTracker] Provider produced malformed sample: {}", e);
            self.notify(Err(e));
            return false;
        }

        let classification = self
            .config
            .movement
            .classify(self.state.last_position.as_ref(), &position);

        if classification.movement_state != self.state.movement_state {
            debug!(
                "[LocationTracker] Movement {:?} -> {:?}",
                self.state.movement_state, classification.movement_state
            );
        }

        self.state.last_position = Some(position);
        self.state.movement_state = classification.movement_state;
        self.state.current_interval_ms = classification.recommended_interval_ms;
        self.state.high_accuracy_requested = classification.recommended_high_accuracy;

        self.history.push(position, classification.movement_state);
        self.history
            .prune_older_than(position.captured_at_ms - self.config.history_max_age_ms);

        let resubscribe_error = self.refresh_subscription().err();

        self.notify(Ok(position));

        if let Some(e) = resubscribe_error {
            // Subscription is gone; surface why, then release the callback
            self.notify(Err(e));
            self.reset_to_idle();
        }
        true
    }

    /// Surface a provider error for a still-live watch subscription.
    ///
    /// No retry is attempted; the tracker keeps waiting for the next callback.
    pub fn handle_error(&mut self, subscription: SubscriptionId, error: ProximityError) {
        if !self.is_current(subscription) {
            return;
        }
        warn!("[LocationTracker] Provider error: {}", error);
        self.notify(Err(error));
    }

    /// The provider reports that the subscription itself died: Tracking -> Idle.
    pub fn handle_subscription_ended(
        &mut self,
        subscription: SubscriptionId,
        error: Option<ProximityError>,
    ) {
        if !self.is_current(subscription) {
            return;
        }
        self.subscription = None;
        info!("[LocationTracker] Subscription {} ended", subscription);
        if let Some(e) = error {
            self.notify(Err(e));
        }
        self.reset_to_idle();
    }

    fn is_current(&self, subscription: SubscriptionId) -> bool {
        self.status == TrackerStatus::Tracking && self.subscription == Some(subscription)
    }

    fn notify(&mut self, update: Result<Position>) {
        if let Some(callback) = self.on_update.as_mut() {
            callback(update);
        }
    }

    /// Re-establish the subscription if the effective policy changed.
    fn refresh_subscription(&mut self) -> Result<()> {
        let wanted = self.effective_options();
        if self.active_options == Some(wanted) {
            return Ok(());
        }

        if let Some(old) = self.subscription.take() {
            self.provider.cancel(old);
        }
        self.active_options = None;

        let subscription = self.provider.watch(&wanted)?;
        self.subscription = Some(subscription);
        self.active_options = Some(wanted);

        info!(
            "[LocationTracker] Resubscribed ({}): interval {}ms, high accuracy {}, max age {}ms",
            subscription, wanted.interval_ms, wanted.enable_high_accuracy, wanted.maximum_age_ms
        );
        Ok(())
    }

    /// Policy the provider should be watched with, given state and visibility.
    pub fn effective_options(&self) -> WatchOptions {
        if !self.foreground {
            return WatchOptions {
                enable_high_accuracy: false,
                timeout_ms: self.config.background_timeout_ms,
                maximum_age_ms: self.config.background_maximum_age_ms,
                interval_ms: self.state.current_interval_ms,
            };
        }

        let maximum_age_ms = if self.state.movement_state.is_moving() {
            self.state.current_interval_ms
        } else {
            self.config.stationary_maximum_age_ms
        };

        WatchOptions {
            enable_high_accuracy: self.state.high_accuracy_requested,
            timeout_ms: self.config.timeout_ms,
            maximum_age_ms,
            interval_ms: self.state.current_interval_ms,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn status(&self) -> TrackerStatus {
        self.status
    }

    pub fn is_tracking(&self) -> bool {
        self.status == TrackerStatus::Tracking
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    pub fn active_options(&self) -> Option<WatchOptions> {
        self.active_options
    }

    pub fn is_foreground(&self) -> bool {
        self.foreground
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn history(&self) -> &LocationHistory {
        &self.history
    }

    pub fn analytics(&self, since_ms: i64) -> Option<LocationAnalytics> {
        self.history.analytics(since_ms)
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }
}

impl<P: LocationProvider> Drop for LocationTracker<P> {
    fn drop(&mut self) {
        self.stop();
    }
}
