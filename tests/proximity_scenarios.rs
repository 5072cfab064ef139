//! End-to-end scenarios: tracker samples feeding the proximity engine.
//!
//! Run with: `cargo test --test proximity_scenarios`

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use proximity_engine::geo_utils::meters_to_degrees;
use proximity_engine::{
    find_nearby_users, LocationProvider, LocationTracker, MovementState, Position,
    ProximityEngine, ProximityEventKind, Result, StartOptions, SubscriptionId,
    UserLocationRecord, WatchOptions,
};

/// Provider double that counts subscriptions.
#[derive(Default)]
struct CountingProvider {
    next_id: SubscriptionId,
    watches: Vec<WatchOptions>,
    cancels: usize,
}

impl LocationProvider for CountingProvider {
    fn watch(&mut self, options: &WatchOptions) -> Result<SubscriptionId> {
        self.next_id += 1;
        self.watches.push(*options);
        Ok(self.next_id)
    }

    fn cancel(&mut self, _subscription: SubscriptionId) {
        self.cancels += 1;
    }
}

fn friend(id: &str, lat: f64, lng: f64) -> UserLocationRecord {
    UserLocationRecord::new(id, Some(Position::new(lat, lng, 5.0, 0)), true)
}

// ============================================================================
// Test: San Francisco enter / leave
// ============================================================================

#[test]
fn test_san_francisco_enter_then_leave() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut engine = ProximityEngine::new();
    let me = Position::new(37.7749, -122.4194, 5.0, 1_000);
    let roster = vec![friend("u1", 37.7750, -122.4195)];

    let first = engine.evaluate(&me, &roster).unwrap();
    assert_eq!(first.entered.len(), 1);
    assert_eq!(first.entered[0].user_id, "u1");
    assert!((first.entered[0].distance_km - 0.014).abs() < 0.002);
    assert_eq!(first.current.len(), 1);

    let second = engine.evaluate(&me, &[]).unwrap();
    assert_eq!(second.left.len(), 1);
    assert_eq!(second.left[0].user_id, "u1");
    assert!(second.current.is_empty());
}

// ============================================================================
// Test: Noise-level jitter keeps the tracker stationary
// ============================================================================

#[test]
fn test_gps_jitter_stays_stationary() {
    let mut tracker = LocationTracker::new(CountingProvider::default());
    let updates = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&updates);
    tracker
        .start(
            Box::new(move |u| {
                assert!(u.is_ok());
                *sink.lock().unwrap() += 1;
            }),
            StartOptions::default(),
        )
        .unwrap();

    // ~9 m back and forth every 500 ms, reported speed 0
    for i in 0..20 {
        let lat = if i % 2 == 0 { 37.7749 } else { 37.77498 };
        let sample = Position::new(lat, -122.4194, 8.0, i * 500).with_speed(0.0);
        let sub = tracker.subscription().unwrap();
        assert!(tracker.handle_position(sub, sample));

        if i > 0 {
            assert_eq!(tracker.state().movement_state, MovementState::Stationary);
        }
        assert_eq!(tracker.state().current_interval_ms, 60_000);
    }

    assert_eq!(*updates.lock().unwrap(), 20);
    // Initial watch only: noise never changed the policy
    assert_eq!(tracker.provider().watches.len(), 1);
    assert_eq!(tracker.provider().cancels, 0);

    tracker.stop();
    assert_eq!(tracker.provider().cancels, 1);
}

#[test]
fn test_exact_ten_meter_jitter_stays_stationary() {
    let mut tracker = LocationTracker::new(CountingProvider::default());
    tracker.start(Box::new(|_| {}), StartOptions::default()).unwrap();

    // Exactly the 10 m noise floor, well under a second apart
    let step = meters_to_degrees(10.0);
    for i in 0..10 {
        let lat = if i % 2 == 0 { 37.7749 } else { 37.7749 + step };
        let sample = Position::new(lat, -122.4194, 8.0, i * 400).with_speed(0.0);
        let sub = tracker.subscription().unwrap();
        assert!(tracker.handle_position(sub, sample));

        if i > 0 {
            assert_eq!(tracker.state().movement_state, MovementState::Stationary);
        }
        assert_eq!(tracker.state().current_interval_ms, 60_000);
    }
    assert_eq!(tracker.provider().watches.len(), 1);
}

// ============================================================================
// Test: No duplicate enter without an intervening leave
// ============================================================================

#[test]
fn test_enter_leave_sequence_has_no_duplicates() {
    let mut engine = ProximityEngine::new();
    let me = Position::new(51.5074, -0.1278, 5.0, 0);

    // u1 wanders in and out; u2 stays close; u3 appears late
    let steps: Vec<Vec<UserLocationRecord>> = vec![
        vec![friend("u1", 51.5075, -0.1278), friend("u2", 51.5074, -0.1279)],
        vec![friend("u1", 51.5075, -0.1278), friend("u2", 51.5074, -0.1279)],
        vec![friend("u1", 51.5100, -0.1278), friend("u2", 51.5074, -0.1279)],
        vec![friend("u1", 51.5076, -0.1278), friend("u2", 51.5074, -0.1279)],
        vec![friend("u2", 51.5074, -0.1279), friend("u3", 51.5074, -0.1277)],
        vec![],
    ];

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    engine.register_observer(Box::new(move |event| {
        sink.lock().unwrap().push((event.kind, event.record.user_id.clone()));
        Ok(())
    }));

    for roster in &steps {
        engine.evaluate(&me, roster).unwrap();
    }

    let mut inside: HashSet<String> = HashSet::new();
    for (kind, user) in events.lock().unwrap().iter() {
        match kind {
            ProximityEventKind::Entered => assert!(inside.insert(user.clone()), "double enter {}", user),
            ProximityEventKind::Left => assert!(inside.remove(user), "leave without enter {}", user),
        }
    }
    assert!(inside.is_empty());
    assert!(engine.is_empty());
}

// ============================================================================
// Test: Tracker -> engine pipeline
// ============================================================================

#[test]
fn test_tracker_feeds_engine() {
    let roster = vec![
        friend("cafe", 37.7760, -122.4194),
        friend("office", 37.7900, -122.4194),
    ];

    let engine = Arc::new(Mutex::new(ProximityEngine::new()));
    let nearby_log = Arc::new(Mutex::new(Vec::new()));

    let mut tracker = LocationTracker::new(CountingProvider::default());
    {
        let engine = Arc::clone(&engine);
        let nearby_log = Arc::clone(&nearby_log);
        let roster = roster.clone();
        tracker
            .start(
                Box::new(move |update| {
                    let Ok(me) = update else { return };
                    let evaluation = engine.lock().unwrap().evaluate(&me, &roster).unwrap();
                    let ids: Vec<String> =
                        evaluation.current.iter().map(|r| r.user_id.clone()).collect();
                    nearby_log.lock().unwrap().push(ids);
                }),
                StartOptions::default(),
            )
            .unwrap();
    }

    // Walk from ~1.3 km south of the cafe up to it
    let path = [37.7640, 37.7700, 37.7740, 37.7755];
    for (i, lat) in path.iter().enumerate() {
        let sub = tracker.subscription().unwrap();
        let sample = Position::new(*lat, -122.4194, 5.0, i as i64 * 15_000).with_speed(1.4);
        tracker.handle_position(sub, sample);
    }

    assert_eq!(tracker.state().movement_state, MovementState::Walking);
    assert_eq!(tracker.state().current_interval_ms, 15_000);

    let log = nearby_log.lock().unwrap();
    assert_eq!(log.len(), 4);
    assert!(log[0].is_empty());
    assert_eq!(log[3], vec!["cafe".to_string()]);

    // The same roster through the stateless radius query
    let me = tracker.state().last_position.unwrap();
    let nearby = find_nearby_users(None, &me, &roster, 1000.0).unwrap();
    assert_eq!(nearby.len(), 1);
    assert_eq!(nearby[0].user_id, "cafe");
}
