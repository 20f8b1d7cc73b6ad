use std::time::Duration;

use skirmish_tick::{TickConfig, TickPolicy, TickScheduler};
use tokio::time::Instant;

fn config_100ms() -> TickConfig {
    TickConfig::with_interval(Duration::from_millis(100))
}

// =========================================================================
// Config
// =========================================================================

#[test]
fn test_default_config_is_ten_hz_skip() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.interval, Duration::from_millis(100));
    assert_eq!(cfg.policy, TickPolicy::Skip);
}

#[test]
fn test_validated_raises_zero_interval() {
    let cfg = TickConfig::with_interval(Duration::ZERO).validated();
    assert_eq!(cfg.interval, TickConfig::MIN_INTERVAL);
}

#[test]
fn test_validated_orders_thresholds() {
    let cfg = TickConfig {
        budget_warn_threshold: 1.5,
        budget_critical_threshold: 0.5,
        ..config_100ms()
    }
    .validated();
    assert_eq!(cfg.budget_critical_threshold, 0.5);
    assert_eq!(cfg.budget_warn_threshold, 0.5);
}

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_after_one_interval() {
    let start = Instant::now();
    let mut s = TickScheduler::new(config_100ms());

    let info = s.wait_for_tick().await;
    assert_eq!(info.tick, 1);
    assert!(!info.overrun);
    assert_eq!(info.ticks_skipped, 0);
    assert_eq!(start.elapsed(), Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_increments_monotonically() {
    let mut s = TickScheduler::new(config_100ms());
    for expected in 1..=5 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
    }
    assert_eq!(s.tick_count(), 5);
    assert_eq!(s.metrics().total_ticks, 5);
}

// =========================================================================
// Overrun policies
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_drops_missed_ticks() {
    let mut s = TickScheduler::new(config_100ms());
    s.wait_for_tick().await;

    // Simulate a slow tick: 350ms of work against a 100ms interval.
    tokio::time::advance(Duration::from_millis(350)).await;
    s.record_tick_end();

    let late = s.wait_for_tick().await;
    assert_eq!(late.tick, 2);
    assert!(late.overrun);
    assert_eq!(late.ticks_skipped, 2);

    // Next tick is a full interval after the late one.
    let before = Instant::now();
    let next = s.wait_for_tick().await;
    assert_eq!(next.tick, 3);
    assert!(!next.overrun);
    assert_eq!(before.elapsed(), Duration::from_millis(100));
    assert_eq!(s.metrics().total_skipped, 2);
    assert_eq!(s.metrics().total_overruns, 1);
}

#[tokio::test(start_paused = true)]
async fn test_catchup_policy_fires_missed_ticks_back_to_back() {
    let mut s = TickScheduler::new(TickConfig {
        policy: TickPolicy::CatchUp { max_catchup: 5 },
        ..config_100ms()
    });
    s.wait_for_tick().await;
    tokio::time::advance(Duration::from_millis(350)).await;

    let resumed_at = Instant::now();
    for expected in 2..=4 {
        let info = s.wait_for_tick().await;
        assert_eq!(info.tick, expected);
        assert_eq!(info.ticks_skipped, 0);
    }
    assert_eq!(Instant::now(), resumed_at);
}

#[tokio::test(start_paused = true)]
async fn test_catchup_policy_skips_beyond_cap() {
    let mut s = TickScheduler::new(TickConfig {
        policy: TickPolicy::CatchUp { max_catchup: 1 },
        ..config_100ms()
    });
    s.wait_for_tick().await;
    tokio::time::advance(Duration::from_millis(550)).await;

    let info = s.wait_for_tick().await;
    assert!(info.overrun);
    assert_eq!(info.ticks_skipped, 3);
}

// =========================================================================
// Metrics
// =========================================================================

#[tokio::test]
async fn test_initial_metrics_are_zero() {
    let s = TickScheduler::new(config_100ms());
    let m = s.metrics();
    assert_eq!(m.total_ticks, 0);
    assert_eq!(m.total_overruns, 0);
    assert_eq!(m.avg_tick_time, Duration::ZERO);
    assert_eq!(m.max_tick_time, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_without_wait_is_noop() {
    let mut s = TickScheduler::new(config_100ms());
    s.record_tick_end();
    assert_eq!(s.metrics().max_tick_time, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_record_tick_end_tracks_budget_utilization() {
    let mut s = TickScheduler::new(config_100ms());
    s.wait_for_tick().await;
    tokio::time::advance(Duration::from_millis(25)).await;
    s.record_tick_end();

    let m = s.metrics();
    assert!((m.budget_utilization - 0.25).abs() < 1e-9);
    assert_eq!(m.max_tick_time, Duration::from_millis(25));
    assert!(m.avg_tick_time > Duration::ZERO);
}

// =========================================================================
// Interval changes
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_set_interval_applies_to_next_tick() {
    let mut s = TickScheduler::new(config_100ms());
    s.wait_for_tick().await;

    s.set_interval(Duration::from_millis(40));
    assert_eq!(s.interval(), Duration::from_millis(40));

    let before = Instant::now();
    s.wait_for_tick().await;
    assert_eq!(before.elapsed(), Duration::from_millis(40));
}

// =========================================================================
// select! loop, the way the server drives it
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_select_loop_stops_on_shutdown() {
    let mut s = TickScheduler::new(config_100ms());
    let (tx, mut rx) = tokio::sync::watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(350)).await;
        tx.send(true).ok();
    });

    let mut ticks_fired = 0u64;
    loop {
        tokio::select! {
            _ = rx.changed() => break,
            info = s.wait_for_tick() => {
                ticks_fired += 1;
                assert_eq!(info.tick, ticks_fired);
                s.record_tick_end();
            }
        }
    }

    assert_eq!(ticks_fired, 3);
}
