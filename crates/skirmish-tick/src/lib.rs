//! The world clock for Skirmish.
//!
//! A single [`TickScheduler`] paces every lobby. The server waits on
//! [`TickScheduler::wait_for_tick`], advances the world under its lock,
//! then calls [`TickScheduler::record_tick_end`] so the time spent can be
//! checked against the interval.
//!
//! A tick is never re-entered. When one fires late, [`TickPolicy`] decides
//! what happens to the deadlines that were missed in the meantime:
//! [`TickPolicy::Skip`] forgets them and lets simulation time fall behind
//! the wall clock, [`TickPolicy::CatchUp`] replays a bounded number back to
//! back.
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.changed() => break,
//!         info = scheduler.wait_for_tick() => {
//!             world.lock().await.tick(info.tick);
//!             scheduler.record_tick_end();
//!         }
//!     }
//! }
//! ```

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Treatment of deadlines missed while a tick ran long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Drop them; the next tick is one interval after the late one.
    #[default]
    Skip,
    /// Fire up to `max_catchup` of them immediately, drop the rest.
    CatchUp { max_catchup: u32 },
}

#[derive(Debug, Clone)]
pub struct TickConfig {
    pub interval: Duration,
    pub policy: TickPolicy,
    /// Share of the interval (0.0 to 1.0) a tick may use before a warning.
    pub budget_warn_threshold: f64,
    /// Share at which the tick is reported as over budget.
    pub budget_critical_threshold: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            policy: TickPolicy::Skip,
            budget_warn_threshold: 0.8,
            budget_critical_threshold: 1.0,
        }
    }
}

impl TickConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    /// Brings every field into range: the interval up to
    /// [`MIN_INTERVAL`](Self::MIN_INTERVAL), both thresholds into `0..=1`
    /// with warn never above critical.
    pub fn validated(self) -> Self {
        let interval = if self.interval < Self::MIN_INTERVAL {
            warn!(interval = ?self.interval, "tick interval below minimum, raising");
            Self::MIN_INTERVAL
        } else {
            self.interval
        };
        let critical = self.budget_critical_threshold.clamp(0.0, 1.0);
        let warn_at = self.budget_warn_threshold.clamp(0.0, critical);
        Self {
            interval,
            policy: self.policy,
            budget_warn_threshold: warn_at,
            budget_critical_threshold: critical,
        }
    }

    fn budget(&self, utilization: f64) -> Budget {
        if utilization >= self.budget_critical_threshold {
            Budget::Exceeded
        } else if utilization >= self.budget_warn_threshold {
            Budget::Tight
        } else {
            Budget::Fine
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    Fine,
    Tight,
    Exceeded,
}

/// One fired tick.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// Fired more than a tenth of an interval after its deadline.
    pub overrun: bool,
    /// Deadlines dropped on account of this tick.
    pub ticks_skipped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Smoothed work time per tick.
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Work time of the last tick over the interval.
    pub budget_utilization: f64,
}

impl TickMetrics {
    const SMOOTHING: f64 = 0.1;

    fn record_fire(&mut self, info: &TickInfo) {
        self.total_ticks += 1;
        self.total_skipped += info.ticks_skipped;
        if info.overrun {
            self.total_overruns += 1;
        }
    }

    fn record_work(&mut self, elapsed: Duration, interval: Duration) {
        self.budget_utilization = elapsed.as_secs_f64() / interval.as_secs_f64();
        self.max_tick_time = self.max_tick_time.max(elapsed);
        let avg = self.avg_tick_time.as_secs_f64();
        self.avg_tick_time = Duration::from_secs_f64(
            avg + (elapsed.as_secs_f64() - avg) * Self::SMOOTHING,
        );
    }
}

/// Where the next deadline lands after a tick fired at `now` for the
/// deadline `due`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Plan {
    next: Instant,
    overrun: bool,
    behind: u64,
    skipped: u64,
}

fn plan(policy: TickPolicy, due: Instant, now: Instant, interval: Duration) -> Plan {
    let late_by = now.saturating_duration_since(due);
    let overrun = late_by > interval / 10;
    let behind = if overrun {
        u64::try_from(late_by.as_nanos() / interval.as_nanos()).unwrap_or(u64::MAX)
    } else {
        0
    };

    let (next, skipped) = match policy {
        TickPolicy::Skip => (now + interval, behind),
        TickPolicy::CatchUp { max_catchup } => {
            let cap = u64::from(max_catchup);
            if behind > cap {
                (now + interval, behind - cap)
            } else {
                (due + interval, 0)
            }
        }
    };
    Plan {
        next,
        overrun,
        behind,
        skipped,
    }
}

/// Paces the world tick.
pub struct TickScheduler {
    config: TickConfig,
    tick_count: u64,
    due: Instant,
    started: Option<Instant>,
    metrics: TickMetrics,
}

impl TickScheduler {
    /// The first tick is due one interval from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        debug!(interval = ?config.interval, policy = ?config.policy, "tick scheduler ready");
        Self {
            due: Instant::now() + config.interval,
            config,
            tick_count: 0,
            started: None,
            metrics: TickMetrics::default(),
        }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self::new(TickConfig::with_interval(interval))
    }

    /// Sleeps until the next deadline and starts timing the tick.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let due = self.due;
        time::sleep_until(due).await;

        let now = Instant::now();
        let plan = plan(self.config.policy, due, now, self.config.interval);
        self.due = plan.next;
        self.started = Some(now);
        self.tick_count += 1;

        if plan.skipped > 0 {
            warn!(
                tick = self.tick_count,
                behind = plan.behind,
                skipped = plan.skipped,
                "world tick fell behind, skipping ahead"
            );
        } else if plan.behind > 0 {
            debug!(tick = self.tick_count, behind = plan.behind, "world tick catching up");
        }

        let info = TickInfo {
            tick: self.tick_count,
            overrun: plan.overrun,
            ticks_skipped: plan.skipped,
        };
        self.metrics.record_fire(&info);
        trace!(tick = info.tick, overrun = info.overrun, "tick");
        info
    }

    /// Stops timing the current tick. Does nothing unless a tick is in
    /// progress.
    pub fn record_tick_end(&mut self) {
        let Some(started) = self.started.take() else {
            return;
        };
        let elapsed = started.elapsed();
        let interval = self.config.interval;
        self.metrics.record_work(elapsed, interval);

        match self.config.budget(self.metrics.budget_utilization) {
            Budget::Fine => {}
            Budget::Tight => warn!(
                tick = self.tick_count,
                elapsed = ?elapsed,
                interval = ?interval,
                "world tick close to its budget"
            ),
            Budget::Exceeded => warn!(
                tick = self.tick_count,
                elapsed = ?elapsed,
                interval = ?interval,
                "world tick over budget"
            ),
        }
    }

    /// Switches to a new interval; the next tick is due one new interval
    /// from now.
    pub fn set_interval(&mut self, interval: Duration) {
        let previous = self.config.interval;
        self.config = TickConfig {
            interval,
            ..self.config.clone()
        }
        .validated();
        if self.config.interval != previous {
            self.due = Instant::now() + self.config.interval;
            debug!(from = ?previous, to = ?self.config.interval, "tick interval changed");
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn policy(&self) -> TickPolicy {
        self.config.policy
    }
}
