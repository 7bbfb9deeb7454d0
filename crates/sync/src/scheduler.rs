//! Idle-aware refresh cadence
//!
//! Refreshes fire when `floor(now / interval)` changes, so any number of
//! consumers sharing a cadence land on the same tick.

use crate::config::PollingConfig;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Two-tier poll interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub active: Duration,
    pub idle: Duration,
}

impl Cadence {
    pub fn pool(config: &PollingConfig) -> Self {
        Self {
            active: Duration::from_secs(config.pool_active_secs),
            idle: Duration::from_secs(config.pool_idle_secs),
        }
    }

    pub fn account(config: &PollingConfig) -> Self {
        Self {
            active: Duration::from_secs(config.account_active_secs),
            idle: Duration::from_secs(config.account_idle_secs),
        }
    }

    pub fn interval(&self, idle: bool) -> Duration {
        if idle {
            self.idle
        } else {
            self.active
        }
    }
}

/// Refresh bucket of `now_ms` at `interval`
pub fn refresh_bucket(now_ms: i64, interval: Duration) -> i64 {
    let width = (interval.as_millis() as i64).max(1);
    now_ms.div_euclid(width)
}

/// Tracks the last user interaction
#[derive(Debug)]
pub struct ActivityMonitor {
    last_activity_ms: AtomicI64,
    idle_after: Duration,
}

impl ActivityMonitor {
    pub fn new(idle_after: Duration, now_ms: i64) -> Self {
        Self {
            last_activity_ms: AtomicI64::new(now_ms),
            idle_after,
        }
    }

    pub fn record_activity(&self, now_ms: i64) {
        self.last_activity_ms.fetch_max(now_ms, Ordering::Relaxed);
    }

    pub fn is_idle(&self, now_ms: i64) -> bool {
        let last = self.last_activity_ms.load(Ordering::Relaxed);
        now_ms.saturating_sub(last) >= self.idle_after.as_millis() as i64
    }
}

/// Decides when one family of fetches is due
#[derive(Debug, Clone)]
pub struct PollSchedule {
    cadence: Cadence,
    last_fired: Option<(Duration, i64)>,
}

impl PollSchedule {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            cadence,
            last_fired: None,
        }
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// True once per refresh bucket; a change of interval starts a new bucket
    pub fn due(&mut self, now_ms: i64, idle: bool) -> bool {
        let interval = self.cadence.interval(idle);
        let key = (interval, refresh_bucket(now_ms, interval));
        if self.last_fired == Some(key) {
            return false;
        }
        self.last_fired = Some(key);
        true
    }

    /// Make the next `due` call fire, used after a scope switch
    pub fn reset(&mut self) {
        self.last_fired = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cadence() -> Cadence {
        Cadence {
            active: Duration::from_secs(10),
            idle: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        let ten = Duration::from_secs(10);
        assert_eq!(refresh_bucket(9_999, ten), 0);
        assert_eq!(refresh_bucket(10_000, ten), 1);
        assert_eq!(refresh_bucket(0, Duration::ZERO), 0);
    }

    #[test]
    fn test_due_once_per_bucket() {
        let mut schedule = PollSchedule::new(cadence());
        assert!(schedule.due(1_000, false));
        assert!(!schedule.due(5_000, false));
        assert!(!schedule.due(9_999, false));
        assert!(schedule.due(10_000, false));
    }

    #[test]
    fn test_consumers_coalesce() {
        let mut a = PollSchedule::new(cadence());
        let mut b = PollSchedule::new(cadence());
        let fired_a: Vec<i64> = (0..60).map(|s| s * 1_000).filter(|&t| a.due(t, false)).collect();
        let fired_b: Vec<i64> = (0..60).map(|s| s * 1_000 + 300).filter(|&t| b.due(t, false)).collect();
        let buckets_a: Vec<i64> = fired_a.iter().map(|&t| refresh_bucket(t, cadence().active)).collect();
        let buckets_b: Vec<i64> = fired_b.iter().map(|&t| refresh_bucket(t, cadence().active)).collect();
        assert_eq!(buckets_a, buckets_b);
        assert_eq!(buckets_a.len(), 6);
    }

    #[test]
    fn test_idle_widens_interval() {
        let mut schedule = PollSchedule::new(cadence());
        assert!(schedule.due(0, true));
        assert!(!schedule.due(30_000, true));
        assert!(schedule.due(60_000, true));
    }

    #[test]
    fn test_reset_forces_refresh() {
        let mut schedule = PollSchedule::new(cadence());
        assert!(schedule.due(1_000, false));
        schedule.reset();
        assert!(schedule.due(1_500, false));
    }

    #[test]
    fn test_activity_monitor() {
        let monitor = ActivityMonitor::new(Duration::from_secs(120), 0);
        assert!(!monitor.is_idle(119_999));
        assert!(monitor.is_idle(120_000));
        monitor.record_activity(200_000);
        assert!(!monitor.is_idle(250_000));
        // Older timestamps never move the clock backwards
        monitor.record_activity(10);
        assert!(!monitor.is_idle(250_000));
    }
}
