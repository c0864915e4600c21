//! Time source for TTL decisions.
//!
//! Wall-clock time is used rather than `Instant` because disk entries carry their creation
//! time across restarts and the sweeper compares against file modification times.

use std::fmt::Debug;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> SystemTime;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to. Starts at the current wall time.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    pub fn starting_at(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: SystemTime) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock()
    }
}

/// Time elapsed from `since` to `now`; zero if `since` lies in the future.
pub fn age(now: SystemTime, since: SystemTime) -> Duration {
    now.duration_since(since).unwrap_or(Duration::ZERO)
}

/// Whether an entry created at `created` has outlived `ttl` at `now`.
///
/// An entry exactly `ttl` old is still fresh.
pub fn is_expired(now: SystemTime, created: SystemTime, ttl: Duration) -> bool {
    age(now, created) > ttl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.advance(Duration::from_secs(90));
        assert_eq!(age(clock.now(), start), Duration::from_secs(90));
    }

    #[test]
    fn test_expiry_boundary() {
        let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let ttl = Duration::from_secs(300);
        assert!(!is_expired(created + ttl, created, ttl));
        assert!(is_expired(created + ttl + Duration::from_millis(1), created, ttl));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let later = now + Duration::from_secs(60);
        assert_eq!(age(now, later), Duration::ZERO);
        assert!(!is_expired(now, later, Duration::from_secs(1)));
    }
}
