//! Session pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Configuration for a [`SessionPool`](crate::SessionPool).
///
/// All limits are soft-wired to the defaults the service tolerates well;
/// override them per deployment. `0` means "unbounded" for `max_opened` and
/// `max_burst`.
#[derive(Debug, Clone)]
pub struct SessionPoolConfig {
    /// Floor on the total number of open sessions. The maintainer replenishes
    /// the pool back to this count when sessions break or expire.
    pub min_opened: u64,

    /// Ceiling on the total number of open sessions, idle or checked out
    /// (0 = unbounded). Once reached, `take` blocks until a session frees up.
    pub max_opened: u64,

    /// Target ceiling on idle (not checked-out) sessions. Used by the
    /// maintainer when provisioning headroom after sessions broke.
    pub max_idle: u64,

    /// Maximum number of session-creation RPCs in flight at once
    /// (0 = unbounded).
    pub max_burst: usize,

    /// Fraction of open sessions to keep write-prepared, in `[0.0, 1.0]`.
    /// A write-prepared session carries an open transaction, saving the
    /// first-write round trip.
    pub write_sessions: f64,

    /// Number of background health-check workers. `0` disables background
    /// checking entirely; `take` still pings overdue sessions itself.
    pub health_check_workers: usize,

    /// Target average time between health checks per session.
    pub health_check_interval: Duration,

    /// Sampling cadence of the maintainer loop.
    pub health_check_sample_interval: Duration,

    /// Deadline applied to `take`/`take_write_session`. `None` waits
    /// indefinitely; use the `_with_timeout` variants for per-call deadlines.
    pub acquire_timeout: Option<Duration>,
}

impl Default for SessionPoolConfig {
    fn default() -> Self {
        Self {
            min_opened: 0,
            max_opened: 400,
            max_idle: 0,
            max_burst: 10,
            write_sessions: 0.2,
            health_check_workers: 10,
            health_check_interval: Duration::from_secs(5 * 60),
            health_check_sample_interval: Duration::from_secs(60),
            acquire_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl SessionPoolConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum number of open sessions.
    #[must_use]
    pub fn min_opened(mut self, count: u64) -> Self {
        self.min_opened = count;
        self
    }

    /// Set the maximum number of open sessions (0 = unbounded).
    #[must_use]
    pub fn max_opened(mut self, count: u64) -> Self {
        self.max_opened = count;
        self
    }

    /// Set the idle-session target ceiling.
    #[must_use]
    pub fn max_idle(mut self, count: u64) -> Self {
        self.max_idle = count;
        self
    }

    /// Set the creation-RPC burst limit (0 = unbounded).
    #[must_use]
    pub fn max_burst(mut self, count: usize) -> Self {
        self.max_burst = count;
        self
    }

    /// Set the write-prepared session fraction.
    #[must_use]
    pub fn write_sessions(mut self, fraction: f64) -> Self {
        self.write_sessions = fraction;
        self
    }

    /// Set the number of health-check workers.
    #[must_use]
    pub fn health_check_workers(mut self, count: usize) -> Self {
        self.health_check_workers = count;
        self
    }

    /// Set the target average time between health checks per session.
    #[must_use]
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Set the maintainer sampling cadence.
    #[must_use]
    pub fn health_check_sample_interval(mut self, interval: Duration) -> Self {
        self.health_check_sample_interval = interval;
        self
    }

    /// Set the session-acquisition deadline (`None` waits indefinitely).
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// Worker counts and intervals are unsigned types, so the only
    /// representable violations are an inverted min/max pair and a
    /// write fraction outside `[0.0, 1.0]`.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_opened > 0 && self.min_opened > self.max_opened {
            return Err(PoolError::MinOpenedGreaterThanMaxOpened {
                min_opened: self.min_opened,
                max_opened: self.max_opened,
            });
        }
        if !(0.0..=1.0).contains(&self.write_sessions) {
            return Err(PoolError::WriteFractionOutOfRange(self.write_sessions));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]

    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SessionPoolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_min_greater_than_max_rejected() {
        let config = SessionPoolConfig::new().min_opened(10).max_opened(5);
        match config.validate() {
            Err(PoolError::MinOpenedGreaterThanMaxOpened {
                min_opened,
                max_opened,
            }) => {
                assert_eq!(min_opened, 10);
                assert_eq!(max_opened, 5);
            }
            other => panic!("expected min/max error, got {other:?}"),
        }
    }

    #[test]
    fn test_unbounded_max_allows_any_min() {
        let config = SessionPoolConfig::new().min_opened(10).max_opened(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_write_fraction_bounds() {
        for bad in [-0.1, 2.0, f64::NAN] {
            let config = SessionPoolConfig::new().write_sessions(bad);
            assert!(
                matches!(config.validate(), Err(PoolError::WriteFractionOutOfRange(_))),
                "fraction {bad} should be rejected"
            );
        }
        for good in [0.0, 0.5, 1.0] {
            assert!(SessionPoolConfig::new().write_sessions(good).validate().is_ok());
        }
    }

    #[test]
    fn test_fluent_setters() {
        let config = SessionPoolConfig::new()
            .min_opened(5)
            .max_opened(50)
            .max_burst(3)
            .health_check_workers(2);
        assert_eq!(config.min_opened, 5);
        assert_eq!(config.max_opened, 50);
        assert_eq!(config.max_burst, 3);
        assert_eq!(config.health_check_workers, 2);
    }
}
