#![forbid(unsafe_code)]

//! Logical-time rate limiting.

use web_time::Duration;

/// Admits at most one evaluation per `interval` of logical time.
///
/// The first check always passes. After that a check passes once `now` is at
/// least `interval` past the last admitted check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateGovernor {
    interval: Duration,
    last: Option<Duration>,
}

impl RateGovernor {
    /// A governor admitting one check per `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Minimum spacing between admitted checks.
    #[inline]
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Logical time of the last admitted check.
    #[must_use]
    pub const fn last(&self) -> Option<Duration> {
        self.last
    }

    /// Whether an evaluation at `now` is admitted. Records `now` if so.
    pub fn check(&mut self, now: Duration) -> bool {
        let due = match self.last {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }

    /// Forget the last admitted check.
    pub fn reset(&mut self) {
        self.last = None;
    }
}
