#![forbid(unsafe_code)]

//! Logical-time waits.
//!
//! A [`Delay`] is checked once per loop cycle (each poll re-arms a
//! next-cycle wake). It resolves to a [`WaitOutcome`] rather than an error:
//! timing out or being cancelled are ordinary results. Callers that prefer
//! `?` use [`WaitOutcome::into_result`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use ftick_core::Lifetime;
use web_time::Duration;

use crate::error::{RuntimeError, RuntimeResult};
use crate::time::{RateGovernor, TimeScheduler};

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The duration elapsed or the predicate held.
    Satisfied,
    /// The timeout elapsed first.
    TimedOut {
        /// Logical time spent waiting.
        waited: Duration,
    },
    /// The anchor lifetime expired first.
    Cancelled,
}

impl WaitOutcome {
    /// Whether the condition was met.
    #[inline]
    #[must_use]
    pub fn is_satisfied(self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// `Ok(())` when satisfied, otherwise [`RuntimeError::Timeout`] or
    /// [`RuntimeError::Cancelled`].
    pub fn into_result(self) -> RuntimeResult<()> {
        match self {
            Self::Satisfied => Ok(()),
            Self::TimedOut { waited } => Err(RuntimeError::Timeout { waited }),
            Self::Cancelled => Err(RuntimeError::Cancelled),
        }
    }
}

/// Options for [`TimeScheduler::delay_until`].
#[derive(Debug, Clone, Default)]
pub struct DelayOptions {
    /// Give up after this much logical time.
    pub timeout: Option<Duration>,
    /// Re-check the predicate at most this often (default: every cycle).
    pub poll_interval: Option<Duration>,
    /// Cancel the wait when this lifetime expires.
    pub lifetime: Option<Lifetime>,
}

impl DelayOptions {
    /// Give up after `timeout` of logical time.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Re-check at most once per `interval` of logical time.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Cancel the wait when `lifetime` expires.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: &Lifetime) -> Self {
        self.lifetime = Some(lifetime.clone());
        self
    }

    pub(crate) fn validate(&self) -> RuntimeResult<()> {
        let zero = |d: Option<Duration>| d.is_some_and(|d| d.is_zero());
        if zero(self.timeout) || zero(self.poll_interval) {
            return Err(RuntimeError::ZeroDurationWait);
        }
        Ok(())
    }
}

enum Condition {
    Elapsed(Duration),
    Predicate {
        check: Box<dyn FnMut() -> bool>,
        governor: Option<RateGovernor>,
    },
}

/// Future returned by [`TimeScheduler::delay_for`] and
/// [`TimeScheduler::delay_until`].
#[must_use = "futures do nothing unless awaited"]
pub struct Delay {
    scheduler: TimeScheduler,
    started_at: Duration,
    condition: Condition,
    timeout: Option<Duration>,
    lifetime: Option<Lifetime>,
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let condition = match &self.condition {
            Condition::Elapsed(d) => format!("elapsed({d:?})"),
            Condition::Predicate { .. } => "predicate".to_owned(),
        };
        f.debug_struct("Delay")
            .field("started_at", &self.started_at)
            .field("condition", &condition)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Delay {
    pub(crate) fn elapsed(scheduler: TimeScheduler, duration: Duration) -> Self {
        Self {
            started_at: scheduler.now(),
            scheduler,
            condition: Condition::Elapsed(duration),
            timeout: None,
            lifetime: None,
        }
    }

    pub(crate) fn predicate(
        scheduler: TimeScheduler,
        check: Box<dyn FnMut() -> bool>,
        options: DelayOptions,
    ) -> Self {
        Self {
            started_at: scheduler.now(),
            scheduler,
            condition: Condition::Predicate {
                check,
                governor: options.poll_interval.map(RateGovernor::new),
            },
            timeout: options.timeout,
            lifetime: options.lifetime,
        }
    }

    fn evaluate(&mut self) -> Option<WaitOutcome> {
        if self.lifetime.as_ref().is_some_and(Lifetime::is_expired) {
            return Some(WaitOutcome::Cancelled);
        }
        let now = self.scheduler.now();
        let waited = now.saturating_sub(self.started_at);
        let satisfied = match &mut self.condition {
            Condition::Elapsed(duration) => waited >= *duration,
            Condition::Predicate { check, governor } => {
                let due = governor.as_mut().is_none_or(|g| g.check(now));
                due && check()
            }
        };
        if satisfied {
            return Some(WaitOutcome::Satisfied);
        }
        match self.timeout {
            Some(timeout) if waited >= timeout => Some(WaitOutcome::TimedOut { waited }),
            _ => None,
        }
    }
}

impl Future for Delay {
    type Output = WaitOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<WaitOutcome> {
        match self.evaluate() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                self.scheduler
                    .event_loop()
                    .wake_next_cycle(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_mapping() {
        assert_eq!(WaitOutcome::Satisfied.into_result(), Ok(()));
        assert_eq!(
            WaitOutcome::Cancelled.into_result(),
            Err(RuntimeError::Cancelled)
        );
        let waited = Duration::from_millis(40);
        assert_eq!(
            WaitOutcome::TimedOut { waited }.into_result(),
            Err(RuntimeError::Timeout { waited })
        );
        assert!(WaitOutcome::Satisfied.is_satisfied());
        assert!(!WaitOutcome::Cancelled.is_satisfied());
    }

    #[test]
    fn zero_options_rejected() {
        let opts = DelayOptions::default().with_timeout(Duration::ZERO);
        assert_eq!(opts.validate(), Err(RuntimeError::ZeroDurationWait));
        let opts = DelayOptions::default().with_poll_interval(Duration::ZERO);
        assert_eq!(opts.validate(), Err(RuntimeError::ZeroDurationWait));
        assert!(DelayOptions::default().validate().is_ok());
    }
}
