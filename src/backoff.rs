//! Delay schedules applied between attempts.
//!
//! Retry index `0` is the initial call and never waits; the first retry is index `1`.
//! The default schedule waits a constant 100ms between attempts: an exponential schedule with
//! a growth factor of 1 degenerates into a fixed interval, and that is what the client uses
//! unless told otherwise.
//!
//! ```rust
//! use std::time::Duration;
//! use insistent::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100), 2)
//!     .with_max(Duration::from_millis(300))
//!     .unwrap();
//! assert_eq!(backoff.delay(0), Duration::ZERO);
//! assert_eq!(backoff.delay(1), Duration::from_millis(100));
//! assert_eq!(backoff.delay(2), Duration::from_millis(200));
//! assert_eq!(backoff.delay(3), Duration::from_millis(300)); // capped
//! ```
//!
//! Overflow saturates to [`MAX_BACKOFF`].

use std::fmt;
use std::time::Duration;

/// Saturation point for delay arithmetic (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Smallest delay between two attempts when nothing else is configured.
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(100);

/// Growth factor of the default schedule.
pub const DEFAULT_FACTOR: u32 = 1;

/// Errors returned by backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffError {
    ConstantDoesNotSupportMax,
    FactorMustBePositive,
    MaxLessThanBase { base: Duration, max: Duration },
}

impl fmt::Display for BackoffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::ConstantDoesNotSupportMax => {
                write!(f, "a constant schedule cannot be capped")
            }
            BackoffError::FactorMustBePositive => write!(f, "factor must be at least 1"),
            BackoffError::MaxLessThanBase { base, max } => {
                write!(f, "max ({:?}) must be >= base ({:?})", max, base)
            }
        }
    }
}

impl std::error::Error for BackoffError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Schedule {
    Constant { delay: Duration },
    Exponential { base: Duration, factor: u32, max: Option<Duration> },
}

impl Schedule {
    fn delay(&self, retry: usize) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        match *self {
            Schedule::Constant { delay } => delay.min(MAX_BACKOFF),
            Schedule::Exponential { base, factor, max } => {
                let exponent = retry.saturating_sub(1).min(u32::MAX as usize) as u32;
                let multiplier = u128::from(factor).saturating_pow(exponent);
                let nanos = base.as_nanos().saturating_mul(multiplier);
                let grown = Duration::from_nanos(nanos.min(MAX_BACKOFF.as_nanos()) as u64);
                max.map(|m| grown.min(m)).unwrap_or(grown).min(MAX_BACKOFF)
            }
        }
    }
}

/// Delay schedule used by [`RetryPolicy`](crate::RetryPolicy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    schedule: Schedule,
}

impl Backoff {
    /// Wait the same `delay` before every retry.
    pub fn constant(delay: Duration) -> Self {
        Self { schedule: Schedule::Constant { delay } }
    }

    /// Wait `base * factor^(retry - 1)` before each retry.
    ///
    /// A `factor` of zero is treated as one.
    pub fn exponential(base: Duration, factor: u32) -> Self {
        Self { schedule: Schedule::Exponential { base, factor: factor.max(1), max: None } }
    }

    /// Like [`Backoff::exponential`] but rejects a zero factor instead of clamping it.
    pub fn try_exponential(base: Duration, factor: u32) -> Result<Self, BackoffError> {
        if factor == 0 {
            return Err(BackoffError::FactorMustBePositive);
        }
        Ok(Self::exponential(base, factor))
    }

    /// Cap an exponential schedule. Fails on constant schedules and when `max < base`.
    pub fn with_max(mut self, max: Duration) -> Result<Self, BackoffError> {
        match &mut self.schedule {
            Schedule::Exponential { base, max: existing, .. } => {
                if max < *base {
                    return Err(BackoffError::MaxLessThanBase { base: *base, max });
                }
                *existing = Some(max);
                Ok(self)
            }
            Schedule::Constant { .. } => Err(BackoffError::ConstantDoesNotSupportMax),
        }
    }

    /// Delay before retry number `retry` (0 = initial call, no delay).
    pub fn delay(&self, retry: usize) -> Duration {
        self.schedule.delay(retry)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::exponential(DEFAULT_MIN_DELAY, DEFAULT_FACTOR)
    }
}
