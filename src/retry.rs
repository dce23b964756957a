//! Retrying timed-out exchanges
//!
//! The exchange engine never retries on its own: a timeout is returned to the caller,
//! who decides what happens next. The usual answer for a receiver is "listen again after a
//! short pause", which is what [`until_not_timeout`] does. Any other error, and any success,
//! ends the loop immediately.
//!
//! # Example
//! ```no_run
//! use core::time::Duration;
//! use sx127x::retry::{until_not_timeout, RetryPolicy};
//! # fn run<T: sx127x::RegisterTransport, D: embedded_hal::delay::DelayNs>(
//! #     radio: &mut sx127x::Sx127x<T, D, sx127x::Rfm96>,
//! #     delay: &mut D,
//! # ) -> Result<(), sx127x::Error<T::Error>> {
//! let mut buf = [0u8; 64];
//! let len = until_not_timeout(&RetryPolicy::default(), delay, || {
//!     radio.receive(&mut buf, Some(Duration::from_millis(500)))
//! })?;
//! # Ok(())
//! # }
//! ```

use core::time::Duration;

use embedded_hal::delay::DelayNs;
use log::trace;

use crate::error::Error;

/// How often and how fast to retry after a timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, `None` for no limit
    pub max_attempts: Option<u32>,
    /// Pause between two attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    /// Retry forever with a 1 ms pause
    fn default() -> Self {
        Self::forever(Duration::from_millis(1))
    }
}

impl RetryPolicy {
    /// Retries until the operation stops timing out
    pub const fn forever(backoff: Duration) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    /// Gives up after `max_attempts` attempts in total
    pub const fn attempts(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    /// Whether another attempt is allowed after `made` attempts
    pub fn allows_another(&self, made: u32) -> bool {
        self.max_attempts.map_or(true, |max| made < max)
    }

    fn backoff_us(&self) -> u32 {
        u32::try_from(self.backoff.as_micros()).unwrap_or(u32::MAX)
    }
}

/// Runs `attempt` until it returns something other than a timeout
///
/// Returns the last timeout once the policy's attempt budget is spent.
pub fn until_not_timeout<T, E, D, F>(
    policy: &RetryPolicy,
    delay: &mut D,
    mut attempt: F,
) -> Result<T, Error<E>>
where
    D: DelayNs,
    F: FnMut() -> Result<T, Error<E>>,
{
    retry_with(policy, delay, |delay, us| delay.delay_us(us), |_| attempt())
}

/// Attempt loop shared by [`until_not_timeout`] and the radio's own retrying receive
///
/// `context` is handed to both closures in turn, so the pause and the attempt may borrow
/// the same handle.
pub(crate) fn retry_with<C, T, E, P, F>(
    policy: &RetryPolicy,
    context: &mut C,
    mut pause: P,
    mut attempt: F,
) -> Result<T, Error<E>>
where
    P: FnMut(&mut C, u32),
    F: FnMut(&mut C) -> Result<T, Error<E>>,
{
    let mut made = 0u32;
    loop {
        made = made.saturating_add(1);
        match attempt(context) {
            Err(e) if e.is_timeout() && policy.allows_another(made) => {
                trace!("attempt {} timed out, retrying", made);
                pause(context, policy.backoff_us());
            }
            other => return other,
        }
    }
}
