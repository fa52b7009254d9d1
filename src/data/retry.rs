//! Retry policy for blocking network calls.
//!
//! The policy is a plain value (attempt budget + exponential backoff) run
//! synchronously by the caller. Sleeping goes through `Sleeper` so tests can
//! record the schedule instead of waiting on it.

use std::cell::RefCell;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

/// How a retried operation ended without success.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryFailure<E> {
    /// Every attempt hit a transient error; `last` is the final one.
    Exhausted { attempts: usize, last: E },
    /// A non-transient error stopped the loop immediately.
    Fatal { attempt: usize, error: E },
}

pub trait Sleeper {
    fn sleep(&self, delay: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Records requested delays without sleeping.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    pub delays: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, delay: Duration) {
        self.delays.borrow_mut().push(delay);
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` is 1-based.
    ///
    /// 1s, 2s, 4s, ... for the default policy.
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.initial_backoff
            .saturating_mul(self.multiplier.saturating_pow(exp))
    }

    /// Run `op` until it succeeds, fails non-transiently, or the budget is spent.
    pub fn run<T, E, F, P>(&self, sleeper: &dyn Sleeper, mut op: F, is_transient: P) -> Result<T, RetryFailure<E>>
    where
        F: FnMut(usize) -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(error) if !is_transient(&error) => {
                    return Err(RetryFailure::Fatal { attempt, error });
                }
                Err(error) if attempt >= max_attempts => {
                    return Err(RetryFailure::Exhausted { attempts: attempt, last: error });
                }
                Err(error) => {
                    let delay = self.delay_after(attempt);
                    warn!(attempt, max_attempts, ?delay, %error, "transient failure, backing off");
                    sleeper.sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
