//! Exponential-backoff retry policy
//!
//! [`Retrier`] wraps any fallible async operation. Errors opt in to being
//! retried through [`Transient`]; everything else is returned on the first
//! failure. The policy knows nothing about what it retries.
//!
//! ```text
//! Attempting ──ok──────────────▶ Success
//!     │ transient error
//!     ▼
//! Retry-wait ──delay elapsed───▶ Attempting
//!     │ budget exceeded / cancelled
//!     ▼
//! Abandoned
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors that may succeed when the operation is repeated
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Why a retried operation was abandoned
#[derive(Debug)]
pub enum RetryError<E> {
    /// The caller's context was cancelled
    Cancelled,

    /// The error is not worth retrying
    Permanent(E),

    /// The elapsed-time budget ran out; `last` is the final operation error
    Exhausted { attempts: u32, last: E },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Cancelled => write!(f, "operation cancelled"),
            RetryError::Permanent(err) => write!(f, "{}", err),
            RetryError::Exhausted { attempts, last } => {
                write!(f, "gave up after {} attempts: {}", attempts, last)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Exponential-backoff retry policy
#[derive(Debug, Clone)]
pub struct Retrier {
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed: Duration,
}

impl Default for Retrier {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            multiplier: 2.0,
            max_interval: Duration::from_secs(2),
            max_elapsed: Duration::from_secs(10),
        }
    }
}

impl Retrier {
    pub fn new(
        initial_interval: Duration,
        multiplier: f64,
        max_interval: Duration,
        max_elapsed: Duration,
    ) -> Self {
        Self {
            initial_interval,
            multiplier: multiplier.max(1.0),
            max_interval,
            max_elapsed,
        }
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_max_elapsed(mut self, elapsed: Duration) -> Self {
        self.max_elapsed = elapsed;
        self
    }

    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1).min(64) as i32);
        let secs = self.initial_interval.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(secs)
        }
    }

    /// Run `op` until it succeeds, fails permanently, the elapsed-time budget
    /// runs out or `cancel` fires
    pub async fn run<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Transient + fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                result = op() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(RetryError::Permanent(err)),
                Err(err) => err,
            };

            let delay = self.delay_for(attempt);
            if started.elapsed() + delay > self.max_elapsed {
                debug!("giving up after {attempt} attempts: {err}");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }

            debug!("attempt {attempt} failed ({err}), retrying in {delay:?}");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
