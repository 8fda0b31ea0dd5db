//! Bounded-retry convergence waits.
//!
//! The provider applies most changes asynchronously: a create call returns an
//! identifier straight away and the resource only reaches its target state
//! later. [`Poller::wait`] re-runs an observation until it reports
//! [`Observation::Converged`], returns an unrecoverable error, the deadline
//! passes, or the caller cancels.
//!
//! Observations run one at a time on a single wait path. Observers should map
//! transient read failures (for example a freshly created resource that is not
//! listable yet) to [`Observation::Pending`] rather than an error; only errors
//! end the wait early.

mod cancel;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, trace};

pub use cancel::{CancelHandle, Cancellation, cancellation};

/// Default cadence between observations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default upper bound on a single convergence wait.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

// tokio intervals reject a zero period.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Result of a single observation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Observation {
    /// The awaited condition holds.
    Converged,
    /// The condition does not hold yet; observe again after the interval.
    Pending,
}

/// Errors raised by [`Poller::wait`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PollError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the deadline passes without a converged observation.
    #[error("condition not observed after {attempts} attempts in {waited:?}")]
    TimedOut {
        /// Number of observations started.
        attempts: u32,
        /// Time spent waiting.
        waited: Duration,
    },
    /// Raised when the caller cancels the wait.
    #[error("wait cancelled after {attempts} attempts")]
    Cancelled {
        /// Number of observations started.
        attempts: u32,
    },
    /// Raised when an observation reports an unrecoverable error.
    #[error("observation failed: {0}")]
    Failed(#[source] E),
}

/// Fixed-cadence poller with a bounded total wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Poller {
    interval: Duration,
    timeout: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT)
    }
}

impl Poller {
    /// Creates a poller that observes every `interval` for at most `timeout`.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Returns the delay between observations.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the maximum total wait.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Observes immediately, then on a fixed cadence of one interval, until
    /// the observation converges.
    ///
    /// Observation start times stay on the `interval` grid regardless of how
    /// long each observation takes. An observation that overruns the interval
    /// is followed straight away by the next one, after which the cadence
    /// realigns to the grid.
    ///
    /// The observer receives the 1-based attempt number. Returns the number of
    /// observations made, including the converged one.
    ///
    /// # Errors
    ///
    /// Returns [`PollError::TimedOut`] once the deadline passes,
    /// [`PollError::Cancelled`] as soon as `cancel` fires, and
    /// [`PollError::Failed`] on the first observation error.
    pub async fn wait<F, Fut, E>(
        &self,
        cancel: &Cancellation,
        mut observe: F,
    ) -> Result<u32, PollError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Observation, E>>,
        E: std::error::Error + 'static,
    {
        let mut signal = cancel.clone();
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut ticks = interval_at(started, self.interval.max(MIN_POLL_INTERVAL));
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                biased;
                () = signal.cancelled() => return Err(PollError::Cancelled { attempts }),
                () = sleep_until(deadline) => {
                    return Err(PollError::TimedOut {
                        attempts,
                        waited: started.elapsed(),
                    });
                }
                _ = ticks.tick() => {}
            }

            attempts = attempts.saturating_add(1);
            let observed = tokio::select! {
                biased;
                () = signal.cancelled() => return Err(PollError::Cancelled { attempts }),
                outcome = observe(attempts) => outcome,
                () = sleep_until(deadline) => {
                    return Err(PollError::TimedOut {
                        attempts,
                        waited: started.elapsed(),
                    });
                }
            };

            match observed.map_err(PollError::Failed)? {
                Observation::Converged => {
                    debug!(attempts, "condition converged");
                    return Ok(attempts);
                }
                Observation::Pending => trace!(attempts, "condition pending"),
            }
        }
    }
}
