//! Deadline-aware retries with exponential backoff and jitter.
//!
//! Every operation runs under a [`Deadline`] inherited from the orchestrator.
//! Retry and wait loops stop a safety pad before that deadline so that the
//! final answer (including any warnings) still reaches the caller, and they
//! unwind immediately when the deadline's cancellation token fires.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ControlError, Result};

/// Time kept free before the caller's deadline.
pub const SAFETY_PAD: Duration = Duration::from_secs(30);

/// The point in time an operation must finish by.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    pad: Duration,
    cancel: CancellationToken,
}

impl Deadline {
    /// A deadline `timeout` from now with the default safety pad.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
            pad: SAFETY_PAD,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the safety pad.
    #[must_use]
    pub fn with_pad(mut self, pad: Duration) -> Self {
        self.pad = pad;
        self
    }

    /// Tie the deadline to an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left until the hard deadline.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Time left for backoff loops: the remaining time minus the safety pad.
    #[must_use]
    pub fn backoff_budget(&self) -> Duration {
        self.remaining().saturating_sub(self.pad)
    }

    /// Returns true once the caller cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Cancelled` if the token fires first.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(ControlError::Cancelled),
            () = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Initial delay between attempts.
    pub initial_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl Backoff {
    /// Backoff with the given first and maximum delay.
    #[must_use]
    pub const fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier: 2.0,
        }
    }

    fn next(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.multiplier).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Add jitter: 0.5x to 1.5x of the delay.
fn jittered(delay: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * jitter)
}

/// Run `operation` until it succeeds, fails permanently or the backoff budget
/// of `deadline` is spent.
///
/// Only errors for which [`ControlError::is_retriable`] holds are retried; the
/// last error is returned once no further attempt fits before the deadline.
///
/// # Errors
///
/// Returns the operation's error, or `ControlError::Cancelled`.
pub async fn retry<F, Fut, T>(
    deadline: &Deadline,
    backoff: &Backoff,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut delay = backoff.initial_delay;

    loop {
        attempt += 1;
        if deadline.is_cancelled() {
            return Err(ControlError::Cancelled);
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retriable() => {
                let wait = jittered(delay);
                if wait >= deadline.backoff_budget() {
                    warn!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "Operation failed, no time left to retry"
                    );
                    return Err(e);
                }

                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    delay_ms = wait.as_millis(),
                    "Operation failed, retrying"
                );
                deadline.sleep(wait).await?;
                delay = backoff.next(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// One observation of a polled condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Poll<T> {
    /// The condition holds.
    Ready(T),
    /// Not yet; carries a description of the current state.
    Pending(String),
}

/// How a wait loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    /// The condition was observed.
    Ready(T),
    /// The backoff budget ran out; carries the last observed state.
    TimedOut(String),
    /// The caller cancelled.
    Cancelled(String),
}

/// Poll `check` with exponential backoff until it reports ready.
///
/// Retriable errors from `check` count as "not ready yet". Running out of time
/// or being cancelled is not an error; the caller decides whether that
/// deserves a warning.
///
/// # Errors
///
/// Returns non-retriable errors from `check`.
pub async fn wait_for<F, Fut, T>(
    deadline: &Deadline,
    backoff: &Backoff,
    operation_name: &str,
    mut check: F,
) -> Result<WaitOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>>>,
{
    let mut delay = backoff.initial_delay;
    let mut last = "no observation yet".to_string();

    loop {
        if deadline.is_cancelled() {
            return Ok(WaitOutcome::Cancelled(last));
        }

        match check().await {
            Ok(Poll::Ready(value)) => return Ok(WaitOutcome::Ready(value)),
            Ok(Poll::Pending(state)) => {
                debug!(operation = %operation_name, state = %state, "Still waiting");
                last = state;
            }
            Err(e) if e.is_retriable() => {
                debug!(operation = %operation_name, error = %e, "Transient error while waiting");
                last = e.to_string();
            }
            Err(e) => return Err(e),
        }

        let budget = deadline.backoff_budget();
        if budget.is_zero() {
            return Ok(WaitOutcome::TimedOut(last));
        }
        let wait = jittered(delay).min(budget);
        if deadline.sleep(wait).await.is_err() {
            return Ok(WaitOutcome::Cancelled(last));
        }
        delay = backoff.next(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> Backoff {
        Backoff::new(Duration::from_millis(5), Duration::from_millis(20))
    }

    fn deadline(ms: u64) -> Deadline {
        Deadline::after(Duration::from_millis(ms)).with_pad(Duration::ZERO)
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);

        let result = retry(&deadline(2_000), &fast(), "op", || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ControlError::Transport("connection reset".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_on_permanent_error() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);

        let result: Result<()> = retry(&deadline(2_000), &fast(), "op", || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err(ControlError::validation("bad input")) }
        })
        .await;

        assert!(matches!(result, Err(ControlError::Validation { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_respects_safety_pad() {
        let d = Deadline::after(Duration::from_millis(100)).with_pad(Duration::from_millis(100));
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);

        let result: Result<()> = retry(&d, &fast(), "op", || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err(ControlError::Transport("down".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wait_times_out_without_error() {
        let outcome: WaitOutcome<()> = wait_for(&deadline(50), &fast(), "wait", || async {
            Ok(Poll::Pending("appliance_ready".to_string()))
        })
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::TimedOut("appliance_ready".to_string()));
    }

    #[tokio::test]
    async fn wait_observes_ready() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);

        let outcome = wait_for(&deadline(2_000), &fast(), "wait", || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 3 {
                    Ok(Poll::Pending(format!("attempt {n}")))
                } else {
                    Ok(Poll::Ready(n))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, WaitOutcome::Ready(3));
    }

    #[tokio::test]
    async fn cancellation_unwinds_wait() {
        let d = deadline(10_000);
        d.cancellation().cancel();

        let outcome: WaitOutcome<()> = wait_for(&d, &fast(), "wait", || async {
            Ok(Poll::Pending("seeded".to_string()))
        })
        .await
        .unwrap();

        assert!(matches!(outcome, WaitOutcome::Cancelled(_)));
    }
}
