//! Time-bounded exponential backoff for transient failures.
//!
//! [`retry`] re-issues an operation while the supplied classifier says the
//! failure is transient, sleeping with exponentially growing delays, until
//! either the operation succeeds, a permanent failure occurs, or the next
//! sleep would push the total past [`RetryPolicy::max_elapsed`]. The last
//! error is returned in the latter two cases.
//!
//! The caller's [`CancellationToken`] is raced against both the operation
//! and every backoff sleep, so cancellation takes effect immediately.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Factor applied to the delay after each retry.
    pub multiplier: f64,
    /// Cap on a single delay.
    pub max_interval: Duration,
    /// Ceiling on total time spent, measured from the first attempt.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_elapsed: Duration::ZERO,
            ..Self::default()
        }
    }

    fn next_interval(&self, current: Duration) -> Duration {
        Duration::from_secs_f64(
            (current.as_secs_f64() * self.multiplier).min(self.max_interval.as_secs_f64()),
        )
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Why [`retry`] gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The cancellation token fired.
    Cancelled,
    /// The last error seen: permanent, or transient with the window spent.
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Failed(err) => write!(f, "{err}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Run `op` until it succeeds, fails permanently, the retry window closes,
/// or `cancel` fires.
pub async fn retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_transient: C,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: fmt::Display,
{
    let started = Instant::now();
    let mut interval = policy.initial_interval;
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
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_transient(&err) {
            debug!(attempt, error = %err, "permanent error, not retrying");
            return Err(RetryError::Failed(err));
        }

        if started.elapsed() + interval > policy.max_elapsed {
            warn!(
                attempt,
                max_elapsed_ms = policy.max_elapsed.as_millis() as u64,
                error = %err,
                "retry window exhausted"
            );
            return Err(RetryError::Failed(err));
        }

        warn!(
            attempt,
            delay_ms = interval.as_millis() as u64,
            error = %err,
            "transient error, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }

        interval = policy.next_interval(interval);
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::is_retryable_message;

    fn transient(err: &String) -> bool {
        is_retryable_message(err)
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt() {
        let mut calls = 0;
        let result: Result<u32, RetryError<String>> =
            retry(&RetryPolicy::default(), &CancellationToken::new(), transient, || {
                calls += 1;
                async { Ok(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_refused_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> =
            retry(&RetryPolicy::default(), &CancellationToken::new(), transient, || {
                calls += 1;
                async { Err("dial tcp 127.0.0.1:3306: connect: connection refused".to_string()) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Failed(ref e)) if e.contains("refused")));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn broken_pipe_is_retried_until_success() {
        let mut calls = 0;
        let result = retry(&RetryPolicy::default(), &CancellationToken::new(), transient, || {
            calls += 1;
            let n = calls;
            async move {
                if n < 3 {
                    Err("write: broken pipe".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transient_error_stops_at_ceiling() {
        let policy = RetryPolicy::default();
        let started = Instant::now();
        let mut calls = 0;
        let result: Result<(), _> = retry(&policy, &CancellationToken::new(), transient, || {
            calls += 1;
            async { Err("broken pipe".to_string()) }
        })
        .await;

        assert!(matches!(result, Err(RetryError::Failed(ref e)) if e == "broken pipe"));
        assert!(calls > 1, "expected at least one retry, got {calls} attempts");
        assert!(started.elapsed() <= policy.max_elapsed);
    }

    #[test]
    fn delays_grow_and_respect_the_cap() {
        let policy = RetryPolicy {
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(3),
            max_elapsed: Duration::from_secs(60),
        };
        assert_eq!(policy.next_interval(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(policy.next_interval(Duration::from_secs(2)), Duration::from_secs(3));
        assert_eq!(policy.next_interval(Duration::from_secs(3)), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_policy_makes_a_single_attempt() {
        let mut calls = 0;
        let result: Result<(), _> =
            retry(&RetryPolicy::none(), &CancellationToken::new(), transient, || {
                calls += 1;
                async { Err("broken pipe".to_string()) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_backoff_returns_promptly() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<(), _> = retry(&RetryPolicy::default(), &cancel, transient, || async {
            Err("connection reset by peer".to_string())
        })
        .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_operation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result: Result<(), RetryError<String>> =
            retry(&RetryPolicy::default(), &cancel, transient, || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn already_cancelled_token_skips_the_operation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0;
        let result: Result<(), RetryError<String>> =
            retry(&RetryPolicy::default(), &cancel, transient, || {
                calls += 1;
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(RetryError::Cancelled)));
        assert_eq!(calls, 0);
    }
}
