// src/provider/retry.rs — Retry-with-timeout combinator for external calls
//
// Every attempt runs under its own timeout and races the abort signal.
// Retries: rate limits, retriable provider/agent errors, per-attempt timeouts.
// Does NOT retry: aborts, parse failures, non-retriable provider errors.

use std::future::Future;
use std::time::Duration;

use crate::core::abort::AbortSignal;
use crate::infra::config::{AgentsSection, EvaluatorSection};
use crate::infra::errors::RaceError;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const BACKOFF_FACTOR: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    /// Applies to each attempt separately.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            backoff_factor: BACKOFF_FACTOR,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl From<&AgentsSection> for RetryPolicy {
    fn from(section: &AgentsSection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            base_delay: Duration::from_millis(section.base_delay_ms),
            backoff_factor: BACKOFF_FACTOR,
            timeout: Duration::from_secs(section.timeout_seconds),
        }
    }
}

impl From<&EvaluatorSection> for RetryPolicy {
    fn from(section: &EvaluatorSection) -> Self {
        Self {
            max_attempts: section.judge_max_attempts.max(1),
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            backoff_factor: BACKOFF_FACTOR,
            timeout: Duration::from_secs(section.judge_timeout_seconds),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-indexed): `base × factor^(attempt-1)`.
    /// A server-provided retry hint wins when it is longer.
    pub fn delay_for_attempt(&self, attempt: u32, retry_hint: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.backoff_factor.max(1.5);
        let ms = self.base_delay.as_millis() as f64 * factor.powi(exponent);
        let computed = Duration::from_millis(ms as u64);
        match retry_hint {
            Some(hint) if hint > computed => hint,
            _ => computed,
        }
    }
}

/// Run `op` until it succeeds, fails terminally, or attempts run out.
///
/// `op` receives the 1-indexed attempt number. A timed-out attempt is a
/// `Timeout`; running out of attempts is `RetriesExhausted` carrying the last
/// error. With a single configured attempt the attempt's own error is returned.
pub async fn retry_with_timeout<T, F, Fut>(
    policy: &RetryPolicy,
    abort: &AbortSignal,
    operation: &str,
    mut op: F,
) -> Result<T, RaceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RaceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error: Option<RaceError> = None;

    for attempt in 1..=max_attempts {
        if abort.is_aborted() {
            return Err(RaceError::Aborted);
        }

        let outcome = tokio::select! {
            biased;
            _ = abort.aborted() => return Err(RaceError::Aborted),
            res = tokio::time::timeout(policy.timeout, op(attempt)) => res,
        };

        let error = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if e.is_aborted() || !e.is_retriable() => return Err(e),
            Ok(Err(e)) => e,
            Err(_) => RaceError::Timeout {
                operation: operation.to_string(),
                timeout_ms: policy.timeout.as_millis() as u64,
            },
        };

        if attempt == max_attempts {
            last_error = Some(error);
            break;
        }

        let delay = policy.delay_for_attempt(attempt, error.retry_after());
        tracing::warn!(
            operation,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Retrying after error: {}",
            error
        );
        last_error = Some(error);

        tokio::select! {
            biased;
            _ = abort.aborted() => return Err(RaceError::Aborted),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    match last_error {
        Some(e) if max_attempts == 1 => Err(e),
        Some(e) => Err(RaceError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: max_attempts,
            last_error: e.to_string(),
        }),
        None => Err(RaceError::RetriesExhausted {
            operation: operation.to_string(),
            attempts: max_attempts,
            last_error: "no attempt completed".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::abort::AbortHandle;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(2),
            backoff_factor: 2.0,
            timeout: Duration::from_millis(50),
        }
    }

    fn transient() -> RaceError {
        RaceError::Provider {
            provider: "test".into(),
            message: "HTTP 503".into(),
            retriable: true,
        }
    }

    #[test]
    fn test_delays_strictly_increase() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..=6).map(|k| policy.delay_for_attempt(k, None)).collect();
        assert_eq!(delays[0], Duration::from_millis(1_000));
        assert_eq!(delays[1], Duration::from_millis(2_000));
        for pair in delays.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_delay_factor_floor_keeps_increase() {
        let policy = RetryPolicy {
            backoff_factor: 1.0,
            ..RetryPolicy::default()
        };
        assert!(policy.delay_for_attempt(2, None) > policy.delay_for_attempt(1, None));
    }

    #[test]
    fn test_delay_uses_longer_retry_hint() {
        let policy = RetryPolicy::default();
        let d = policy.delay_for_attempt(1, Some(Duration::from_secs(7)));
        assert_eq!(d, Duration::from_secs(7));
        let d = policy.delay_for_attempt(3, Some(Duration::from_millis(10)));
        assert_eq!(d, Duration::from_millis(4_000));
    }

    #[test]
    fn test_policy_from_agents_section() {
        let section = AgentsSection {
            max_attempts: 0,
            base_delay_ms: 250,
            timeout_seconds: 9,
            ..AgentsSection::default()
        };
        let policy = RetryPolicy::from(&section);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(250));
        assert_eq!(policy.timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_policy_from_evaluator_section() {
        let section = EvaluatorSection {
            judge_max_attempts: 2,
            judge_timeout_seconds: 15,
            ..EvaluatorSection::default()
        };
        let policy = RetryPolicy::from(&section);
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.timeout, Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let abort = AbortHandle::new();
        let c = calls.clone();
        let result = retry_with_timeout(&fast_policy(3), &abort.signal(), "gen", move |_| {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_distinct_from_timeout() {
        let abort = AbortHandle::new();
        let result: Result<(), _> =
            retry_with_timeout(&fast_policy(2), &abort.signal(), "gen", |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        match result {
            Err(RaceError::RetriesExhausted {
                attempts,
                last_error,
                ..
            }) => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_single_attempt_timeout_surfaces_timeout() {
        let abort = AbortHandle::new();
        let result: Result<(), _> =
            retry_with_timeout(&fast_policy(1), &abort.signal(), "judge", |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(RaceError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_non_retriable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));
        let abort = AbortHandle::new();
        let c = calls.clone();
        let result: Result<(), _> =
            retry_with_timeout(&fast_policy(5), &abort.signal(), "gen", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err(RaceError::Parse("no HYPOTHESIS blocks".into())) }
            })
            .await;
        assert!(matches!(result, Err(RaceError::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_interrupts_in_flight_attempt() {
        let abort = AbortHandle::new();
        let signal = abort.signal();
        let task = tokio::spawn(async move {
            retry_with_timeout(
                &RetryPolicy {
                    timeout: Duration::from_secs(10),
                    ..fast_policy(3)
                },
                &signal,
                "gen",
                |_| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok::<_, RaceError>(())
                },
            )
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        abort.abort();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(RaceError::Aborted)));
    }

    #[tokio::test]
    async fn test_already_aborted_never_calls() {
        let abort = AbortHandle::new();
        abort.abort();
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), _> =
            retry_with_timeout(&fast_policy(3), &abort.signal(), "gen", move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(result.unwrap_err().is_aborted());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
