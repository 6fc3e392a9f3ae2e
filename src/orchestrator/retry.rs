use crate::error::{AppError, Result};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl Backoff {
    pub fn constant(delay: Duration) -> Self {
        Self {
            initial: delay,
            factor: 1,
            max: delay,
        }
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            factor: 2,
            max,
        }
    }

    /// Delay after the given failed attempt, counting from 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        self.initial
            .saturating_mul(self.factor.saturating_pow(exponent))
            .min(self.max)
    }
}

/// Bounded retry shared by the collector steps and the orchestrator.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    retryable: fn(&AppError) -> bool,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

fn is_timeout(error: &AppError) -> bool {
    matches!(error, AppError::Timeout(_))
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff, retryable: fn(&AppError) -> bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            retryable,
        }
    }

    /// Retries the errors [`AppError::is_transient`] accepts.
    pub fn transient(max_attempts: u32, backoff: Backoff) -> Self {
        Self::new(max_attempts, backoff, AppError::is_transient)
    }

    pub fn timeouts(max_attempts: u32, backoff: Backoff) -> Self {
        Self::new(max_attempts, backoff, is_timeout)
    }

    pub fn is_retryable(&self, error: &AppError) -> bool {
        (self.retryable)(error)
    }

    /// `None` once the budget is spent or the error is not recoverable.
    pub fn next_delay(&self, attempt: u32, error: &AppError) -> Option<Duration> {
        if attempt >= self.max_attempts || !self.is_retryable(error) {
            None
        } else {
            Some(self.backoff.delay(attempt))
        }
    }

    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) => match self.next_delay(attempt, &err) {
                    Some(delay) => {
                        tracing::warn!(
                            operation,
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(err),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_growth_is_capped() {
        let backoff = Backoff::exponential(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(200));
        assert_eq!(backoff.delay(3), Duration::from_millis(350));
        assert_eq!(Backoff::constant(Duration::from_secs(1)).delay(9), Duration::from_secs(1));
    }

    #[test]
    fn test_next_delay_respects_budget_and_predicate() {
        let policy = RetryPolicy::transient(3, Backoff::constant(Duration::ZERO));
        let destroyed = AppError::ContextDestroyed("gone".into());

        assert!(policy.next_delay(1, &destroyed).is_some());
        assert!(policy.next_delay(2, &destroyed).is_some());
        assert!(policy.next_delay(3, &destroyed).is_none());
        assert!(policy.next_delay(1, &AppError::EmptyResult).is_none());

        let timeouts = RetryPolicy::timeouts(3, Backoff::constant(Duration::ZERO));
        assert!(timeouts.next_delay(1, &AppError::Timeout("slow".into())).is_some());
        assert!(timeouts.next_delay(1, &destroyed).is_none());
    }

    #[tokio::test]
    async fn test_run_retries_until_success() {
        let policy = RetryPolicy::transient(3, Backoff::constant(Duration::ZERO));
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let value = policy
            .run("probe", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(AppError::Timeout(format!("call {}", n)))
                } else {
                    Ok(n)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_permanent_error() {
        let policy = RetryPolicy::transient(5, Backoff::constant(Duration::ZERO));
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: Result<()> = policy
            .run("probe", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Evaluation("syntax error".into()))
            })
            .await;

        assert!(matches!(result, Err(AppError::Evaluation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
