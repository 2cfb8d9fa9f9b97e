//! Retry with exponential backoff for collaborator calls.
//!
//! [`with_retry`] runs one call under a per-attempt timeout and retries
//! transient failures ([`CollaboratorError::is_transient`]):
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - timeouts and connection errors → retry
//! - anything else → fail immediately
//! - backoff: initial delay, doubling, capped at `max_delay`
//!
//! [`Retrying`] applies it once as a decorator around any collaborator, so
//! no client has its own retry loop.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::CollaboratorError;
use crate::models::{DiffResult, FieldRecord};
use crate::traits::{
    Classification, DocumentClassifier, FieldExtractor, FieldSchema, OcrOutput, OcrService,
    VersionDiffer,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Applied to each attempt separately.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Run `op` until it succeeds, fails terminally, or attempts run out.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Timeout(policy.timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                warn!(
                    call = %label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = next_delay(delay, policy.max_delay);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Double `delay`, never past `max`.
pub fn next_delay(delay: Duration, max: Duration) -> Duration {
    delay.saturating_mul(2).min(max)
}

/// Decorator adding [`with_retry`] to every method of a collaborator.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retrying<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: OcrService> OcrService for Retrying<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn analyze(&self, filename: &str, bytes: &[u8]) -> Result<OcrOutput, CollaboratorError> {
        let label = format!("ocr:{}", filename);
        with_retry(&self.policy, &label, move || self.inner.analyze(filename, bytes)).await
    }
}

#[async_trait]
impl<S: DocumentClassifier> DocumentClassifier for Retrying<S> {
    async fn classify(&self, text: &str) -> Result<Classification, CollaboratorError> {
        with_retry(&self.policy, "classify", move || self.inner.classify(text)).await
    }
}

#[async_trait]
impl<S: FieldExtractor> FieldExtractor for Retrying<S> {
    async fn extract(
        &self,
        text: &str,
        schema: &FieldSchema,
    ) -> Result<FieldRecord, CollaboratorError> {
        let label = format!("extract:{}", schema.name);
        with_retry(&self.policy, &label, move || self.inner.extract(text, schema)).await
    }
}

#[async_trait]
impl<S: VersionDiffer> VersionDiffer for Retrying<S> {
    async fn diff(&self, before: &str, after: &str) -> Result<DiffResult, CollaboratorError> {
        with_retry(&self.policy, "diff", move || self.inner.diff(before, after)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        let mut delay = policy.initial_delay;
        let mut schedule = vec![delay];
        for _ in 0..5 {
            delay = next_delay(delay, policy.max_delay);
            schedule.push(delay);
        }
        let secs: Vec<u64> = schedule.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 10, 10]);
        assert_eq!(
            next_delay(Duration::MAX, policy.max_delay),
            policy.max_delay
        );
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast_policy(4), "test", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(CollaboratorError::RateLimited("slow down".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_error_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_policy(4), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CollaboratorError::Rejected {
                status: 400,
                body: "bad request".into(),
            })
        })
        .await;
        assert!(matches!(result, Err(CollaboratorError::Rejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&fast_policy(3), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CollaboratorError::Unavailable("503".into()))
        })
        .await;
        assert!(matches!(result, Err(CollaboratorError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn sleeps_follow_backoff_schedule() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let started = std::time::Instant::now();
        let result: Result<(), _> = with_retry(&fast_policy(5), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CollaboratorError::RateLimited("429".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        // 1ms + 2ms + 4ms + 4ms between the five attempts.
        assert!(started.elapsed() >= Duration::from_millis(11));
    }

    #[tokio::test]
    async fn slow_attempts_time_out_and_retry() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy {
            timeout: Duration::from_millis(20),
            ..fast_policy(2)
        };
        let result: Result<(), _> = with_retry(&policy, "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(CollaboratorError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
