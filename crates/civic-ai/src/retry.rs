//! Timeout and retry with exponential backoff around any [`AnalysisClient`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use civic_core::FeedbackKind;
use tracing::{info, warn};

use crate::client::{
    AnalysisClient, DocumentAnalysis, DocumentParams, FeedbackAnalysis, ServiceError,
};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    ///
    /// Each attempt is bounded by `attempt_timeout`. A retryable failure on
    /// the last attempt is wrapped in [`ServiceError::Exhausted`].
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let attempts = self.max_retries + 1;
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(ServiceError::Timeout(self.attempt_timeout)),
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 0 {
                        info!(operation = what, attempt = attempt + 1, "analysis recovered after retries");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            attempt += 1;
            if attempt >= attempts {
                return Err(ServiceError::Exhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let delay = match &err {
                ServiceError::RateLimited {
                    retry_after: Some(after),
                } => (*after).min(self.max_backoff),
                _ => self.backoff_delay(attempt - 1),
            };
            warn!(
                operation = what,
                attempt,
                max_attempts = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "analysis call failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Wraps a client so every call gets the policy's timeout and retries.
pub struct Resilient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: AnalysisClient> Resilient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: AnalysisClient> AnalysisClient for Resilient<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn analyze_document(
        &self,
        text: &str,
        params: &DocumentParams,
    ) -> Result<DocumentAnalysis, ServiceError> {
        self.policy
            .run("analyze_document", || self.inner.analyze_document(text, params))
            .await
    }

    async fn analyze_feedback(
        &self,
        text: &str,
        kind: Option<FeedbackKind>,
    ) -> Result<FeedbackAnalysis, ServiceError> {
        self.policy
            .run("analyze_feedback", || self.inner.analyze_feedback(text, kind))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::StubClient;
    use civic_core::SentimentLabel;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(350));
        assert_eq!(policy.backoff_delay(40), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let stub = StubClient::new()
            .with_feedback("Very helpful", FeedbackAnalysis::new(SentimentLabel::Positive))
            .fail_next(ServiceError::Http("connection reset".into()))
            .fail_next(ServiceError::Server {
                status: 502,
                body: "bad gateway".into(),
            });
        let client = Resilient::new(stub, fast_policy(2));

        let analysis = client.analyze_feedback("Very helpful", None).await.unwrap();
        assert_eq!(analysis.sentiment, SentimentLabel::Positive);
        assert_eq!(client.inner().calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_when_retries_exhausted() {
        let stub = StubClient::new()
            .fail_next(ServiceError::RateLimited { retry_after: None })
            .fail_next(ServiceError::RateLimited {
                retry_after: Some(Duration::from_millis(1)),
            });
        let client = Resilient::new(stub, fast_policy(1));

        let err = client.analyze_feedback("text", None).await.unwrap_err();
        match err {
            ServiceError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, ServiceError::RateLimited { .. }));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(client.inner().calls(), 2);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let stub = StubClient::new().fail_next(ServiceError::Auth("invalid key".into()));
        let client = Resilient::new(stub, fast_policy(3));

        let err = client.analyze_feedback("text", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Auth(_)));
        assert_eq!(client.inner().calls(), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let stub = StubClient::new().with_delay(Duration::from_millis(500));
        let mut policy = fast_policy(1);
        policy.attempt_timeout = Duration::from_millis(20);
        let client = Resilient::new(stub, policy);

        let err = client
            .analyze_document("Section 1.", &DocumentParams::default())
            .await
            .unwrap_err();
        match err {
            ServiceError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, ServiceError::Timeout(_)));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
