//! `ReliableProvider` — retry + circuit-breaker wrapper around any
//! [`LlmProvider`].
//!
//! Only transient failures (HTTP 429/5xx, network errors, timeouts) are
//! retried; permanent errors propagate immediately. After
//! `failure_threshold` consecutive transport failures the breaker opens and
//! requests fail fast until `cooldown` has elapsed, at which point a single
//! trial request is allowed through.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use std::sync::Arc;

use crate::ai::provider::{LlmProvider, Result, StreamResponse};
use crate::ai::types::{CompletionRequest, CompletionResponse};
use crate::error::is_transient;

pub struct ReliableProvider {
    inner: Arc<dyn LlmProvider>,
    max_retries: u32,
    base_delay: Duration,
    failure_threshold: u32,
    cooldown: Duration,
    consecutive_failures: AtomicU32,
    open_until: Mutex<Option<Instant>>,
}

impl ReliableProvider {
    pub fn new(inner: Arc<dyn LlmProvider>) -> Self {
        Self {
            inner,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
            consecutive_failures: AtomicU32::new(0),
            open_until: Mutex::new(None),
        }
    }

    /// Set the retry configuration.
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    /// Set the circuit-breaker configuration.
    pub fn with_breaker(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.failure_threshold = failure_threshold;
        self.cooldown = cooldown;
        self
    }

    /// Fails fast when the breaker is open and the cooldown has not elapsed.
    /// When the cooldown has passed the breaker half-opens: the gate clears
    /// and the next request goes through as a trial.
    fn check_breaker(&self) -> Result<()> {
        let mut open_until = self.open_until.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(until) = *open_until {
            if Instant::now() < until {
                return Err("circuit breaker open: provider unavailable".to_string());
            }
            *open_until = None;
        }
        Ok(())
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.failure_threshold {
            let mut open_until = self.open_until.lock().unwrap_or_else(|e| e.into_inner());
            *open_until = Some(Instant::now() + self.cooldown);
            log::warn!(
                "circuit breaker opened after {failures} consecutive failures ({}s cooldown)",
                self.cooldown.as_secs()
            );
        }
    }
}

#[async_trait]
impl LlmProvider for ReliableProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.check_breaker()?;

        let mut last_err = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            }
            match self.inner.complete(request.clone()).await {
                Ok(resp) => {
                    self.record_success();
                    return Ok(resp);
                }
                Err(e) => {
                    let transient = is_transient(&e);
                    self.record_failure();
                    last_err = e;
                    if !transient {
                        break;
                    }
                }
            }
        }

        Err(last_err)
    }

    async fn stream(&self, request: CompletionRequest) -> Result<StreamResponse> {
        self.check_breaker()?;
        match self.inner.stream(request).await {
            Ok(stream) => {
                self.record_success();
                Ok(stream)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    fn context_window(&self) -> usize {
        self.inner.context_window()
    }

    fn supports_tools(&self) -> bool {
        self.inner.supports_tools()
    }

    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct FlakyProvider {
        fail_times: u32,
        error: &'static str,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl LlmProvider for FlakyProvider {
        async fn complete(&self, _: CompletionRequest) -> Result<CompletionResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(self.error.to_string())
            } else {
                Ok(CompletionResponse::text("ok"))
            }
        }
        fn context_window(&self) -> usize {
            4096
        }
        fn supports_tools(&self) -> bool {
            true
        }
        fn provider_name(&self) -> &str {
            "flaky"
        }
    }

    fn flaky(fail_times: u32, error: &'static str) -> (Arc<FlakyProvider>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Arc::new(FlakyProvider {
                fail_times,
                error,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[tokio::test]
    async fn retries_transient_errors() {
        let (inner, calls) = flaky(2, "HTTP 503 Service Unavailable");
        let provider = ReliableProvider::new(inner)
            .with_retries(3, Duration::from_millis(1));

        let resp = provider
            .complete(CompletionRequest::new("m", vec![]))
            .await
            .unwrap();
        assert_eq!(resp.content, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_not_retried() {
        let (inner, calls) = flaky(10, "HTTP 401 Unauthorized");
        let provider = ReliableProvider::new(inner)
            .with_retries(3, Duration::from_millis(1));

        let err = provider
            .complete(CompletionRequest::new("m", vec![]))
            .await
            .unwrap_err();
        assert!(err.contains("401"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold() {
        let (inner, _) = flaky(100, "connection refused");
        let provider = ReliableProvider::new(inner)
            .with_retries(0, Duration::from_millis(1))
            .with_breaker(2, Duration::from_secs(60));

        let _ = provider.complete(CompletionRequest::new("m", vec![])).await;
        let _ = provider.complete(CompletionRequest::new("m", vec![])).await;

        let err = provider
            .complete(CompletionRequest::new("m", vec![]))
            .await
            .unwrap_err();
        assert!(err.contains("circuit breaker open"));
    }
}
