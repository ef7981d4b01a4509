//! Bounded retry with exponential backoff and per-attempt timeouts.
//!
//! A logical request makes at most `maxRetries + 1` physical attempts. Each
//! attempt gets its own timeout and its own [`CancellationToken`]; a timed
//! out attempt is cancelled and counted as a retryable failure without
//! affecting the outer loop.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::AppError;
use crate::http::{HttpRequest, HttpResponse};
use crate::traits::HttpClient;

#[derive(Debug, Clone)]
pub struct RetryController {
    name: String,
    policy: RetryConfig,
    timeout: Duration,
}

impl RetryController {
    pub fn new(name: impl Into<String>, policy: RetryConfig, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &RetryConfig {
        &self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the retry budget is spent.
    ///
    /// The operation receives a fresh cancellation token per attempt.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, AppError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut retries = 0u32;
        loop {
            let attempt = retries + 1;
            let error = match self.attempt(&mut operation).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(error);
            }

            if retries >= self.policy.max_retries {
                tracing::warn!(
                    scraper = %self.name,
                    attempts = attempt,
                    error = %error,
                    "Giving up after {} attempts",
                    attempt
                );
                return Err(AppError::RetryExhausted {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            let delay = self.policy.delay_for_attempt(retries);
            tracing::warn!(
                scraper = %self.name,
                attempt,
                delay_ms = %delay.as_millis(),
                error = %error,
                "Attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            retries += 1;
        }
    }

    /// Send `request` through `client` with retries.
    ///
    /// 5xx responses count as retryable failures; every other status is
    /// returned to the caller as-is.
    pub async fn send(
        &self,
        client: &dyn HttpClient,
        request: &HttpRequest,
    ) -> Result<HttpResponse, AppError> {
        self.execute(|cancel| {
            let request = request.clone().with_cancellation(cancel);
            async move {
                let url = request.url.clone();
                let response = client.send(request).await?;
                if response.is_server_error() {
                    return Err(AppError::ServerError {
                        status: response.status,
                        url,
                    });
                }
                Ok(response)
            }
        })
        .await
    }

    async fn attempt<T, F, Fut>(&self, operation: &mut F) -> Result<T, AppError>
    where
        F: FnMut(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let cancel = CancellationToken::new();
        match tokio::time::timeout(self.timeout, operation(cancel.clone())).await {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(AppError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }
}
