//! Shared state and request plumbing embedded by every scraper.
//!
//! [`ScraperCore`] is composed into concrete scrapers rather than inherited:
//! it owns the immutable [`ScraperConfig`], the instance's private
//! [`RateLimiter`], its [`RetryController`], the [`HttpClient`] and the
//! status cell. All requests go limiter → retry controller → client.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::de::DeserializeOwned;

use crate::config::ScraperConfig;
use crate::error::AppError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::models::{HealthCheckResult, ScraperStatus};
use crate::retry::RetryController;
use crate::status::{StatusEvent, next_status};
use crate::throttle::RateLimiter;
use crate::traits::HttpClient;

#[derive(Debug)]
struct StatusCell {
    status: ScraperStatus,
    last_error: Option<String>,
}

pub struct ScraperCore {
    name: String,
    config: ScraperConfig,
    limiter: RateLimiter,
    retry: RetryController,
    client: Arc<dyn HttpClient>,
    state: Mutex<StatusCell>,
}

impl ScraperCore {
    /// Build the helper for one scraper. Fails if `config` does not validate.
    pub fn new(
        name: impl Into<String>,
        config: ScraperConfig,
        client: Arc<dyn HttpClient>,
    ) -> Result<Self, AppError> {
        config.validate()?;
        let name = name.into();
        let limiter = RateLimiter::new(name.clone(), &config.rate_limit);
        let retry = RetryController::new(name.clone(), config.retry.clone(), config.timeout());
        Ok(Self {
            name,
            config,
            limiter,
            retry,
            client,
            state: Mutex::new(StatusCell {
                status: ScraperStatus::Active,
                last_error: None,
            }),
        })
    }

    /// Start in a status other than `active`, e.g. `development`.
    pub fn with_initial_status(self, status: ScraperStatus) -> Self {
        self.lock_state().status = status;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn retry(&self) -> &RetryController {
        &self.retry
    }

    pub fn status(&self) -> ScraperStatus {
        self.lock_state().status
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    /// Operator override; the only way out of `degraded`, `broken`, etc.
    pub fn set_status(&self, status: ScraperStatus) {
        self.transition(StatusEvent::OperatorSet(status));
    }

    /// Put the scraper back to `active` and forget the last error.
    pub fn reset_status(&self) {
        self.set_status(ScraperStatus::Active);
        self.lock_state().last_error = None;
    }

    /// Record a failed operation. The first error while `active` degrades the scraper.
    pub fn record_error(&self, error: &AppError) {
        tracing::warn!(scraper = %self.name, error = %error, "Scraper operation failed");
        self.lock_state().last_error = Some(error.to_string());
        self.transition(StatusEvent::ErrorLogged);
    }

    fn record_success(&self) {
        self.transition(StatusEvent::OperationSucceeded);
    }

    fn transition(&self, event: StatusEvent) {
        let mut state = self.lock_state();
        let previous = state.status;
        state.status = next_status(previous, event);
        if state.status != previous {
            tracing::warn!(
                scraper = %self.name,
                from = %previous,
                to = %state.status,
                ?event,
                "Scraper status changed"
            );
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StatusCell> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(scraper = %self.name, "Recovered from poisoned status mutex");
            poisoned.into_inner()
        })
    }

    /// A request carrying the configured user agent and headers.
    pub fn build_request(&self, method: HttpMethod, url: &str) -> HttpRequest {
        self.config.headers.iter().fold(
            HttpRequest::new(method, url).with_header("User-Agent", &self.config.user_agent),
            |request, (name, value)| request.with_header(name, value),
        )
    }

    /// Issue a rate-limited, retried request against a path relative to the base URL.
    ///
    /// Non-5xx responses are returned whatever their status. Final failures
    /// are recorded against the scraper's status before being returned.
    pub async fn request(&self, method: HttpMethod, path: &str) -> Result<HttpResponse, AppError> {
        let url = self.config.url_for(path)?;
        let request = self.build_request(method, url.as_str());

        let result = self
            .limiter
            .submit(self.retry.send(self.client.as_ref(), &request))
            .await;

        match &result {
            Ok(response) => {
                tracing::debug!(
                    scraper = %self.name,
                    %url,
                    status = response.status,
                    bytes = response.body.len(),
                    "Request completed"
                );
                self.record_success();
            }
            Err(e) => self.record_error(e),
        }
        result
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse, AppError> {
        self.request(HttpMethod::Get, path).await
    }

    /// GET a path and decode a 2xx JSON body. Any other status is an error.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let response = self.get(path).await?;
        if !response.is_success() {
            let error = AppError::HttpStatus {
                status: response.status,
                url: self.config.url_for(path)?.to_string(),
            };
            self.record_error(&error);
            return Err(error);
        }
        self.decode(&response)
    }

    /// Decode a JSON body, recording decode failures against the scraper.
    pub fn decode<T: DeserializeOwned>(&self, response: &HttpResponse) -> Result<T, AppError> {
        response.json().inspect_err(|e| self.record_error(e))
    }

    /// Probe the base URL.
    pub async fn health_check(&self) -> HealthCheckResult {
        self.health_check_at(self.config.base_url.as_str()).await
    }

    /// One retried request to `url`, bypassing the rate limiter.
    ///
    /// - 2xx ⇒ healthy / active
    /// - any other response ⇒ unhealthy / degraded, with the status line
    /// - transport error or timeout ⇒ unhealthy / broken, with the error text
    ///
    /// The scraper's own status is left untouched.
    pub async fn health_check_at(&self, url: &str) -> HealthCheckResult {
        let request = self.build_request(HttpMethod::Get, url);
        let started = Instant::now();
        let outcome = self.retry.send(self.client.as_ref(), &request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(response) if response.is_success() => HealthCheckResult::healthy(elapsed_ms),
            Ok(response) => HealthCheckResult::unhealthy(
                ScraperStatus::Degraded,
                elapsed_ms,
                format!("HTTP {}", response.status_line()),
            ),
            Err(e) => match e.root() {
                AppError::ServerError { status, .. } => HealthCheckResult::unhealthy(
                    ScraperStatus::Degraded,
                    elapsed_ms,
                    format!("HTTP {}", HttpResponse::new(*status, "").status_line()),
                ),
                _ => HealthCheckResult::unhealthy(ScraperStatus::Broken, elapsed_ms, e.to_string()),
            },
        };

        tracing::debug!(
            scraper = %self.name,
            healthy = result.healthy,
            status = %result.status,
            response_time_ms = result.response_time_ms,
            "Health check finished"
        );
        result
    }
}

impl std::fmt::Debug for ScraperCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScraperCore")
            .field("name", &self.name)
            .field("base_url", &self.config.base_url.as_str())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
