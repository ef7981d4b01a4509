//! Declarative per-scraper configuration.
//!
//! A [`ScraperConfig`] is supplied once when a scraper is constructed and is
//! never mutated afterwards. Durations are expressed in milliseconds so the
//! same structs can be read straight from JSON fleet files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AppError;

/// Steady-state rate and concurrency bounds for one scraper instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub requests_per_second: f64,
    pub max_concurrent: usize,
    /// Pause between consecutive pages of a multi-page walk.
    pub batch_delay_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            max_concurrent: 2,
            batch_delay_ms: 1000,
        }
    }
}

impl RateLimitConfig {
    pub fn new(requests_per_second: f64, max_concurrent: usize) -> Self {
        Self {
            requests_per_second,
            max_concurrent,
            ..Default::default()
        }
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Minimum spacing between two request starts (`1000 / requestsPerSecond` ms).
    pub fn min_interval(&self) -> Duration {
        if self.requests_per_second <= 0.0 || !self.requests_per_second.is_finite() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(1.0 / self.requests_per_second)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

/// Retry configuration with optional exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            exponential_backoff: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms: base_delay.as_millis() as u64,
            ..Default::default()
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = max_delay.as_millis() as u64;
        self
    }

    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    /// Delay to wait after the failure of retry number `attempt` (0-indexed).
    ///
    /// - exponential: `min(base * 2^attempt, max)`
    /// - constant: `base`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return Duration::from_millis(self.base_delay_ms);
        }
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Full configuration of one scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperConfig {
    pub base_url: Url,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    concat!("Basket/", env!("CARGO_PKG_VERSION")).to_string()
}

impl ScraperConfig {
    /// Create a config for `base_url` with default limits.
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base_url}': {e}")))?;
        Ok(Self {
            base_url,
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            timeout_ms: default_timeout_ms(),
            headers: BTreeMap::new(),
            user_agent: default_user_agent(),
        })
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve a path (or absolute URL) against the base URL.
    pub fn url_for(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::ConfigError(format!("Invalid path '{path}': {e}")))
    }

    /// Reject configurations the rate limiter or retry controller cannot honour.
    pub fn validate(&self) -> Result<(), AppError> {
        match self.base_url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(AppError::ConfigError(format!(
                    "URL scheme '{scheme}' is not allowed (only http/https)"
                )));
            }
        }
        let rps = self.rate_limit.requests_per_second;
        if !rps.is_finite() || rps <= 0.0 {
            return Err(AppError::ConfigError(format!(
                "requestsPerSecond must be a positive number, got {rps}"
            )));
        }
        if self.rate_limit.max_concurrent == 0 {
            return Err(AppError::ConfigError(
                "maxConcurrent must be at least 1".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(AppError::ConfigError("timeoutMs must be at least 1".into()));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(AppError::ConfigError(format!(
                "maxDelayMs ({}) is smaller than baseDelayMs ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        Ok(())
    }
}
