//! Test utilities: mock HTTP client and a minimal scraper.
//!
//! Handwritten mocks for dependency injection in unit tests. State lives in
//! `Arc<Mutex<_>>` so tests can assert on recorded calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{RateLimitConfig, RetryConfig, ScraperConfig};
use crate::error::AppError;
use crate::http::{HttpRequest, HttpResponse};
use crate::models::{HealthCheckResult, Product, SearchCriteria, SearchResult};
use crate::scraper::ScraperCore;
use crate::traits::{HttpClient, Scraper};

type Handler = Arc<dyn Fn(&HttpRequest) -> Result<HttpResponse, AppError> + Send + Sync>;

// ---------------------------------------------------------------------------
// MockHttpClient
// ---------------------------------------------------------------------------

/// Mock client that answers from a queue, then from a handler.
#[derive(Clone)]
pub struct MockHttpClient {
    /// Each call pops the first element. When empty, `handler` answers.
    responses: Arc<Mutex<Vec<Result<HttpResponse, AppError>>>>,
    handler: Handler,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    delay: Duration,
}

impl MockHttpClient {
    /// Always answers 200 with `body`.
    pub fn ok(body: &str) -> Self {
        let body = body.to_string();
        Self::with_handler(move |_| Ok(HttpResponse::new(200, body.clone())))
    }

    /// Always answers with a clone of `response`.
    pub fn always(response: HttpResponse) -> Self {
        Self::with_handler(move |_| Ok(response.clone()))
    }

    /// Always fails with the error produced by `make_error`.
    pub fn always_err(make_error: impl Fn() -> AppError + Send + Sync + 'static) -> Self {
        Self::with_handler(move |_| Err(make_error()))
    }

    /// Answers queued responses in order, then 200 with an empty body.
    pub fn with_responses(responses: Vec<Result<HttpResponse, AppError>>) -> Self {
        let client = Self::ok("");
        *client.responses.lock().unwrap() = responses;
        client
    }

    /// Answers every request with `handler`.
    pub fn with_handler(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, AppError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            handler: Arc::new(handler),
            requests: Arc::new(Mutex::new(Vec::new())),
            delay: Duration::ZERO,
        }
    }

    /// Simulate latency. A cancelled request stops waiting and fails.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError> {
        self.requests.lock().unwrap().push(request.clone());

        if !self.delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(self.delay) => {}
                () = request.cancel.cancelled() => return Err(AppError::Cancelled),
            }
        }

        let queued = {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                None
            } else {
                Some(responses.remove(0))
            }
        };
        queued.unwrap_or_else(|| (self.handler)(&request))
    }
}

// ---------------------------------------------------------------------------
// StaticScraper
// ---------------------------------------------------------------------------

/// Minimal scraper over `products/{id}`, `search?q=` and `categories/{name}`.
pub struct StaticScraper {
    core: ScraperCore,
    health_error: Option<String>,
    health_panics: bool,
}

impl StaticScraper {
    pub fn new(name: &str, client: MockHttpClient) -> Self {
        Self::with_config(name, test_config(), client)
    }

    pub fn with_config(name: &str, config: ScraperConfig, client: MockHttpClient) -> Self {
        Self {
            core: ScraperCore::new(name, config, Arc::new(client)).unwrap(),
            health_error: None,
            health_panics: false,
        }
    }

    /// Make `health_check` itself fail instead of returning a result.
    pub fn with_failing_health(mut self, message: &str) -> Self {
        self.health_error = Some(message.to_string());
        self
    }

    /// Make `health_check` panic.
    pub fn with_panicking_health(mut self) -> Self {
        self.health_panics = true;
        self
    }
}

#[async_trait]
impl Scraper for StaticScraper {
    fn core(&self) -> &ScraperCore {
        &self.core
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, AppError> {
        let page = criteria.page.unwrap_or(1);
        self.core
            .get_json(&format!("search?q={}&page={page}", criteria.query))
            .await
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, AppError> {
        let response = self.core.get(&format!("products/{id}")).await?;
        match response.status {
            404 => Ok(None),
            200..=299 => self.core.decode(&response).map(Some),
            status => Err(AppError::HttpStatus {
                status,
                url: format!("products/{id}"),
            }),
        }
    }

    async fn get_products_by_category(
        &self,
        category: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Product>, AppError> {
        let mut products: Vec<Product> = self
            .core
            .get_json(&format!("categories/{category}"))
            .await?;
        if let Some(limit) = limit {
            products.truncate(limit);
        }
        Ok(products)
    }

    async fn health_check(&self) -> Result<HealthCheckResult, AppError> {
        if self.health_panics {
            panic!("health check crashed");
        }
        if let Some(message) = &self.health_error {
            return Err(AppError::Generic(message.clone()));
        }
        Ok(self.core.health_check().await)
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// Fast config pointing at `https://shop.test/`: 1000 req/s, 4 concurrent,
/// 2 retries at 1ms base delay, 1s timeout.
pub fn test_config() -> ScraperConfig {
    ScraperConfig::new("https://shop.test/")
        .unwrap()
        .with_rate_limit(
            RateLimitConfig::new(1000.0, 4).with_batch_delay(Duration::from_millis(1)),
        )
        .with_retry(
            RetryConfig::new(2, Duration::from_millis(1)).with_max_delay(Duration::from_millis(10)),
        )
        .with_timeout(Duration::from_secs(1))
}

/// Body for a product with the given id.
pub fn product_json(id: &str) -> String {
    serde_json::json!({ "id": id, "name": format!("Product {id}") }).to_string()
}
