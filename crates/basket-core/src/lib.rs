pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod registry;
pub mod retry;
pub mod scraper;
pub mod status;
pub mod throttle;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::{RateLimitConfig, RetryConfig, ScraperConfig};
pub use error::AppError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use models::{
    HealthCheckResult, Product, Promotion, ScraperStatus, SearchCriteria, SearchResult,
};
pub use registry::{RegistryEntry, RegistryStatus, ScraperRegistry};
pub use scraper::ScraperCore;
pub use traits::{HttpClient, Scraper};
