use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::AppError;
use crate::http::{HttpRequest, HttpResponse};
use crate::models::{
    HealthCheckResult, Product, Promotion, ScraperStatus, SearchCriteria, SearchResult,
};
use crate::scraper::ScraperCore;

/// Sends one physical HTTP request.
///
/// Implementations return every status code as a response and only fail on
/// transport problems (connection, timeout, cancellation).
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, AppError>;
}

/// The capability set every supermarket integration implements.
///
/// `search`, `get_product` and `get_products_by_category` are target
/// specific. Everything else has a shared default built on [`ScraperCore`].
#[async_trait]
pub trait Scraper: Send + Sync {
    /// The composed helper holding config, rate limiter, retry controller and status.
    fn core(&self) -> &ScraperCore;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn status(&self) -> ScraperStatus {
        self.core().status()
    }

    /// Search the target's catalog.
    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, AppError>;

    /// Fetch one product by its target-specific id. `None` means the target
    /// has no such product.
    async fn get_product(&self, id: &str) -> Result<Option<Product>, AppError>;

    async fn get_products_by_category(
        &self,
        category: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Product>, AppError>;

    /// Check availability for each id with one independent `get_product` call.
    ///
    /// An id whose lookup fails maps to `false`; the remaining ids are still checked.
    async fn check_stock(&self, ids: &[String]) -> Result<HashMap<String, bool>, AppError> {
        let lookups = ids.iter().map(|id| async move {
            let in_stock = match self.get_product(id).await {
                Ok(product) => product.is_some(),
                Err(e) => {
                    tracing::debug!(scraper = %self.name(), %id, error = %e, "Stock lookup failed");
                    false
                }
            };
            (id.clone(), in_stock)
        });
        Ok(join_all(lookups).await.into_iter().collect())
    }

    async fn get_promotions(&self) -> Result<Vec<Promotion>, AppError> {
        Ok(Vec::new())
    }

    /// Probe the target. Never mutates the scraper's status.
    async fn health_check(&self) -> Result<HealthCheckResult, AppError> {
        Ok(self.core().health_check().await)
    }

    /// Walk result pages while the target reports more, up to `max_pages`,
    /// pausing the configured batch delay between pages. The walk also stops
    /// at the last representable page number.
    async fn search_all(
        &self,
        criteria: &SearchCriteria,
        max_pages: u32,
    ) -> Result<SearchResult, AppError> {
        let first_page = criteria.page.unwrap_or(1);
        let mut combined = SearchResult::default();

        for offset in 0..max_pages.max(1) {
            let Some(page) = first_page.checked_add(offset) else {
                break;
            };
            if offset > 0 {
                tokio::time::sleep(self.core().config().rate_limit.batch_delay()).await;
            }
            let page_criteria = SearchCriteria {
                page: Some(page),
                ..criteria.clone()
            };
            let page = self.search(&page_criteria).await?;
            combined.total = page.total.or(combined.total);
            combined.has_more = page.has_more;
            combined.products.extend(page.products);
            if !page.has_more {
                break;
            }
        }

        Ok(combined)
    }
}
