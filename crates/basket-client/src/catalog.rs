//! Scraper for retail targets that expose a JSON catalog API.
//!
//! Endpoint paths are templates resolved against the scraper's base URL:
//! `{id}` and `{category}` are replaced with percent-encoded values, and
//! search parameters are appended as a query string.

use std::sync::Arc;

use async_trait::async_trait;
use basket_core::config::ScraperConfig;
use basket_core::error::AppError;
use basket_core::models::{
    HealthCheckResult, Product, Promotion, SearchCriteria, SearchResult,
};
use basket_core::scraper::ScraperCore;
use basket_core::traits::{HttpClient, Scraper};
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

/// Path templates for one catalog API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogEndpoints {
    pub search: String,
    pub product: String,
    pub category: String,
    pub promotions: Option<String>,
    /// Probed by health checks instead of the base URL when set.
    pub health: Option<String>,
}

impl Default for CatalogEndpoints {
    fn default() -> Self {
        Self {
            search: "api/search".to_string(),
            product: "api/products/{id}".to_string(),
            category: "api/categories/{category}".to_string(),
            promotions: None,
            health: None,
        }
    }
}

/// Search responses come either as a bare list or as a page object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProductList {
    Page {
        #[serde(alias = "items")]
        products: Vec<Product>,
        #[serde(default)]
        total: Option<usize>,
        #[serde(default, rename = "hasMore")]
        has_more: Option<bool>,
    },
    Bare(Vec<Product>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProductBody {
    Wrapped { product: Product },
    Bare(Product),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PromotionList {
    Wrapped { promotions: Vec<Promotion> },
    Bare(Vec<Promotion>),
}

pub struct CatalogApiScraper {
    core: ScraperCore,
    endpoints: CatalogEndpoints,
}

impl CatalogApiScraper {
    pub fn new(
        name: impl Into<String>,
        config: ScraperConfig,
        endpoints: CatalogEndpoints,
        client: Arc<dyn HttpClient>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            core: ScraperCore::new(name, config, client)?,
            endpoints,
        })
    }

    pub fn endpoints(&self) -> &CatalogEndpoints {
        &self.endpoints
    }

    fn search_path(&self, criteria: &SearchCriteria) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("q", &criteria.query);
        if let Some(category) = &criteria.category {
            query.append_pair("category", category);
        }
        if let Some(page) = criteria.page {
            query.append_pair("page", &page.to_string());
        }
        if let Some(limit) = criteria.limit {
            query.append_pair("limit", &limit.to_string());
        }
        format!("{}?{}", self.endpoints.search, query.finish())
    }

    fn product_path(&self, id: &str) -> String {
        self.endpoints.product.replace("{id}", &encode_segment(id))
    }

    fn category_path(&self, category: &str, limit: Option<usize>) -> String {
        let path = self
            .endpoints
            .category
            .replace("{category}", &encode_segment(category));
        match limit {
            Some(limit) => format!("{path}?limit={limit}"),
            None => path,
        }
    }
}

/// Whether more results follow, for targets that report `total` but not `hasMore`.
///
/// An empty page ends the walk. Otherwise the offset needs a known page size:
/// the requested `limit`, or the first page's own length.
fn infer_has_more(criteria: &SearchCriteria, returned: usize, total: Option<usize>) -> bool {
    let Some(total) = total else {
        return false;
    };
    if returned == 0 {
        return false;
    }
    let page = criteria.page.unwrap_or(1).max(1) as usize;
    let page_size = match criteria.limit {
        Some(limit) => limit,
        None if page == 1 => returned,
        None => return false,
    };
    (page - 1)
        .saturating_mul(page_size)
        .saturating_add(returned)
        < total
}

/// Percent-encode one path segment.
fn encode_segment(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

#[async_trait]
impl Scraper for CatalogApiScraper {
    fn core(&self) -> &ScraperCore {
        &self.core
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, AppError> {
        let body: ProductList = self.core.get_json(&self.search_path(criteria)).await?;

        Ok(match body {
            ProductList::Page {
                products,
                total,
                has_more,
            } => {
                let has_more = has_more
                    .unwrap_or_else(|| infer_has_more(criteria, products.len(), total));
                SearchResult {
                    products,
                    total,
                    has_more,
                }
            }
            ProductList::Bare(products) => SearchResult {
                total: Some(products.len()),
                products,
                has_more: false,
            },
        })
    }

    async fn get_product(&self, id: &str) -> Result<Option<Product>, AppError> {
        let path = self.product_path(id);
        let response = self.core.get(&path).await?;

        match response.status {
            404 => {
                tracing::debug!(scraper = %self.core.name(), %id, "Product not found");
                Ok(None)
            }
            200..=299 => {
                let body: ProductBody = self.core.decode(&response)?;
                Ok(Some(match body {
                    ProductBody::Wrapped { product } => product,
                    ProductBody::Bare(product) => product,
                }))
            }
            status => {
                let error = AppError::HttpStatus {
                    status,
                    url: self.core.config().url_for(&path)?.to_string(),
                };
                self.core.record_error(&error);
                Err(error)
            }
        }
    }

    async fn get_products_by_category(
        &self,
        category: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Product>, AppError> {
        let body: ProductList = self
            .core
            .get_json(&self.category_path(category, limit))
            .await?;

        let mut products = match body {
            ProductList::Page { products, .. } | ProductList::Bare(products) => products,
        };
        if let Some(limit) = limit {
            products.truncate(limit);
        }
        Ok(products)
    }

    async fn get_promotions(&self) -> Result<Vec<Promotion>, AppError> {
        let Some(path) = &self.endpoints.promotions else {
            return Ok(Vec::new());
        };
        let body: PromotionList = self.core.get_json(path).await?;
        Ok(match body {
            PromotionList::Wrapped { promotions } | PromotionList::Bare(promotions) => promotions,
        })
    }

    async fn health_check(&self) -> Result<HealthCheckResult, AppError> {
        match &self.endpoints.health {
            Some(path) => {
                let url = self.core.config().url_for(path)?;
                Ok(self.core.health_check_at(url.as_str()).await)
            }
            None => Ok(self.core.health_check().await),
        }
    }
}
