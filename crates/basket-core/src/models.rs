use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational status of a scraper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScraperStatus {
    Active,
    Degraded,
    Maintenance,
    Broken,
    Development,
}

impl ScraperStatus {
    pub const ALL: [ScraperStatus; 5] = [
        ScraperStatus::Active,
        ScraperStatus::Degraded,
        ScraperStatus::Maintenance,
        ScraperStatus::Broken,
        ScraperStatus::Development,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScraperStatus::Active => "active",
            ScraperStatus::Degraded => "degraded",
            ScraperStatus::Maintenance => "maintenance",
            ScraperStatus::Broken => "broken",
            ScraperStatus::Development => "development",
        }
    }
}

impl fmt::Display for ScraperStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ScraperStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ScraperStatus::Active),
            "degraded" => Ok(ScraperStatus::Degraded),
            "maintenance" => Ok(ScraperStatus::Maintenance),
            "broken" => Ok(ScraperStatus::Broken),
            "development" => Ok(ScraperStatus::Development),
            _ => Err(format!("Unknown scraper status: {}", s)),
        }
    }
}

/// Outcome of one health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub status: ScraperStatus,
    pub response_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    pub checked_at: DateTime<Utc>,
}

impl HealthCheckResult {
    pub fn healthy(response_time_ms: u64) -> Self {
        Self {
            healthy: true,
            status: ScraperStatus::Active,
            response_time_ms,
            errors: None,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(
        status: ScraperStatus,
        response_time_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            healthy: false,
            status,
            response_time_ms,
            errors: Some(vec![error.into()]),
            checked_at: Utc::now(),
        }
    }
}

/// A product record as returned by a target. Beyond its id the payload is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// A promotion advertised by a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Free-form search criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub query: String,
    pub category: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<usize>,
}

impl SearchCriteria {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub products: Vec<Product>,
    pub total: Option<usize>,
    /// `false` when `products` is exhaustive for the criteria.
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in ScraperStatus::ALL {
            let parsed: ScraperStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("retired".parse::<ScraperStatus>().is_err());
    }

    #[test]
    fn test_health_result_serializes_camel_case() {
        let result = HealthCheckResult::unhealthy(ScraperStatus::Degraded, 12, "HTTP 503");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["healthy"], false);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["responseTimeMs"], 12);
        assert_eq!(json["errors"][0], "HTTP 503");
        assert!(json.get("checkedAt").is_some());

        let json = serde_json::to_value(HealthCheckResult::healthy(3)).unwrap();
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn test_product_keeps_opaque_attributes() {
        let product: Product =
            serde_json::from_str(r#"{"id":"42","name":"Milk","price":1.29}"#).unwrap();
        assert_eq!(product.id, "42");
        assert_eq!(product.attributes["name"], "Milk");
        assert_eq!(product.attributes.len(), 2);
    }
}
