//! Fleet files: the set of scrapers one process registers.
//!
//! ```json
//! {
//!   "scrapers": [
//!     {
//!       "id": "tesco-uk",
//!       "chain": "tesco",
//!       "config": { "baseUrl": "https://tesco.example/", "rateLimit": { "requestsPerSecond": 2 } },
//!       "endpoints": { "product": "api/v2/products/{id}" }
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use basket_core::config::ScraperConfig;
use basket_core::error::AppError;
use basket_core::models::ScraperStatus;
use basket_core::registry::ScraperRegistry;
use basket_core::traits::{HttpClient, Scraper};
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogApiScraper, CatalogEndpoints};

/// Environment variable naming the fleet file.
pub const FLEET_CONFIG_ENV: &str = "BASKET_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FleetEntry {
    pub id: String,
    pub chain: String,
    pub config: ScraperConfig,
    #[serde(default)]
    pub endpoints: CatalogEndpoints,
    /// Initial status; defaults to `active`.
    #[serde(default)]
    pub status: Option<ScraperStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    pub scrapers: Vec<FleetEntry>,
}

impl FleetConfig {
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read fleet file {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw)
            .map_err(|e| AppError::ConfigError(format!("Invalid fleet file: {e}")))
    }

    /// Read the fleet file named by `BASKET_CONFIG`.
    pub fn from_env() -> Result<Self, AppError> {
        let path = std::env::var(FLEET_CONFIG_ENV).map_err(|_| {
            AppError::ConfigError(format!("{FLEET_CONFIG_ENV} not set. Required to load scrapers."))
        })?;
        Self::from_path(Path::new(&path))
    }

    /// Build every scraper, then register them all.
    ///
    /// Nothing is registered unless every entry builds and no id collides,
    /// either within the fleet or with scrapers already in `registry`.
    pub fn register_into(
        &self,
        registry: &ScraperRegistry,
        client: Arc<dyn HttpClient>,
    ) -> Result<usize, AppError> {
        let mut seen = HashSet::new();
        for entry in &self.scrapers {
            if !seen.insert(entry.id.as_str()) || registry.get(&entry.id).is_some() {
                return Err(AppError::DuplicateScraper(entry.id.clone()));
            }
        }

        let built = self
            .scrapers
            .iter()
            .map(|entry| {
                let scraper = CatalogApiScraper::new(
                    entry.id.clone(),
                    entry.config.clone(),
                    entry.endpoints.clone(),
                    Arc::clone(&client),
                )
                .map_err(|e| AppError::ConfigError(format!("Scraper '{}': {e}", entry.id)))?;
                if let Some(status) = entry.status {
                    scraper.core().set_status(status);
                }
                Ok((entry, scraper))
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        tracing::debug!(scrapers = built.len(), "Fleet entries validated");
        for (entry, scraper) in built {
            registry.register(entry.id.clone(), Arc::new(scraper), entry.chain.clone())?;
        }
        Ok(self.scrapers.len())
    }

    pub fn build_registry(&self, client: Arc<dyn HttpClient>) -> Result<ScraperRegistry, AppError> {
        let registry = ScraperRegistry::new();
        self.register_into(&registry, client)?;
        Ok(registry)
    }
}
