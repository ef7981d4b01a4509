//! Catalog of scraper instances keyed by identity.
//!
//! The registry is the only process-wide shared state. Its map sits behind a
//! `std::sync::RwLock` that is never held across an await: health sweeps take
//! a snapshot, run without the lock, then write results back.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{HealthCheckResult, ScraperStatus};
use crate::traits::Scraper;

/// One registered scraper and its bookkeeping.
#[derive(Clone)]
pub struct RegistryEntry {
    pub scraper: Arc<dyn Scraper>,
    pub chain: String,
    pub registered_at: DateTime<Utc>,
    /// Most recent health probe; overwritten by every sweep.
    pub last_health_check: Option<HealthCheckResult>,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("scraper", &self.scraper.name())
            .field("chain", &self.chain)
            .field("registered_at", &self.registered_at)
            .field("last_health_check", &self.last_health_check)
            .finish()
    }
}

/// Aggregate status counts for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStatus {
    pub total: usize,
    pub active: usize,
    pub degraded: usize,
    pub maintenance: usize,
    pub broken: usize,
    pub development: usize,
    /// Latest `checked_at` among all cached health results.
    pub last_health_check: Option<DateTime<Utc>>,
}

impl RegistryStatus {
    pub fn count(&self, status: ScraperStatus) -> usize {
        match status {
            ScraperStatus::Active => self.active,
            ScraperStatus::Degraded => self.degraded,
            ScraperStatus::Maintenance => self.maintenance,
            ScraperStatus::Broken => self.broken,
            ScraperStatus::Development => self.development,
        }
    }

    fn increment(&mut self, status: ScraperStatus) {
        let slot = match status {
            ScraperStatus::Active => &mut self.active,
            ScraperStatus::Degraded => &mut self.degraded,
            ScraperStatus::Maintenance => &mut self.maintenance,
            ScraperStatus::Broken => &mut self.broken,
            ScraperStatus::Development => &mut self.development,
        };
        *slot += 1;
    }
}

#[derive(Debug, Default)]
pub struct ScraperRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

static GLOBAL: LazyLock<ScraperRegistry> = LazyLock::new(ScraperRegistry::new);

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static ScraperRegistry {
        &GLOBAL
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, RegistryEntry>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned registry lock");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, RegistryEntry>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned registry lock");
            poisoned.into_inner()
        })
    }

    /// Register `scraper` under `id`. Fails without side effects if `id` is taken.
    pub fn register(
        &self,
        id: impl Into<String>,
        scraper: Arc<dyn Scraper>,
        chain: impl Into<String>,
    ) -> Result<(), AppError> {
        let id = id.into();
        let mut entries = self.write();
        if entries.contains_key(&id) {
            return Err(AppError::DuplicateScraper(id));
        }
        let chain = chain.into();
        tracing::info!(scraper = %id, %chain, "Scraper registered");
        entries.insert(
            id,
            RegistryEntry {
                scraper,
                chain,
                registered_at: Utc::now(),
                last_health_check: None,
            },
        );
        Ok(())
    }

    /// Remove `id`. Returns whether anything was removed.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.write().remove(id).is_some();
        if removed {
            tracing::info!(scraper = %id, "Scraper unregistered");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Scraper>> {
        self.read().get(id).map(|entry| Arc::clone(&entry.scraper))
    }

    pub fn get_entry(&self, id: &str) -> Option<RegistryEntry> {
        self.read().get(id).cloned()
    }

    /// Snapshot of every registered scraper.
    pub fn get_all(&self) -> HashMap<String, Arc<dyn Scraper>> {
        self.read()
            .iter()
            .map(|(id, entry)| (id.clone(), Arc::clone(&entry.scraper)))
            .collect()
    }

    /// Snapshot of the scrapers whose status is currently `active`.
    pub fn get_active(&self) -> HashMap<String, Arc<dyn Scraper>> {
        self.read()
            .iter()
            .filter(|(_, entry)| entry.scraper.status() == ScraperStatus::Active)
            .map(|(id, entry)| (id.clone(), Arc::clone(&entry.scraper)))
            .collect()
    }

    pub fn get_by_chain(&self, chain: &str) -> Vec<Arc<dyn Scraper>> {
        self.read()
            .values()
            .filter(|entry| entry.chain == chain)
            .map(|entry| Arc::clone(&entry.scraper))
            .collect()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Probe every registered scraper concurrently and cache the results.
    ///
    /// Probes bypass the scrapers' rate limiters. A probe that fails outright
    /// or panics is reported as unhealthy / broken; it never aborts the sweep.
    pub async fn health_check_all(&self) -> HashMap<String, HealthCheckResult> {
        let snapshot = self.get_all();
        tracing::info!(scrapers = snapshot.len(), "Running health sweep");

        let probes = snapshot.into_iter().map(|(id, scraper)| async move {
            let outcome = AssertUnwindSafe(scraper.health_check()).catch_unwind().await;
            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    tracing::warn!(scraper = %id, error = %e, "Health check failed");
                    HealthCheckResult::unhealthy(ScraperStatus::Broken, 0, e.to_string())
                }
                Err(_) => {
                    tracing::error!(scraper = %id, "Health check panicked");
                    HealthCheckResult::unhealthy(ScraperStatus::Broken, 0, "Health check panicked")
                }
            };
            (id, scraper, result)
        });
        let checked = join_all(probes).await;

        let mut entries = self.write();
        for (id, scraper, result) in &checked {
            // Cache only on the instance that was checked; ids unregistered or
            // replaced mid-sweep are reported but not cached.
            if let Some(entry) = entries.get_mut(id)
                && Arc::ptr_eq(&entry.scraper, scraper)
            {
                entry.last_health_check = Some(result.clone());
            }
        }
        drop(entries);

        let results: HashMap<String, HealthCheckResult> = checked
            .into_iter()
            .map(|(id, _, result)| (id, result))
            .collect();

        let unhealthy = results.values().filter(|r| !r.healthy).count();
        tracing::info!(
            checked = results.len(),
            unhealthy,
            "Health sweep finished"
        );
        results
    }

    /// Per-status counts and the most recent cached health check time.
    pub fn get_status(&self) -> RegistryStatus {
        let entries = self.read();
        let mut status = RegistryStatus {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries.values() {
            status.increment(entry.scraper.status());
            if let Some(check) = &entry.last_health_check {
                status.last_health_check = status.last_health_check.max(Some(check.checked_at));
            }
        }
        status
    }
}
