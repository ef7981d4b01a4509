pub mod catalog;
pub mod fetcher;
pub mod fleet;

pub use catalog::{CatalogApiScraper, CatalogEndpoints};
pub use fetcher::ReqwestClient;
pub use fleet::{FLEET_CONFIG_ENV, FleetConfig, FleetEntry};
