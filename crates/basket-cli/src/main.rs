use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use basket_client::{FleetConfig, ReqwestClient};
use basket_core::error::AppError;
use basket_core::models::{HealthCheckResult, SearchCriteria};
use basket_core::registry::{RegistryStatus, ScraperRegistry};
use basket_core::traits::Scraper;

#[derive(Parser)]
#[command(name = "basket", version, about = "Rate-limited supermarket catalog scrapers")]
struct Cli {
    /// Fleet file listing the scrapers to register
    #[arg(short, long, global = true, env = "BASKET_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every scraper and print the results
    Health {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show scraper counts per status
    Status,

    /// List registered scrapers
    List {
        /// Only scrapers for this chain
        #[arg(long)]
        chain: Option<String>,
    },

    /// Fetch one product
    Product {
        #[arg(short, long)]
        scraper: String,

        #[arg(long)]
        id: String,
    },

    /// Search a scraper's catalog
    Search {
        #[arg(short, long)]
        scraper: String,

        #[arg(short, long)]
        query: String,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        page: Option<u32>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check availability for one or more product ids
    Stock {
        #[arg(short, long)]
        scraper: String,

        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List current promotions
    Promotions {
        #[arg(short, long)]
        scraper: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("basket=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = load_registry(cli.config)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Health { format } => {
            let results = registry.health_check_all().await;
            write_health(&mut out, &results, &registry.get_status(), format)?;
        }
        Commands::Status => {
            writeln!(out, "{}", serde_json::to_string_pretty(&registry.get_status())?)?;
        }
        Commands::List { chain } => cmd_list(&mut out, registry, chain.as_deref())?,
        Commands::Product { scraper, id } => {
            let product = lookup(registry, &scraper)?
                .get_product(&id)
                .await
                .with_context(|| format!("Product lookup failed on {scraper}"))?;
            match product {
                Some(product) => writeln!(out, "{}", serde_json::to_string_pretty(&product)?)?,
                None => writeln!(out, "No product {id} on {scraper}")?,
            }
        }
        Commands::Search {
            scraper,
            query,
            category,
            page,
            limit,
        } => {
            let criteria = SearchCriteria {
                query,
                category,
                page,
                limit,
            };
            let result = lookup(registry, &scraper)?
                .search(&criteria)
                .await
                .with_context(|| format!("Search failed on {scraper}"))?;
            writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
        }
        Commands::Stock { scraper, ids } => {
            let stock = lookup(registry, &scraper)?
                .check_stock(&ids)
                .await
                .with_context(|| format!("Stock check failed on {scraper}"))?;
            let sorted: BTreeMap<_, _> = stock.into_iter().collect();
            writeln!(out, "{}", serde_json::to_string_pretty(&sorted)?)?;
        }
        Commands::Promotions { scraper } => {
            let promotions = lookup(registry, &scraper)?
                .get_promotions()
                .await
                .with_context(|| format!("Promotion lookup failed on {scraper}"))?;
            writeln!(out, "{}", serde_json::to_string_pretty(&promotions)?)?;
        }
    }

    Ok(())
}

/// Register the fleet into the process-wide registry.
fn load_registry(config: Option<PathBuf>) -> Result<&'static ScraperRegistry> {
    let path = config.context("No fleet file. Pass --config or set BASKET_CONFIG.")?;
    let fleet = FleetConfig::from_path(&path)
        .with_context(|| format!("Failed to load fleet file: {}", path.display()))?;

    let client = ReqwestClient::new().context("Failed to create HTTP client")?;
    let registry = ScraperRegistry::global();
    let count = fleet
        .register_into(registry, Arc::new(client))
        .context("Failed to register scrapers")?;

    tracing::info!(scrapers = count, path = %path.display(), "Fleet loaded");
    Ok(registry)
}

fn lookup(registry: &ScraperRegistry, id: &str) -> Result<Arc<dyn Scraper>> {
    registry
        .get(id)
        .ok_or_else(|| AppError::ScraperNotFound(id.to_string()).into())
}

fn cmd_list(out: &mut impl Write, registry: &ScraperRegistry, chain: Option<&str>) -> Result<()> {
    let entries: Vec<_> = registry
        .ids()
        .into_iter()
        .filter_map(|id| registry.get_entry(&id).map(|entry| (id, entry)))
        .filter(|(_, entry)| chain.is_none_or(|c| entry.chain == c))
        .collect();

    if entries.is_empty() {
        writeln!(out, "No scrapers registered")?;
        return Ok(());
    }

    for (id, entry) in &entries {
        writeln!(
            out,
            "  {:<24} {:<16} {:<12} registered {}",
            id,
            entry.chain,
            entry.scraper.status(),
            entry.registered_at.format("%Y-%m-%d %H:%M:%S UTC"),
        )?;
    }
    writeln!(out, "\nTotal: {} scrapers", entries.len())?;
    Ok(())
}

fn write_health(
    out: &mut impl Write,
    results: &HashMap<String, HealthCheckResult>,
    summary: &RegistryStatus,
    format: OutputFormat,
) -> Result<()> {
    let sorted: BTreeMap<&String, &HealthCheckResult> = results.iter().collect();

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({ "results": sorted, "summary": summary });
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(out);
            writer.write_record([
                "id",
                "healthy",
                "status",
                "response_time_ms",
                "checked_at",
                "errors",
            ])?;
            for (id, result) in &sorted {
                writer.write_record([
                    id.to_string(),
                    result.healthy.to_string(),
                    result.status.to_string(),
                    result.response_time_ms.to_string(),
                    result.checked_at.to_rfc3339(),
                    result.errors.as_deref().unwrap_or_default().join("; "),
                ])?;
            }
            writer.flush()?;
        }
        OutputFormat::Table => {
            for (id, result) in &sorted {
                let mark = if result.healthy { "OK  " } else { "FAIL" };
                write!(
                    out,
                    "  [{mark}] {:<24} {:<12} {:>6} ms",
                    id, result.status, result.response_time_ms
                )?;
                if let Some(errors) = &result.errors {
                    write!(out, "  {}", errors.join("; "))?;
                }
                writeln!(out)?;
            }
            writeln!(
                out,
                "\nTotal: {} (active {}, degraded {}, maintenance {}, broken {}, development {})",
                summary.total,
                summary.active,
                summary.degraded,
                summary.maintenance,
                summary.broken,
                summary.development,
            )?;
        }
    }
    Ok(())
}
