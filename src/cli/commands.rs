use anyhow::{Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cli::config::AppConfig;
use crate::crawler::controller::CrawlerController;
use crate::storage::{MemoryStore, PostgresStore};

/// Scrape due queries from PostgreSQL, or the given queries in a dry run
pub async fn run(config_path: Option<PathBuf>, dry_run: bool, queries: Vec<String>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    debug!(scraper = ?config.scraper, "Loaded configuration");

    if dry_run {
        return dry_run_queries(&config, queries).await;
    }

    let store = Arc::new(PostgresStore::connect(&config.database).await?);
    let controller = CrawlerController::new(&config, store.clone())?;

    let result = controller.run().await;
    store.close().await;
    let summary = result?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn dry_run_queries(config: &AppConfig, queries: Vec<String>) -> Result<()> {
    if queries.is_empty() {
        warn!("Dry run without --query has nothing to crawl");
    }

    let store = Arc::new(MemoryStore::with_queries(&queries));
    let controller = CrawlerController::new(config, store.clone())?;
    let summary = controller.run().await?;

    let pages: Vec<_> = store
        .pages()
        .await
        .into_iter()
        .map(|page| {
            json!({
                "title": page.title,
                "url": page.url,
                "content_chars": page.content.chars().count(),
            })
        })
        .collect();

    let scraped: Vec<_> = store
        .search_logs()
        .await
        .into_iter()
        .filter(|row| row.scraped_at.is_some())
        .map(|row| row.query)
        .collect();

    info!("Dry run stored {} pages", pages.len());
    let report = json!({ "summary": summary, "pages": pages, "scraped_queries": scraped });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Print the effective configuration with credentials masked
pub fn show_config(config_path: Option<PathBuf>) -> Result<()> {
    let config = AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    match config_path.or_else(AppConfig::default_path) {
        Some(path) if path.exists() => println!("# Loaded from {}", path.display()),
        Some(path) => println!("# No file at {}, using defaults and environment", path.display()),
        None => println!("# Using defaults and environment"),
    }

    print!("{}", serde_yaml::to_string(&config.redacted())?);
    Ok(())
}
