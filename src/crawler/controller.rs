use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cli::config::{AppConfig, ScraperConfig};
use crate::crawler::fetcher::{Fetcher, HttpFetcher};
use crate::crawler::limiter::DomainLimiter;
use crate::crawler::scheduler::CrawlTarget;
use crate::crawler::session::CrawlSession;
use crate::crawler::task::{Page, ScrapeError, SearchQuery, SessionOutcome};
use crate::storage::QueryStore;
use crate::utils::{RunMetrics, RunSummary};

/// Drives one scraping run: due queries in, stored pages out
pub struct CrawlerController {
    config: ScraperConfig,
    target: CrawlTarget,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn QueryStore>,
}

impl CrawlerController {
    /// Create a controller fetching over HTTP with the configured limits
    pub fn new(config: &AppConfig, store: Arc<dyn QueryStore>) -> Result<Self> {
        let limiter = Arc::new(DomainLimiter::new(
            config.scraper.parallel_requests,
            config.scraper.rate_limit,
        ));
        let fetcher = HttpFetcher::new(&config.fetch, limiter).context("Failed to build HTTP client")?;

        Self::with_fetcher(config, Arc::new(fetcher), store)
    }

    pub fn with_fetcher(
        config: &AppConfig,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn QueryStore>,
    ) -> Result<Self> {
        let target = CrawlTarget::from_settings(&config.fetch)
            .context(format!("Invalid base URL: {}", config.fetch.base_url))?;

        Ok(Self {
            config: config.scraper.clone(),
            target,
            fetcher,
            store,
        })
    }

    /// Scrape every due query once. Only a failure to read the due set is
    /// returned as an error; per-query failures end up in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("run", run_id = %run_id);

        self.run_batch(run_id).instrument(span).await
    }

    async fn run_batch(&self, run_id: String) -> Result<RunSummary> {
        info!("Starting scraping run");
        let mut metrics = RunMetrics::new();

        let queries = self
            .store
            .fetch_due_queries(Utc::now())
            .await
            .context("Failed to fetch queries to scrape")?;
        info!("Found {} queries to process", queries.len());

        for query in &queries {
            metrics.record_processed();
            self.process_due_query(query, &mut metrics).await;
        }

        let summary = metrics.finalize(run_id);
        summary.log();
        Ok(summary)
    }

    async fn process_due_query(&self, query: &SearchQuery, metrics: &mut RunMetrics) {
        let span = info_span!("query", id = query.id, occurrences = query.occurrences);

        match self.process_query(&query.text).instrument(span).await {
            Ok(_) => metrics.record_success(),
            Err(e @ ScrapeError::InvalidQuery { .. }) => {
                warn!(id = query.id, "Skipping query: {}", e);
                metrics.record_skipped();
            }
            Err(e) => {
                warn!(id = query.id, "Failed to scrape query: {}", e);
                metrics.record_failure();
            }
        }
    }

    /// Crawl for `text` and store the accepted page, marking the query scraped
    pub async fn process_query(&self, text: &str) -> Result<Page, ScrapeError> {
        info!("Processing query: {}", text);

        let mut session = CrawlSession::new(text, &self.config, &self.target, self.fetcher.as_ref())?;
        debug!(term = session.normalized_term(), "Crawling {} candidates", session.candidates().len());

        let outcome = session.run().await;
        debug!(
            redirects = session.redirect_count(),
            found = session.found_valid_page(),
            "Session finished"
        );

        match outcome {
            SessionOutcome::Accepted(page) => {
                let marked = self
                    .store
                    .store_page_and_mark_scraped(&page, text)
                    .await
                    .map_err(|error| ScrapeError::Store {
                        query: text.to_string(),
                        error,
                    })?;

                info!(marked, "Stored page {} for query: {}", page.url, text);
                Ok(page)
            }
            SessionOutcome::Exhausted => Err(ScrapeError::NoValidContent(text.to_string())),
            SessionOutcome::TimedOut => Err(ScrapeError::TimedOut {
                query: text.to_string(),
                after: self.config.timeout,
            }),
        }
    }
}
