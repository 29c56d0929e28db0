pub mod memory;
pub mod postgres;
pub mod retry;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::crawler::task::{Page, SearchQuery};

// Re-export common types
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use retry::RetryPolicy;

/// How long a scraped query stays fresh
pub const RESCRAPE_AFTER_HOURS: i64 = 48;

/// Most queries handed out per run
pub const DUE_BATCH_LIMIT: i64 = 20;

/// Source of due queries and sink for scraped pages
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Queries never scraped or last scraped before the freshness window,
    /// most frequent first, at most [`DUE_BATCH_LIMIT`]
    async fn fetch_due_queries(&self, now: DateTime<Utc>) -> Result<Vec<SearchQuery>>;

    /// Upsert `page` by URL and mark every log row whose query text matches
    /// `query` (trimmed, case-insensitive) as scraped, atomically. Returns the
    /// number of rows marked.
    async fn store_page_and_mark_scraped(&self, page: &Page, query: &str) -> Result<u64>;
}

/// Oldest scrape time that still counts as fresh at `now`
pub fn due_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(RESCRAPE_AFTER_HOURS)
}

/// Whether a query last scraped at `last_scraped_at` should be scraped again
pub fn is_due(last_scraped_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_scraped_at {
        None => true,
        Some(at) => at < due_cutoff(now),
    }
}

/// Key used to match log rows against an originating query
pub fn query_key(text: &str) -> String {
    text.to_lowercase().trim().to_string()
}
