//! In-process query store used for dry runs and tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use super::{is_due, query_key, QueryStore, DUE_BATCH_LIMIT};
use crate::crawler::task::{Page, SearchQuery};

/// One row of the search log
#[derive(Debug, Clone, PartialEq)]
pub struct SearchLogRow {
    pub id: i64,
    pub query: String,
    pub scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    search_logs: Vec<SearchLogRow>,
    /// Keyed by URL
    pages: HashMap<String, Page>,
    next_id: i64,
}

impl Tables {
    fn insert_log(&mut self, query: &str, scraped_at: Option<DateTime<Utc>>) -> i64 {
        self.next_id += 1;
        self.search_logs.push(SearchLogRow {
            id: self.next_id,
            query: query.to_string(),
            scraped_at,
            created_at: Utc::now(),
        });
        self.next_id
    }
}

/// Mirrors the PostgreSQL store's contract over in-memory tables
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Fail the mark step of the next store operations
    fail_mark: AtomicBool,
}

impl MemoryStore {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one unscraped log row per query
    pub fn with_queries<I, S>(queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tables = Tables::default();
        for query in queries {
            tables.insert_log(query.as_ref(), None);
        }

        Self {
            tables: Mutex::new(tables),
            fail_mark: AtomicBool::new(false),
        }
    }

    /// Append a log row, returning its id
    #[cfg(test)]
    pub async fn log_query(&self, query: &str, scraped_at: Option<DateTime<Utc>>) -> i64 {
        self.tables.lock().await.insert_log(query, scraped_at)
    }

    /// Append a log row under an existing id
    #[cfg(test)]
    pub async fn log_query_with_id(&self, id: i64, query: &str) {
        self.tables.lock().await.search_logs.push(SearchLogRow {
            id,
            query: query.to_string(),
            scraped_at: None,
            created_at: Utc::now(),
        });
    }

    /// Stored pages, ordered by URL
    pub async fn pages(&self) -> Vec<Page> {
        let tables = self.tables.lock().await;
        let mut pages: Vec<Page> = tables.pages.values().cloned().collect();
        pages.sort_by(|a, b| a.url.cmp(&b.url));
        pages
    }

    pub async fn search_logs(&self) -> Vec<SearchLogRow> {
        self.tables.lock().await.search_logs.clone()
    }

    /// Make the mark-scraped step fail, so the whole store rolls back
    #[cfg(test)]
    pub fn fail_mark_scraped(&self, fail: bool) {
        self.fail_mark.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl QueryStore for MemoryStore {
    async fn fetch_due_queries(&self, now: DateTime<Utc>) -> Result<Vec<SearchQuery>> {
        let tables = self.tables.lock().await;

        // (id, query) -> (count, latest scrape)
        let mut groups: BTreeMap<(i64, &str), (i64, Option<DateTime<Utc>>)> = BTreeMap::new();
        for row in &tables.search_logs {
            let entry = groups.entry((row.id, row.query.as_str())).or_insert((0, None));
            entry.0 += 1;
            entry.1 = entry.1.max(row.scraped_at);
        }

        let mut due: Vec<SearchQuery> = groups
            .into_iter()
            .filter(|(_, (_, last_scraped))| is_due(*last_scraped, now))
            .map(|((id, text), (count, _))| SearchQuery {
                id,
                text: text.to_string(),
                occurrences: count,
            })
            .collect();

        // Stable: ties stay in id order
        due.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        due.truncate(DUE_BATCH_LIMIT as usize);

        Ok(due)
    }

    async fn store_page_and_mark_scraped(&self, page: &Page, query: &str) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();

        // Both writes land on a copy that replaces the tables only on success
        let mut staged = tables.clone();

        match staged.pages.get_mut(&page.url) {
            Some(existing) => {
                existing.content = page.content.clone();
                existing.updated_at = page.updated_at;
            }
            None => {
                staged.pages.insert(page.url.clone(), page.clone());
            }
        }

        if self.fail_mark.load(Ordering::SeqCst) {
            bail!("Failed to mark search logs as scraped for query: {}", query);
        }

        let key = query_key(query);
        let mut marked = 0;
        for row in staged.search_logs.iter_mut().filter(|row| query_key(&row.query) == key) {
            row.scraped_at = Some(now);
            marked += 1;
        }

        *tables = staged;
        debug!(marked, url = %page.url, "Committed page");

        Ok(marked)
    }
}
