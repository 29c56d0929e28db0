use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Language tag stored with every scraped page
pub const PAGE_LANGUAGE: &str = "en";

/// A search-log query due for scraping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SearchQuery {
    /// Identifier of the search-log row
    pub id: i64,

    /// Raw query text as typed by the user
    #[sqlx(rename = "query")]
    pub text: String,

    /// How many times the query appears in the log
    #[sqlx(rename = "count")]
    pub occurrences: i64,
}

/// An accepted article, ready to be stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Article heading
    pub title: String,

    /// Final URL the article was read from; unique in the page store
    pub url: String,

    /// Content language
    pub language: String,

    /// Cleaned article text
    pub content: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn new(title: impl Into<String>, url: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            title: title.into(),
            url: url.into(),
            language: PAGE_LANGUAGE.to_string(),
            content: content.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// How a crawl session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// A valid article was found
    Accepted(Page),

    /// Every candidate was tried without finding a valid article
    Exhausted,

    /// The per-query deadline passed first
    TimedOut,
}

/// Why a single query was not stored
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid query {query:?}: {reason}")]
    InvalidQuery { query: String, reason: String },

    #[error("timed out after {after:?} while processing query {query:?}")]
    TimedOut { query: String, after: Duration },

    #[error("no valid content found for query {0:?}")]
    NoValidContent(String),

    #[error("failed to store page for query {query:?}: {error:#}")]
    Store { query: String, error: anyhow::Error },
}
