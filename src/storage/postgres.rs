use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::PgPool;
use std::str::FromStr;
use tracing::{debug, info};

use super::{due_cutoff, QueryStore, RetryPolicy, DUE_BATCH_LIMIT};
use crate::cli::config::DatabaseSettings;
use crate::crawler::task::{Page, SearchQuery};

const DUE_QUERIES: &str = "
    SELECT id, query, COUNT(*) AS count
    FROM search_logs
    GROUP BY id, query
    HAVING MAX(scraped_at) IS NULL OR MAX(scraped_at) < $1
    ORDER BY count DESC
    LIMIT $2";

const UPSERT_PAGE: &str = "
    INSERT INTO pages (title, url, language, content, created_at, updated_at)
    VALUES ($1, $2, $3, $4, $5, $6)
    ON CONFLICT (url) DO UPDATE
    SET content = EXCLUDED.content, updated_at = EXCLUDED.updated_at";

const MARK_SCRAPED: &str = "
    UPDATE search_logs
    SET scraped_at = $1
    WHERE TRIM(LOWER(query)) = TRIM(LOWER($2))";

/// PostgreSQL-backed query store
pub struct PostgresStore {
    /// PostgreSQL connection pool
    pool: PgPool,
}

impl PostgresStore {
    /// Build the pool and check connectivity, retrying with backoff
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let store = Self::connect_lazy(settings)?;

        let policy = RetryPolicy::new(settings.connect_retries, settings.retry_backoff);
        policy
            .run("Database ping", || store.ping())
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!(
            max_connections = settings.max_connections,
            "Connected to PostgreSQL database"
        );

        Ok(store)
    }

    /// Build the pool without opening a connection
    pub fn connect_lazy(settings: &DatabaseSettings) -> Result<Self> {
        let options = connect_options(settings)?;

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .max_lifetime(settings.max_lifetime)
            .idle_timeout(settings.idle_timeout)
            .connect_lazy_with(options);

        Ok(Self { pool })
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Connection options from a URL when one is set, otherwise from the
/// individual fields (without TLS)
fn connect_options(settings: &DatabaseSettings) -> Result<PgConnectOptions> {
    if let Some(url) = &settings.url {
        return PgConnectOptions::from_str(url).context("Invalid database URL");
    }

    let mut options = PgConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .database(&settings.name)
        .ssl_mode(PgSslMode::Disable);

    if let Some(password) = &settings.password {
        options = options.password(password);
    }

    Ok(options)
}

#[async_trait]
impl QueryStore for PostgresStore {
    async fn fetch_due_queries(&self, now: DateTime<Utc>) -> Result<Vec<SearchQuery>> {
        let queries = sqlx::query_as::<_, SearchQuery>(DUE_QUERIES)
            .bind(due_cutoff(now))
            .bind(DUE_BATCH_LIMIT)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query due search logs")?;

        debug!("Fetched {} due queries", queries.len());
        Ok(queries)
    }

    async fn store_page_and_mark_scraped(&self, page: &Page, query: &str) -> Result<u64> {
        // Dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(UPSERT_PAGE)
            .bind(&page.title)
            .bind(&page.url)
            .bind(&page.language)
            .bind(&page.content)
            .bind(page.created_at)
            .bind(page.updated_at)
            .execute(&mut *tx)
            .await
            .context(format!("Failed to upsert page: {}", page.url))?;

        let marked = sqlx::query(MARK_SCRAPED)
            .bind(Utc::now())
            .bind(query)
            .execute(&mut *tx)
            .await
            .context("Failed to mark search logs as scraped")?
            .rows_affected();

        tx.commit().await.context("Failed to commit transaction")?;

        debug!(marked, url = %page.url, "Committed page");
        Ok(marked)
    }
}
