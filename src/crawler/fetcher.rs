//! HTTP transport for crawl sessions.
//!
//! Every request goes through the shared [`DomainLimiter`] and is refused
//! before any I/O when its host is outside the allow-list.

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::cli::config::FetchSettings;
use crate::crawler::limiter::DomainLimiter;
use crate::crawler::scheduler::{domain_allowed, matching_domain};
use crate::utils::RequestTimer;

/// Most HTTP-level redirects followed inside a single fetch
const MAX_HTTP_REDIRECTS: usize = 10;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("domain not allowed: {0}")]
    Disallowed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request limiter closed")]
    LimiterClosed,
}

/// A fetched document
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after HTTP redirects
    pub final_url: Url,
    pub status: u16,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: Client,
    allowed_domains: Vec<String>,
    limiter: Arc<DomainLimiter>,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings, limiter: Arc<DomainLimiter>) -> Result<Self, FetchError> {
        let allowed_domains: Vec<String> = settings
            .allowed_domains
            .iter()
            .map(|domain| domain.to_lowercase())
            .collect();

        // HTTP redirects must stay on the allow-list too
        let redirect_domains = allowed_domains.clone();
        let policy = Policy::custom(move |attempt| {
            let allowed = attempt
                .url()
                .host_str()
                .map(|host| domain_allowed(host, &redirect_domains))
                .unwrap_or(false);

            if !allowed || attempt.previous().len() >= MAX_HTTP_REDIRECTS {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.request_timeout)
            .redirect(policy)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            allowed_domains,
            limiter,
        })
    }
}

impl HttpFetcher {
    /// Rate-limit key for `url`: the allow-list domain its host falls under
    fn limit_key(&self, url: &Url) -> Result<&str, FetchError> {
        url.host_str()
            .and_then(|host| matching_domain(host, &self.allowed_domains))
            .ok_or_else(|| FetchError::Disallowed(url.to_string()))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let domain = self.limit_key(url)?;

        let _permit = self
            .limiter
            .acquire(domain)
            .await
            .map_err(|_| FetchError::LimiterClosed)?;

        debug!("Fetching: {}", url);
        let timer = RequestTimer::start();
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: final_url.to_string(),
            });
        }

        let body = response.text().await?;
        debug!(
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = timer.end(),
            "Fetched: {}",
            final_url
        );

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            body,
        })
    }
}
