//! Per-query crawl state machine.
//!
//! A session walks its candidate URLs in order. Each fetched page is
//! dispatched as a search-results page, a redirect notice or an article:
//! the first two produce a follow-up URL (sharing one redirect budget), the
//! last either ends the session or is discarded in favour of the next
//! candidate. Follow-up chains are resolved depth-first before the next
//! candidate is tried.

use tracing::{debug, info, warn};
use url::Url;

use crate::cli::config::ScraperConfig;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::scheduler::{CrawlTarget, VisitScheduler};
use crate::crawler::task::{Page, ScrapeError, SessionOutcome};
use crate::wiki::html::{self, PageKind};
use crate::wiki::{content, matcher, query};

/// What to do after dispatching one fetched page
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Fetch this URL next, still within the current candidate
    Follow(Url),
    /// Stop: the page is a valid article
    Accept(Page),
    /// Nothing usable here; move to the next candidate
    Discard,
}

pub struct CrawlSession<'a> {
    config: &'a ScraperConfig,
    fetcher: &'a dyn Fetcher,
    target: CrawlTarget,

    /// Query text as logged
    query: String,
    /// Search term produced by the normalizer
    normalized_term: String,
    /// Candidate URLs, in the order they are tried
    candidates: Vec<String>,
    /// Visited set and allow-list for follow-ups
    scheduler: VisitScheduler,
    /// Follow-ups taken so far, across all candidates
    redirect_count: u32,
    /// Follow-ups taken from the current candidate
    chain_depth: u32,
    result: Option<Page>,
}

impl<'a> CrawlSession<'a> {
    /// Prepare a session for `raw_query`; fails when the query cannot be
    /// turned into a search term.
    pub fn new(
        raw_query: &str,
        config: &'a ScraperConfig,
        target: &CrawlTarget,
        fetcher: &'a dyn Fetcher,
    ) -> Result<Self, ScrapeError> {
        let invalid = |reason: String| ScrapeError::InvalidQuery {
            query: raw_query.to_string(),
            reason,
        };

        query::screen(raw_query).map_err(invalid)?;
        let normalized_term = query::normalize(raw_query)
            .ok_or_else(|| invalid("no search term left after normalization".to_string()))?;

        let candidates = query::build_search_urls(target.base(), &normalized_term, raw_query);
        debug!(term = %normalized_term, candidates = candidates.len(), "Normalized query");

        Ok(Self {
            config,
            fetcher,
            target: target.clone(),
            query: raw_query.trim().to_string(),
            normalized_term,
            candidates,
            scheduler: VisitScheduler::new(target.clone()),
            redirect_count: 0,
            chain_depth: 0,
            result: None,
        })
    }

    pub fn normalized_term(&self) -> &str {
        &self.normalized_term
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    pub fn found_valid_page(&self) -> bool {
        self.result.is_some()
    }

    /// Crawl until a valid article is found, the candidates run out or the
    /// per-query timeout elapses. In-flight requests are abandoned on timeout.
    pub async fn run(&mut self) -> SessionOutcome {
        let timeout = self.config.timeout;

        match tokio::time::timeout(timeout, self.crawl()).await {
            Ok(Some(page)) => {
                info!(url = %page.url, title = %page.title, redirects = self.redirect_count, "Accepted article");
                self.result = Some(page.clone());
                SessionOutcome::Accepted(page)
            }
            Ok(None) => {
                info!(
                    redirects = self.redirect_count,
                    visited = self.scheduler.visited_count(),
                    "No valid content found for query: {}",
                    self.query
                );
                SessionOutcome::Exhausted
            }
            Err(_) => {
                warn!(?timeout, redirects = self.redirect_count, "Timed out while processing query: {}", self.query);
                SessionOutcome::TimedOut
            }
        }
    }

    async fn crawl(&mut self) -> Option<Page> {
        let candidates = self.candidates.clone();

        for candidate in candidates {
            let url = match Url::parse(&candidate) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Skipping malformed candidate {}: {}", candidate, e);
                    continue;
                }
            };

            self.chain_depth = 0;
            if let Some(page) = self.visit(url).await {
                return Some(page);
            }
        }

        None
    }

    /// Fetch `url` and follow whatever it points at until the chain ends
    async fn visit(&mut self, mut url: Url) -> Option<Page> {
        loop {
            let fetched = match self.fetcher.fetch(&url).await {
                Ok(fetched) => fetched,
                Err(e) => {
                    warn!("Error visiting {}: {}", url, e);
                    return None;
                }
            };

            debug!(status = fetched.status, "Dispatching {}", fetched.final_url);
            match self.dispatch(&fetched.final_url, &fetched.body) {
                Transition::Follow(next) => {
                    debug!(from = %url, to = %next, redirects = self.redirect_count, "Following link");
                    url = next;
                }
                Transition::Accept(page) => return Some(page),
                Transition::Discard => return None,
            }
        }
    }

    /// Decide what a fetched page means for this session
    pub fn dispatch(&mut self, url: &Url, body: &str) -> Transition {
        match html::classify(body) {
            PageKind::SearchResults(hits) => {
                let best = matcher::best_match(&self.query, &hits).and_then(|hit| hit.href.clone());
                match best {
                    Some(href) => self.follow(&href),
                    None => {
                        debug!("No matching search result on {}", url);
                        Transition::Discard
                    }
                }
            }
            PageKind::Redirect(target) => self.follow(&target),
            PageKind::Article { title, content } => {
                if content::is_valid(&title, &content) {
                    Transition::Accept(Page::new(title, url.as_str(), content::clean(&content)))
                } else {
                    debug!("Discarding page without usable content: {}", url);
                    Transition::Discard
                }
            }
        }
    }

    /// Take a search-result or redirect hop if the visited set, chain depth
    /// and redirect budget all allow it
    fn follow(&mut self, href: &str) -> Transition {
        let next = match self.target.resolve(href) {
            Ok(next) => next,
            Err(e) => {
                debug!("Ignoring unresolvable link {}: {}", href, e);
                return Transition::Discard;
            }
        };

        if !self.scheduler.should_follow(&next) {
            return Transition::Discard;
        }

        if self.config.max_depth > 0 && self.chain_depth >= self.config.max_depth {
            debug!(depth = self.chain_depth, "Max depth reached, not following {}", next);
            return Transition::Discard;
        }

        if self.redirect_count >= self.config.max_redirects {
            debug!(redirects = self.redirect_count, "Redirect budget exhausted, not following {}", next);
            return Transition::Discard;
        }

        self.redirect_count += 1;
        self.chain_depth += 1;
        Transition::Follow(next)
    }
}
