use std::collections::HashSet;
use url::Url;
use tracing::debug;

use crate::cli::config::FetchSettings;

/// Where a crawl is allowed to go
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    /// Site root that relative links and candidate URLs are built from
    pub base_url: Url,

    /// Hosts (and their subdomains) requests may be sent to
    pub allowed_domains: Vec<String>,
}

impl CrawlTarget {
    pub fn new(base_url: Url, allowed_domains: Vec<String>) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|domain| domain.to_lowercase())
            .collect();

        Self {
            base_url,
            allowed_domains,
        }
    }

    pub fn from_settings(settings: &FetchSettings) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&settings.base_url)?;
        Ok(Self::new(base_url, settings.allowed_domains.clone()))
    }

    /// Base URL without a trailing slash, for string-built candidates
    pub fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// Resolve a link found in page markup (usually `/wiki/...`)
    pub fn resolve(&self, href: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(href)
    }

    pub fn is_allowed(&self, url: &Url) -> bool {
        url.host_str()
            .map(|host| domain_allowed(host, &self.allowed_domains))
            .unwrap_or(false)
    }
}

/// Whether `host` is one of `allowed` or a subdomain of one
pub fn domain_allowed(host: &str, allowed: &[String]) -> bool {
    matching_domain(host, allowed).is_some()
}

/// The broadest allow-list entry covering `host`, so that every subdomain
/// of `wikipedia.org` maps to `wikipedia.org`
pub fn matching_domain<'a>(host: &str, allowed: &'a [String]) -> Option<&'a str> {
    let host = host.to_lowercase();
    allowed
        .iter()
        .filter(|domain| host == **domain || host.ends_with(&format!(".{}", domain)))
        .min_by_key(|domain| domain.len())
        .map(String::as_str)
}

/// Decides which discovered links a session may follow.
///
/// Owned by exactly one crawl session; the visited set only grows.
pub struct VisitScheduler {
    /// Domain allow-list
    target: CrawlTarget,

    /// Normalized URLs already followed
    visited: HashSet<String>,
}

impl VisitScheduler {
    pub fn new(target: CrawlTarget) -> Self {
        Self {
            target,
            visited: HashSet::new(),
        }
    }

    /// Admit `url` for following if it is on an allowed domain and has not
    /// been followed before. Admitted URLs are marked visited.
    pub fn should_follow(&mut self, url: &Url) -> bool {
        if !self.target.is_allowed(url) {
            debug!("Skipping URL from non-allowed domain: {}", url);
            return false;
        }

        let normalized = self.normalize_url(url);
        if !self.visited.insert(normalized) {
            debug!("Skipping already visited URL: {}", url);
            return false;
        }

        true
    }

    #[cfg(test)]
    pub fn has_visited(&self, url: &Url) -> bool {
        self.visited.contains(&self.normalize_url(url))
    }

    /// Normalize a URL to avoid duplicates due to minor differences
    fn normalize_url(&self, url: &Url) -> String {
        let mut normalized = url.clone();

        // Remove default ports
        if let Some(port) = normalized.port() {
            if (normalized.scheme() == "http" && port == 80)
                || (normalized.scheme() == "https" && port == 443)
            {
                let _ = normalized.set_port(None);
            }
        }

        // Sort query parameters if present
        if let Some(query) = normalized.query().filter(|q| !q.is_empty()) {
            let mut params: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect();
            params.sort();

            let sorted = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            normalized.set_query(Some(&sorted));
        }

        // Remove fragments (anchors)
        normalized.set_fragment(None);

        normalized.to_string()
    }

    /// Number of URLs followed so far
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> CrawlTarget {
        CrawlTarget::new(
            Url::parse("https://en.wikipedia.org").unwrap(),
            vec!["wikipedia.org".to_string(), "en.wikipedia.org".to_string()],
        )
    }

    #[test]
    fn test_should_follow() {
        let mut scheduler = VisitScheduler::new(target());
        let url = Url::parse("https://en.wikipedia.org/wiki/Rust").unwrap();

        assert!(scheduler.should_follow(&url));

        // Should not follow the same URL twice
        assert!(!scheduler.should_follow(&url));

        // Should not follow URLs outside the allow-list
        assert!(!scheduler.should_follow(&Url::parse("https://example.com/wiki/Rust").unwrap()));

        assert_eq!(scheduler.visited_count(), 1);
    }

    #[test]
    fn test_visited_ignores_minor_differences() {
        let mut scheduler = VisitScheduler::new(target());
        assert!(scheduler.should_follow(
            &Url::parse("https://EN.wikipedia.org:443/w/index.php?title=X&search=y#top").unwrap()
        ));
        assert!(scheduler.has_visited(
            &Url::parse("https://en.wikipedia.org/w/index.php?search=y&title=X").unwrap()
        ));
    }

    #[test]
    fn test_resolve_relative_links() {
        let target = target();
        assert_eq!(
            target.resolve("/wiki/Python_(programming_language)").unwrap().as_str(),
            "https://en.wikipedia.org/wiki/Python_(programming_language)"
        );
        assert_eq!(target.base(), "https://en.wikipedia.org");
    }

    #[test]
    fn test_domain_allowed() {
        let allowed = vec!["wikipedia.org".to_string()];
        assert!(domain_allowed("wikipedia.org", &allowed));
        assert!(domain_allowed("en.wikipedia.org", &allowed));
        assert!(domain_allowed("EN.Wikipedia.org", &allowed));
        assert!(!domain_allowed("notwikipedia.org", &allowed));
        assert!(!domain_allowed("wikipedia.org.evil.com", &allowed));
    }

    #[test]
    fn test_matching_domain_picks_broadest_entry() {
        let allowed = vec![
            "en.wikipedia.org".to_string(),
            "wikipedia.org".to_string(),
            "www.wikipedia.org".to_string(),
        ];
        assert_eq!(matching_domain("en.wikipedia.org", &allowed), Some("wikipedia.org"));
        assert_eq!(matching_domain("de.wikipedia.org", &allowed), Some("wikipedia.org"));
        assert_eq!(matching_domain("example.com", &allowed), None);
    }
}
