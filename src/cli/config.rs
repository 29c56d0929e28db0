use anyhow::{Result, Context};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub scraper: ScraperConfig,
    pub fetch: FetchSettings,
    pub database: DatabaseSettings,
}

/// Crawl limits shared by every session in a run
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ScraperConfig {
    /// Search-result and redirect hops allowed per query
    pub max_redirects: u32,
    /// Deadline for a whole query, all candidates included
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// Minimum spacing between requests to the same host
    #[serde(with = "duration_str")]
    pub rate_limit: Duration,
    /// Hops followed from a single candidate URL (0 = unbounded)
    pub max_depth: u32,
    /// Requests in flight at once, across all sessions
    pub parallel_requests: usize,
}

/// HTTP target settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FetchSettings {
    pub base_url: String,
    pub allowed_domains: Vec<String>,
    pub user_agent: String,
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
}

/// PostgreSQL settings
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Full connection string; takes precedence over the individual fields
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
    pub max_connections: u32,
    #[serde(with = "duration_str")]
    pub max_lifetime: Duration,
    #[serde(with = "duration_str")]
    pub idle_timeout: Duration,
    pub connect_retries: u32,
    #[serde(with = "duration_str")]
    pub retry_backoff: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            max_redirects: 3,
            timeout: Duration::from_secs(30),
            rate_limit: Duration::from_secs(1),
            max_depth: 1,
            parallel_requests: 2,
        }
    }
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_url: "https://en.wikipedia.org".to_string(),
            allowed_domains: vec![
                "wikipedia.org".to_string(),
                "www.wikipedia.org".to_string(),
                "en.wikipedia.org".to_string(),
            ],
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: None,
            name: "postgres".to_string(),
            max_connections: 10,
            max_lifetime: Duration::from_secs(180),
            idle_timeout: Duration::from_secs(60),
            connect_retries: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl AppConfig {
    /// Get the path of the default config file
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "wiki-scraper", "wiki-scraper")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Load defaults, then the config file, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a file
    fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Overlay environment variables. Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let scraper = &mut self.scraper;
        set_parsed(&lookup, "SCRAPER_MAX_REDIRECTS", &mut scraper.max_redirects, |v| v.parse().ok());
        set_parsed(&lookup, "SCRAPER_TIMEOUT", &mut scraper.timeout, parse_duration);
        set_parsed(&lookup, "SCRAPER_RATE_LIMIT", &mut scraper.rate_limit, parse_duration);
        set_parsed(&lookup, "SCRAPER_MAX_DEPTH", &mut scraper.max_depth, |v| v.parse().ok());
        set_parsed(&lookup, "SCRAPER_PARALLEL_REQUESTS", &mut scraper.parallel_requests, |v| {
            v.parse::<usize>().ok().filter(|n| *n > 0)
        });

        let db = &mut self.database;
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            db.url = Some(url);
        }
        set_parsed(&lookup, "API_DATABASE_HOST", &mut db.host, non_empty);
        set_parsed(&lookup, "API_DATABASE_PORT", &mut db.port, |v| v.parse().ok());
        set_parsed(&lookup, "API_DATABASE_USER", &mut db.user, non_empty);
        set_parsed(&lookup, "API_DATABASE_NAME", &mut db.name, non_empty);
        if let Some(password) = lookup("API_DATABASE_PASSWORD") {
            db.password = Some(password);
        }
    }

    /// Copy safe to print: credentials are masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.database.password.is_some() {
            config.database.password = Some("********".to_string());
        }
        if let Some(raw) = &config.database.url {
            if let Ok(mut parsed) = url::Url::parse(raw) {
                if parsed.password().is_some() && parsed.set_password(Some("********")).is_ok() {
                    config.database.url = Some(parsed.to_string());
                }
            }
        }
        config
    }
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.to_string()).filter(|v| !v.is_empty())
}

fn set_parsed<T, L, P>(lookup: &L, key: &str, slot: &mut T, parse: P)
where
    L: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let Some(raw) = lookup(key) else {
        return;
    };

    match parse(raw.trim()) {
        Some(value) => *slot = value,
        None => warn!("Ignoring invalid value for {}: {:?}", key, raw),
    }
}

static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)(ms|s|m|h)").expect("duration pattern is a valid regex")
});

/// Parse Go-style durations ("30s", "1m30s", "1500ms") or bare seconds
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in DURATION_PART.captures_iter(value) {
        let whole = caps.get(0)?;
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();

        let amount: f64 = caps[1].parse().ok()?;
        let secs = match &caps[2] {
            "ms" => amount / 1000.0,
            "s" => amount,
            "m" => amount * 60.0,
            "h" => amount * 3600.0,
            _ => return None,
        };
        let part = Duration::try_from_secs_f64(secs).ok()?;
        total = total.checked_add(part)?;
    }

    (consumed == value.len()).then_some(total)
}

/// Render a duration the way `parse_duration` reads it
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

mod duration_str {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text)
                .ok_or_else(|| D::Error::custom(format!("invalid duration: {}", text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.scraper.max_redirects, 3);
        assert_eq!(config.scraper.timeout, Duration::from_secs(30));
        assert_eq!(config.scraper.rate_limit, Duration::from_secs(1));
        assert_eq!(config.scraper.max_depth, 1);
        assert_eq!(config.scraper.parallel_requests, 2);
        assert_eq!(config.database.connect_retries, 3);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("SCRAPER_MAX_REDIRECTS", "5"),
            ("SCRAPER_TIMEOUT", "45s"),
            ("SCRAPER_RATE_LIMIT", "500ms"),
            ("SCRAPER_PARALLEL_REQUESTS", "4"),
            ("API_DATABASE_HOST", "db.internal"),
            ("API_DATABASE_PORT", "6543"),
            ("API_DATABASE_PASSWORD", "secret"),
        ]));

        assert_eq!(config.scraper.max_redirects, 5);
        assert_eq!(config.scraper.timeout, Duration::from_secs(45));
        assert_eq!(config.scraper.rate_limit, Duration::from_millis(500));
        assert_eq!(config.scraper.parallel_requests, 4);
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_env_values_keep_previous() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("SCRAPER_MAX_REDIRECTS", "many"),
            ("SCRAPER_TIMEOUT", "soon"),
            ("SCRAPER_PARALLEL_REQUESTS", "0"),
        ]));

        assert_eq!(config.scraper, ScraperConfig::default());

        config.apply_env(env(&[
            ("SCRAPER_TIMEOUT", "99999999999999999999s"),
            ("SCRAPER_RATE_LIMIT", "5000000000000000h5000000000000000h"),
        ]));
        assert_eq!(config.scraper, ScraperConfig::default());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1500ms"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("12"), Some(Duration::from_secs(12)));
        assert_eq!(parse_duration("10 s"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("5d"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("99999999999999999999s"), None);
        assert_eq!(parse_duration("5000000000000000h5000000000000000h"), None);
    }

    #[test]
    fn test_yaml_round_trip_uses_duration_strings() {
        let yaml = serde_yaml::to_string(&AppConfig::default()).unwrap();
        assert!(yaml.contains("timeout: 30s"));

        let parsed: AppConfig = serde_yaml::from_str(
            "scraper:\n  max_redirects: 2\n  timeout: 10\n  rate_limit: 250ms\n",
        )
        .unwrap();
        assert_eq!(parsed.scraper.max_redirects, 2);
        assert_eq!(parsed.scraper.timeout, Duration::from_secs(10));
        assert_eq!(parsed.scraper.rate_limit, Duration::from_millis(250));
        assert_eq!(parsed.scraper.parallel_requests, 2);
        assert_eq!(parsed.fetch.base_url, "https://en.wikipedia.org");
    }

    #[test]
    fn test_redacted_masks_credentials() {
        let mut config = AppConfig::default();
        config.database.password = Some("hunter2".to_string());
        config.database.url = Some("postgres://app:hunter2@db:5432/search".to_string());

        let redacted = config.redacted();
        assert_eq!(redacted.database.password.as_deref(), Some("********"));
        assert!(!redacted.database.url.unwrap().contains("hunter2"));
    }
}
