//! Turns raw search-log text into Wikipedia lookup targets.
//!
//! Two paths exist: programming questions ("how to implement quicksort")
//! collapse to their last key term, everything else is stripped of
//! interrogative prefixes and noisy suffixes and formatted as an article
//! title ("python stock" -> "Python").

use std::sync::LazyLock;

use regex::Regex;
use url::form_urlencoded;

/// Characters a raw query may not contain.
const INVALID_CHARS: &[char] = &['<', '>', '{', '}', '|', '\\', '^', '[', ']', '`'];

/// Patterns marking a query as a programming question (case-insensitive).
const PROGRAMMING_PATTERNS: &[&str] = &[
    r"(?i)what is the best programming language",
    r"(?i)how to.*(?:code|program|develop|implement|write|use|run)",
    r"(?i)what are the.*(?:features|capabilities|requirements)",
];

/// Question prefixes removed before key-term extraction.
/// Each is applied once, in order.
const QUESTION_PREFIXES: &[&str] = &[
    "what is the best programming language for",
    "how to program",
    "how to implement",
    "what are the features of",
    "how do i use",
];

/// Leading interrogatives removed from general queries.
const GENERAL_PREFIXES: &[&str] = &[
    "what is", "what are", "how to", "is ", "are ", "why ", "when ", "where ", "who ",
    "which ", "how ", "can ",
];

/// Trailing noise removed from general queries.
const GENERAL_SUFFIXES: &[&str] = &[" in 2024", " 2024", " 2025", " stock", " wiki", " wikipedia"];

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "that", "the", "to", "was", "were", "will", "with",
];

static PROGRAMMING_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PROGRAMMING_PATTERNS
        .iter()
        .map(|pattern| Regex::new(pattern).expect("programming pattern is a valid regex"))
        .collect()
});

/// Reject queries that are blank or carry characters that cannot form an
/// article title.
pub fn screen(raw: &str) -> Result<(), String> {
    if raw.trim().is_empty() {
        return Err("empty query".to_string());
    }

    match raw.chars().find(|c| INVALID_CHARS.contains(c)) {
        Some(c) => Err(format!("query contains invalid character: {}", c)),
        None => Ok(()),
    }
}

/// Normalize a raw query into a crawl-ready search term.
///
/// Returns `None` when the query is unusable. A general query whose text is
/// consumed entirely by prefix/suffix stripping yields `Some("")`, which
/// produces no candidate URLs.
pub fn normalize(raw: &str) -> Option<String> {
    let query = raw.trim();
    if query.is_empty() {
        return None;
    }

    if is_programming_question(query) {
        return extract_key_terms(query).pop();
    }

    Some(clean_query(query))
}

pub fn is_programming_question(query: &str) -> bool {
    PROGRAMMING_REGEXES.iter().any(|re| re.is_match(query))
}

/// Lowercase, drop known question prefixes and keep the non-stop-words.
pub fn extract_key_terms(query: &str) -> Vec<String> {
    let mut query = query.to_lowercase();
    for prefix in QUESTION_PREFIXES {
        if let Some(rest) = query.strip_prefix(prefix) {
            query = rest.to_string();
        }
    }

    query
        .split_whitespace()
        .filter(|word| !is_stop_word(word))
        .map(str::to_string)
        .collect()
}

fn clean_query(query: &str) -> String {
    let mut query = query.trim().to_lowercase();

    for prefix in GENERAL_PREFIXES {
        if let Some(rest) = query.strip_prefix(prefix) {
            query = rest.trim().to_string();
        }
    }

    for suffix in GENERAL_SUFFIXES {
        if let Some(rest) = query.strip_suffix(suffix) {
            query = rest.trim().to_string();
        }
    }

    format_for_url(&query)
}

/// Title-case every word except non-leading stop words and join with `_`.
pub fn format_for_url(query: &str) -> String {
    query
        .split_whitespace()
        .enumerate()
        .map(|(i, word)| {
            if i == 0 || !is_stop_word(word) {
                title_case(word)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("_")
}

pub fn is_stop_word(word: &str) -> bool {
    let word = word.to_lowercase();
    STOP_WORDS.contains(&word.as_str())
}

/// Uppercase the first letter of every word-part; a part starts after any
/// character that is not alphanumeric or `_` ("c-sharp" -> "C-Sharp").
fn title_case(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut at_boundary = true;

    for c in word.chars() {
        if at_boundary {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_boundary = !(c.is_alphanumeric() || c == '_');
    }

    out
}

fn escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Ordered candidate URLs for a query: the site search with the original
/// text, the article path for the normalized term, then the article path
/// for the original text with spaces as underscores.
pub fn build_search_urls(base_url: &str, normalized: &str, original: &str) -> Vec<String> {
    if normalized.is_empty() {
        return Vec::new();
    }

    let base = base_url.trim_end_matches('/');
    let original = original.trim();

    vec![
        format!(
            "{}/w/index.php?search={}&title=Special:Search",
            base,
            escape(original)
        ),
        format!("{}/wiki/{}", base, escape(normalized)),
        format!("{}/wiki/{}", base, escape(&original.replace(' ', "_"))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://en.wikipedia.org";

    #[test]
    fn test_empty_query_is_invalid() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("   \t "), None);
    }

    #[test]
    fn test_programming_question_uses_last_key_term() {
        assert_eq!(normalize("How to implement quicksort").as_deref(), Some("quicksort"));
        assert_eq!(
            normalize("what is the best programming language for web development").as_deref(),
            Some("development")
        );
        assert_eq!(
            normalize("What are the features of Rust").as_deref(),
            Some("rust")
        );
    }

    #[test]
    fn test_stop_words_never_become_the_term() {
        let term = normalize("how to implement a linked list").unwrap();
        assert_eq!(term, "list");
        assert_ne!(term, "a");
        assert_ne!(term, "to");
    }

    #[test]
    fn test_programming_question_with_only_stop_words_is_invalid() {
        assert_eq!(normalize("how to implement a"), None);
    }

    #[test]
    fn test_general_query_is_formatted_as_title() {
        assert_eq!(normalize("Python").as_deref(), Some("Python"));
        assert_eq!(normalize("what is machine learning").as_deref(), Some("Machine_Learning"));
        assert_eq!(normalize("tesla stock").as_deref(), Some("Tesla"));
        assert_eq!(normalize("who painted the mona lisa").as_deref(), Some("Painted_the_Mona_Lisa"));
        assert_eq!(normalize("  rust programming wikipedia ").as_deref(), Some("Rust_Programming"));
    }

    #[test]
    fn test_general_query_consumed_by_prefix_is_empty_but_valid() {
        assert_eq!(normalize("what is").as_deref(), Some(""));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        for query in ["How to implement quicksort", "Python", "where is the eiffel tower 2024"] {
            assert_eq!(normalize(query), normalize(query));
        }
    }

    #[test]
    fn test_title_case_splits_on_punctuation() {
        assert_eq!(format_for_url("c-sharp and f#"), "C-Sharp_and_F#");
        assert_eq!(format_for_url("the lord of the rings"), "The_Lord_of_the_Rings");
    }

    #[test]
    fn test_screen_rejects_markup_characters() {
        assert!(screen("rust").is_ok());
        assert!(screen("   ").is_err());
        assert!(screen("<script>").is_err());
        assert!(screen("vec[0]").is_err());
    }

    #[test]
    fn test_build_search_urls_order() {
        let urls = build_search_urls(BASE, "Machine_Learning", "what is machine learning");
        assert_eq!(
            urls,
            vec![
                "https://en.wikipedia.org/w/index.php?search=what+is+machine+learning&title=Special:Search",
                "https://en.wikipedia.org/wiki/Machine_Learning",
                "https://en.wikipedia.org/wiki/what_is_machine_learning",
            ]
        );
    }

    #[test]
    fn test_build_search_urls_escapes_terms() {
        let urls = build_search_urls(BASE, "C++", "c++ & rust");
        assert_eq!(urls[0], "https://en.wikipedia.org/w/index.php?search=c%2B%2B+%26+rust&title=Special:Search");
        assert_eq!(urls[1], "https://en.wikipedia.org/wiki/C%2B%2B");
        assert_eq!(urls[2], "https://en.wikipedia.org/wiki/c%2B%2B_%26_rust");
    }

    #[test]
    fn test_build_search_urls_empty_term() {
        assert!(build_search_urls(BASE, "", "what is").is_empty());
    }
}
