//! Article acceptance rules and boilerplate stripping.

/// Shortest article body (in characters) worth storing.
pub const MIN_CONTENT_CHARS: usize = 200;

/// Phrases that only appear on missing-article and disambiguation pages.
const INVALID_MARKERS: &[&str] = &[
    "Wikipedia does not have an article",
    "Wikipedia does not yet have an article",
    "This article needs to be created",
    "If you expected a page to be here",
    "may refer to:",
];

/// Interface text that leaks into extracted article bodies.
const BOILERPLATE: &[&str] = &[
    "[edit]",
    "[citation needed]",
    "Jump to navigation",
    "Jump to search",
];

/// Whether an extracted heading and body describe a real article.
pub fn is_valid(title: &str, content: &str) -> bool {
    if title.is_empty() || content.is_empty() {
        return false;
    }

    if content.chars().count() < MIN_CONTENT_CHARS {
        return false;
    }

    !INVALID_MARKERS.iter().any(|marker| content.contains(marker))
}

/// Remove edit links, citation markers and navigation hints.
pub fn clean(content: &str) -> String {
    let mut cleaned = content.to_string();
    for marker in BOILERPLATE {
        cleaned = cleaned.replace(marker, "");
    }
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(len: usize) -> String {
        "x".repeat(len)
    }

    #[test]
    fn test_length_boundary() {
        assert!(!is_valid("Title", &body(199)));
        assert!(is_valid("Title", &body(200)));
    }

    #[test]
    fn test_length_counts_characters_not_bytes() {
        assert!(!is_valid("Zürich", &"ü".repeat(199)));
        assert!(is_valid("Zürich", &"ü".repeat(200)));
    }

    #[test]
    fn test_empty_title_or_content() {
        assert!(!is_valid("", &body(500)));
        assert!(!is_valid("Title", ""));
    }

    #[test]
    fn test_missing_and_disambiguation_pages() {
        for marker in INVALID_MARKERS {
            let content = format!("{} {}", body(300), marker);
            assert!(!is_valid("Title", &content), "marker should invalidate: {}", marker);
        }
    }

    #[test]
    fn test_clean_strips_boilerplate() {
        let raw = "  Jump to navigation Jump to search Rust is a language[citation needed]. History[edit] ";
        assert_eq!(clean(raw), "Rust is a language. History");
    }

    #[test]
    fn test_clean_leaves_plain_text_alone() {
        assert_eq!(clean("Plain text."), "Plain text.");
    }
}
