//! Classification of fetched Wikipedia markup.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static CSS selector is valid")
}

static SEARCH_RESULTS: LazyLock<Selector> = LazyLock::new(|| selector(".mw-search-results"));
static SEARCH_RESULT: LazyLock<Selector> = LazyLock::new(|| selector(".mw-search-result"));
static RESULT_HEADING: LazyLock<Selector> = LazyLock::new(|| selector(".mw-search-result-heading"));
static RESULT_LINK: LazyLock<Selector> = LazyLock::new(|| selector(".mw-search-result-heading a"));
static REDIRECT_LINK: LazyLock<Selector> = LazyLock::new(|| selector(".redirectText a"));
static HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h1#firstHeading"));
static CONTENT: LazyLock<Selector> = LazyLock::new(|| selector("div#mw-content-text"));

/// One entry of a search-results listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub href: Option<String>,
}

/// What a fetched page turned out to be, checked in priority order.
#[derive(Debug, Clone, PartialEq)]
pub enum PageKind {
    SearchResults(Vec<SearchHit>),
    Redirect(String),
    Article { title: String, content: String },
}

/// Concatenated, trimmed text of the first element matching `sel`.
fn child_text(scope: ElementRef<'_>, sel: &Selector) -> String {
    scope
        .select(sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn child_attr(scope: ElementRef<'_>, sel: &Selector, attr: &str) -> Option<String> {
    scope
        .select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn classify(body: &str) -> PageKind {
    let document = Html::parse_document(body);
    let root = document.root_element();

    if !child_text(root, &SEARCH_RESULTS).is_empty() {
        let hits = root
            .select(&SEARCH_RESULT)
            .map(|result| SearchHit {
                title: child_text(result, &RESULT_HEADING),
                href: child_attr(result, &RESULT_LINK, "href"),
            })
            .collect();
        return PageKind::SearchResults(hits);
    }

    if let Some(target) = child_attr(root, &REDIRECT_LINK, "href") {
        return PageKind::Redirect(target);
    }

    PageKind::Article {
        title: child_text(root, &HEADING),
        content: child_text(root, &CONTENT),
    }
}
