//! Term-overlap scoring used to pick a search result.

use crate::wiki::html::SearchHit;

/// Similarity in `[0, 1]` between query terms and title terms.
///
/// Every (query, title) pair where one term contains the other counts as a
/// match, so "go" matches "golang" and "list" matches "lists". The count is
/// divided by the longer of the two lists.
pub fn score<Q, T>(query_terms: &[Q], title_terms: &[T]) -> f64
where
    Q: AsRef<str>,
    T: AsRef<str>,
{
    if query_terms.is_empty() || title_terms.is_empty() {
        return 0.0;
    }

    let query_terms: Vec<String> = query_terms.iter().map(|t| t.as_ref().to_lowercase()).collect();
    let title_terms: Vec<String> = title_terms.iter().map(|t| t.as_ref().to_lowercase()).collect();

    let matches = query_terms
        .iter()
        .flat_map(|q| title_terms.iter().map(move |t| (q, t)))
        .filter(|(q, t)| t.contains(q.as_str()) || q.contains(t.as_str()))
        .count();

    let score = matches as f64 / query_terms.len().max(title_terms.len()) as f64;
    score.min(1.0)
}

/// The hit whose title scores strictly highest against `query`.
/// Ties keep the earlier hit; hits scoring zero are never chosen.
pub fn best_match<'a>(query: &str, hits: &'a [SearchHit]) -> Option<&'a SearchHit> {
    let query_terms: Vec<&str> = query.split_whitespace().collect();

    let mut best: Option<(&SearchHit, f64)> = None;
    for hit in hits {
        let title_terms: Vec<&str> = hit.title.split_whitespace().collect();
        let hit_score = score(&query_terms, &title_terms);
        let best_score = best.map_or(0.0, |(_, s)| s);
        if hit_score > best_score {
            best = Some((hit, hit_score));
        }
    }

    best.map(|(hit, _)| hit)
}
