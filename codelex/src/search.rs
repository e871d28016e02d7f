use crate::index::{InvertedIndex, SearchHit};
use std::collections::HashMap;

/// Lexical relevance of every matching document, min-max normalized to `[0, 1]`.
///
/// Never fails: a missing index or a search error yields an empty map, so
/// callers can treat lexical search as one optional signal among others.
/// Panics are not caught.
pub fn search(query: &str, index: Option<&InvertedIndex>) -> HashMap<String, f64> {
    let Some(index) = index else { return HashMap::new() };
    match index.search_index(query) {
        Ok(hits) => normalize(hits),
        Err(err) => {
            tracing::error!(%err, query, "lexical search failed");
            HashMap::new()
        }
    }
}

/// [`search`] results ordered by descending score, ties by document id.
pub fn search_ranked(query: &str, index: Option<&InvertedIndex>) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = search(query, index).into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

fn normalize(hits: Vec<SearchHit>) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::with_capacity(hits.len());
    for hit in hits {
        scores.entry(hit.doc_id).or_insert(hit.score);
    }
    if scores.is_empty() {
        return scores;
    }

    let max_score = scores.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let lowest = scores.values().copied().fold(f64::INFINITY, f64::min);
    // Uniform scores normalize against zero instead of collapsing the range.
    let min_score = if lowest < max_score { lowest } else { 0.0 };
    let range = max_score - min_score;

    scores
        .into_iter()
        .map(|(doc_id, score)| {
            let normalized = if range > 0.0 { (score - min_score) / range } else { 0.0 };
            (doc_id, normalized)
        })
        .collect()
}
