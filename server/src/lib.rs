use anyhow::{Context, Result};
use axum::{extract::{Query, State}, routing::get, Json, Router};
use codelex::corpus::load_snippets;
use codelex::{search_ranked, BuildOptions, CorpusBuilder, InvertedIndex, SourceFiles};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: String,
    /// Normalized to [0, 1].
    pub score: f64,
    pub path: String,
    pub start: usize,
    pub end: usize,
    pub preview: Option<String>,
}

struct SnippetView {
    path: String,
    start: usize,
    end: usize,
    text: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    index: Arc<Option<InvertedIndex>>,
    snippets: Arc<HashMap<String, SnippetView>>,
}

/// Build the index from chunker output at `snippets_path` and serve it.
pub fn build_app(snippets_path: &Path, root: &Path) -> Result<Router> {
    let snippets = load_snippets(snippets_path)
        .with_context(|| format!("loading snippets from {}", snippets_path.display()))?;
    let sources = SourceFiles::new();
    let index = CorpusBuilder::new(BuildOptions { parallel: true, ..Default::default() })
        .build_snippets_from(&snippets, root, &sources);
    let views: HashMap<String, SnippetView> = snippets
        .iter()
        .map(|s| {
            let text = sources.snippet_text(s).ok();
            let view = SnippetView { path: s.relative_path(root), start: s.start, end: s.end, text };
            (s.denotation(root), view)
        })
        .collect();
    let app_state = AppState { index: Arc::new(index), snippets: Arc::new(views) };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .with_state(app_state)
        .layer(cors_layer(std::env::var("CORS_ALLOW_ORIGIN").ok().as_deref()))
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

/// CORS for a comma-separated origin list. Any origin when none parses.
fn cors_layer(allow_origin: Option<&str>) -> CorsLayer {
    let origins = allowed_origins(allow_origin.unwrap_or_default());
    let origin = if origins.is_empty() { AllowOrigin::any() } else { AllowOrigin::list(origins) };
    CorsLayer::new().allow_origin(origin).allow_methods(Any).allow_headers(Any)
}

fn allowed_origins(list: &str) -> Vec<HeaderValue> {
    list.split(',').map(str::trim).filter(|s| !s.is_empty()).filter_map(|s| s.parse().ok()).collect()
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let ranked = search_ranked(&params.q, (*state.index).as_ref());
    let total_hits = ranked.len();
    let k = params.k.clamp(1, 100);

    let raw_terms: Vec<String> = params.q.split_whitespace().map(|s| s.to_string()).collect();
    let results: Vec<SearchHit> = ranked
        .into_iter()
        .take(k)
        .filter_map(|(doc_id, score)| {
            let view = state.snippets.get(&doc_id)?;
            let preview = view.text.as_deref().map(|text| preview_text(text, &raw_terms));
            Some(SearchHit { doc_id, score, path: view.path.clone(), start: view.start, end: view.end, preview })
        })
        .collect();

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, total_hits, took_s = elapsed.as_secs_f64(), "search");
    Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results })
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while !text.is_char_boundary(idx) { idx -= 1; }
    idx
}

/// Up to ~300 bytes around the first query term, with terms wrapped in `<em>`.
fn preview_text(text: &str, raw_terms: &[String]) -> String {
    let lower = text.to_lowercase();
    let first_idx = raw_terms
        .iter()
        .filter(|t| !t.trim().is_empty())
        .find_map(|t| lower.find(&t.to_lowercase()))
        .filter(|&idx| lower.len() == text.len() && idx < text.len());
    let snippet = match first_idx {
        Some(idx) => {
            let start = floor_boundary(text, idx.saturating_sub(100));
            let end = floor_boundary(text, (idx + 200).min(text.len()));
            &text[start..end]
        }
        None => &text[..floor_boundary(text, text.len().min(200))],
    };
    highlight_terms(snippet, raw_terms)
}

fn highlight_terms(snippet: &str, terms: &[String]) -> String {
    let mut s = snippet.to_string();
    for t in terms {
        if t.trim().is_empty() { continue; }
        let Ok(pat) = regex::RegexBuilder::new(&regex::escape(t)).case_insensitive(true).build() else { continue };
        s = pat.replace_all(&s, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0])).to_string();
    }
    s
}
