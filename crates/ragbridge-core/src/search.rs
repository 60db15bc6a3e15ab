//! Document ranking shared by every [`SearchIndex`](crate::store::SearchIndex)
//! backend.
//!
//! Storage implementations gather candidate documents (applying whatever
//! filtering they can push down) and hand them to [`rank`], so the in-memory
//! and SQLite backends order results identically.
//!
//! # Scoring
//!
//! - **Vector** (query embedding present): a document scores the best
//!   cosine similarity over its content parts. Documents that have not been
//!   embedded yet are skipped.
//! - **Keyword** (no embedding): the fraction of distinct query terms that
//!   occur in the body, case-insensitive.
//!
//! Non-positive scores are dropped. Ties break on document id so paging is
//! stable.

use crate::embedding::best_match;
use crate::models::{Document, SearchConfig, SearchFilters, SearchHit, SearchResults};

/// Maximum characters of body text carried on a keyword hit.
const KEYWORD_SNIPPET_CHARS: usize = 1000;

/// Whether `doc` passes the optional filters.
pub fn matches_filters(doc: &Document, filters: &SearchFilters) -> bool {
    if let Some(ref ds) = filters.datasource_id {
        if doc.source.as_ref().map(|s| &s.datasource_id) != Some(ds) {
            return false;
        }
    }
    if let Some(ref st) = filters.source_type {
        if doc.source.as_ref().map(|s| &s.source_type) != Some(st) {
            return false;
        }
    }
    true
}

/// Rank `docs` against `config` and return the requested page.
pub fn rank<'a, I>(docs: I, config: &SearchConfig) -> SearchResults
where
    I: IntoIterator<Item = &'a Document>,
{
    let terms = query_terms(&config.query_text);

    let mut hits: Vec<SearchHit> = docs
        .into_iter()
        .filter(|doc| matches_filters(doc, &config.filters))
        .filter_map(|doc| match config.embedding.as_deref() {
            Some(query_vec) => vector_hit(doc, query_vec),
            None => keyword_hit(doc, &terms),
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });

    let total = hits.len() as u64;
    let limit = config.limit.max(1) as usize;
    let offset = (config.page.max(1) as usize - 1) * limit;
    let hits = hits.into_iter().skip(offset).take(limit).collect();

    SearchResults { hits, total }
}

fn vector_hit(doc: &Document, query_vec: &[f32]) -> Option<SearchHit> {
    let (part, score) = best_match(query_vec, &doc.embedding.parts)?;
    if score <= 0.0 {
        return None;
    }
    Some(SearchHit {
        document_id: doc.id.clone(),
        title: doc.title.clone(),
        source: doc.source.clone(),
        text: part.text.clone(),
        score: score as f64,
    })
}

fn keyword_hit(doc: &Document, terms: &[String]) -> Option<SearchHit> {
    if terms.is_empty() {
        return None;
    }
    let body = doc.body.to_lowercase();
    let matched = terms.iter().filter(|t| body.contains(t.as_str())).count();
    if matched == 0 {
        return None;
    }
    Some(SearchHit {
        document_id: doc.id.clone(),
        title: doc.title.clone(),
        source: doc.source.clone(),
        text: doc.body.chars().take(KEYWORD_SNIPPET_CHARS).collect(),
        score: matched as f64 / terms.len() as f64,
    })
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}
