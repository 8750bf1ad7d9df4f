//! Query execution against the live index generation.

use crate::document::Facets;
use crate::error::{FilterSyntaxError, SearchError};
use crate::filter::FilterSpec;
use crate::index::{DocId, Index};
use crate::linker::EntityLink;
use crate::rank::{self, Bm25, Metric, Query};
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_MAX_TOP_K: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub metric: Metric,
    pub top_k: usize,
    pub offset: usize,
    pub filters: FilterSpec,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), metric: Metric::default(), top_k: DEFAULT_TOP_K, offset: 0, filters: FilterSpec::default() }
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn filters(mut self, filters: FilterSpec) -> Self {
        self.filters = filters;
        self
    }

    /// Parse a JSON filter object and AND it onto the current filters.
    pub fn filter_json(mut self, text: &str) -> Result<Self, FilterSyntaxError> {
        let extra: FilterSpec = text.parse()?;
        self.filters = self.filters.and(extra);
        Ok(self)
    }
}

/// Why a result page is empty. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyQueryResult {
    /// Nothing was left of the query after normalization; no scoring ran.
    BlankQuery,
    /// Scoring and filtering left no documents.
    NoMatches,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub external_id: String,
    pub score: f64,
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub url: Option<String>,
    /// Title with query terms wrapped in `<em>`.
    pub snippet: String,
    pub facets: Facets,
    pub entities: Vec<EntityLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub metric: Metric,
    pub hits: Vec<SearchHit>,
    /// Matches after filtering, before pagination.
    pub total_hits: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty: Option<EmptyQueryResult>,
}

impl SearchResults {
    fn empty(metric: Metric, why: EmptyQueryResult) -> Self {
        Self { metric, hits: Vec::new(), total_hits: 0, empty: Some(why) }
    }
}

/// Owns the current index generation.
///
/// Queries clone the `Arc` and then run without holding the lock, so a
/// [`swap`](Self::swap) never waits on in-flight searches and those searches
/// finish against the generation they started with.
pub struct QueryExecutor {
    index: RwLock<Option<Arc<Index>>>,
    bm25: Bm25,
    max_top_k: usize,
}

impl Default for QueryExecutor {
    fn default() -> Self {
        Self { index: RwLock::new(None), bm25: Bm25::default(), max_top_k: DEFAULT_MAX_TOP_K }
    }
}

impl QueryExecutor {
    pub fn new(index: Index) -> Self {
        let executor = Self::default();
        executor.swap(index);
        executor
    }

    pub fn with_bm25(mut self, bm25: Bm25) -> Self {
        self.bm25 = bm25;
        self
    }

    pub fn with_max_top_k(mut self, max_top_k: usize) -> Self {
        self.max_top_k = max_top_k.max(1);
        self
    }

    /// Install a new generation and hand back the previous one.
    pub fn swap(&self, index: Index) -> Option<Arc<Index>> {
        let next = Arc::new(index);
        tracing::info!(num_docs = next.num_docs(), num_terms = next.num_terms(), "installing index generation");
        self.index.write().replace(next)
    }

    pub fn snapshot(&self) -> Option<Arc<Index>> {
        self.index.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.index.read().is_some()
    }

    pub fn execute(&self, request: &QueryRequest) -> Result<SearchResults, SearchError> {
        let index = self.snapshot().ok_or(SearchError::IndexNotBuilt)?;
        let query = Query::parse(&request.query);
        if query.is_empty() {
            tracing::debug!(query = %request.query, "blank query after normalization");
            return Ok(SearchResults::empty(request.metric, EmptyQueryResult::BlankQuery));
        }

        let scorer = request.metric.scorer(self.bm25);
        let ranked = rank::score(&index, &query, scorer.as_ref());
        let candidates = ranked.len();
        let ranked = request.filters.apply(ranked, &index);
        let total_hits = ranked.len();
        tracing::debug!(
            query = %request.query,
            metric = scorer.name(),
            candidates,
            total_hits,
            "query scored"
        );
        if total_hits == 0 {
            return Ok(SearchResults::empty(request.metric, EmptyQueryResult::NoMatches));
        }

        let highlighter = highlighter(&query);
        let top_k = request.top_k.min(self.max_top_k);
        let hits = ranked
            .into_iter()
            .skip(request.offset)
            .take(top_k)
            .filter_map(|s| {
                let meta = index.doc(s.doc_id)?;
                Some(SearchHit {
                    doc_id: s.doc_id,
                    external_id: meta.external_id.clone(),
                    score: s.score,
                    title: meta.title.clone(),
                    description: meta.description.clone(),
                    url: meta.url.clone(),
                    snippet: highlight(highlighter.as_ref(), &meta.title),
                    facets: meta.facets.clone(),
                    entities: meta.entities.clone(),
                })
            })
            .collect();
        Ok(SearchResults { metric: request.metric, hits, total_hits, empty: None })
    }
}

/// Matches any query term as a whole word, case-insensitively.
fn highlighter(query: &Query) -> Option<Regex> {
    let alternation = query.terms().map(|(t, _)| regex::escape(t)).collect::<Vec<_>>().join("|");
    match RegexBuilder::new(&format!(r"\b(?:{alternation})\b")).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "could not build highlighter");
            None
        }
    }
}

fn highlight(re: Option<&Regex>, text: &str) -> String {
    match re {
        Some(re) => re.replace_all(text, "<em>$0</em>").into_owned(),
        None => text.to_owned(),
    }
}
