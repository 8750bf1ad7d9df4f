//! Relevance ranking over an [`Index`].
//!
//! Both scorers share one contract: every document with at least one query term in
//! any field is scored, documents with no overlap are left out, and the final
//! order is score descending with ties broken by ascending doc id.

mod bm25;
mod tfidf;

pub use bm25::Bm25;
pub use tfidf::TfIdf;

use crate::index::{DocId, Index, Posting};
use crate::tokenizer::{term_frequencies, tokenize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

/// A tokenized query: distinct terms with their in-query frequency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    terms: BTreeMap<String, u32>,
}

impl Query {
    pub fn parse(text: &str) -> Self {
        Self { terms: term_frequencies(tokenize(text)) }
    }

    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    pub fn terms(&self) -> impl Iterator<Item = (&str, u32)> {
        self.terms.iter().map(|(t, &n)| (t.as_str(), n))
    }
}

/// Pluggable relevance function.
pub trait Scorer: Send + Sync {
    /// Score every candidate, in no particular order.
    fn score_candidates(&self, index: &Index, query: &Query) -> Vec<ScoredDoc>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    #[serde(rename = "tfidf")]
    TfIdf,
    #[default]
    #[serde(rename = "bm25")]
    Bm25,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::TfIdf => "tfidf",
            Metric::Bm25 => "bm25",
        }
    }

    pub fn scorer(self, bm25: Bm25) -> Box<dyn Scorer> {
        match self {
            Metric::TfIdf => Box::new(TfIdf),
            Metric::Bm25 => Box::new(bm25),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tfidf" | "tf-idf" => Ok(Metric::TfIdf),
            "bm25" => Ok(Metric::Bm25),
            other => Err(format!("unknown metric `{other}` (expected tfidf or bm25)")),
        }
    }
}

/// Score all candidates and sort them. No truncation happens here.
pub fn score(index: &Index, query: &Query, scorer: &dyn Scorer) -> Vec<ScoredDoc> {
    let mut scored = scorer.score_candidates(index, query);
    sort_ranked(&mut scored);
    scored
}

pub fn sort_ranked(scored: &mut [ScoredDoc]) {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.doc_id.cmp(&b.doc_id)));
}

/// Split a doc-ordered postings list into per-document runs.
pub(crate) fn by_doc(postings: &[Posting]) -> impl Iterator<Item = (DocId, &[Posting])> {
    let mut rest = postings;
    std::iter::from_fn(move || {
        let first = rest.first()?;
        let len = rest.iter().take_while(|p| p.doc_id == first.doc_id).count();
        let (run, tail) = rest.split_at(len);
        rest = tail;
        Some((first.doc_id, run))
    })
}
