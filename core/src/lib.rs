//! Recipe retrieval core: document ingestion, a field-aware inverted index,
//! TF-IDF and BM25 ranking, facet filters and gazetteer entity linking.

pub mod builder;
pub mod config;
pub mod document;
pub mod error;
pub mod executor;
pub mod filter;
pub mod gazetteer;
pub mod index;
pub mod linker;
pub mod matcher;
pub mod persist;
pub mod rank;
pub mod tokenizer;

pub use builder::{build, IndexBuilder};
pub use config::SearchConfig;
pub use document::{Document, Facets, Nutrition};
pub use executor::{EmptyQueryResult, QueryExecutor, QueryRequest, SearchHit, SearchResults};
pub use filter::{Filter, FilterSpec};
pub use gazetteer::{Gazetteer, GazetteerEntry};
pub use index::{DocId, DocMeta, Field, FieldWeights, Index};
pub use linker::EntityLink;
pub use matcher::EntityMatcher;
pub use rank::{Metric, ScoredDoc};
