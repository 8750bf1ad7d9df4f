//! Error types for the recipe core.

use std::{io, path::PathBuf};

use thiserror::Error;

/// A malformed document or field that was skipped during ingestion.
///
/// Never fatal: the builder logs it and carries on with an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("skipped {field} of document {}: {reason}", .doc_id.as_deref().unwrap_or("<unknown>"))]
pub struct ParseSkip {
    /// External id of the document, when it could be read.
    pub doc_id: Option<String>,
    /// Field name, or `document` when the whole record was dropped.
    pub field: String,
    /// Human readable cause.
    pub reason: String,
}

impl ParseSkip {
    pub(crate) fn field(doc_id: &str, field: &str, reason: impl Into<String>) -> Self {
        Self { doc_id: Some(doc_id.to_owned()), field: field.to_owned(), reason: reason.into() }
    }

    pub(crate) fn document(doc_id: Option<String>, reason: impl Into<String>) -> Self {
        Self { doc_id, field: "document".to_owned(), reason: reason.into() }
    }
}

/// Persisting a freshly built index failed. The previous generation is untouched.
#[derive(Debug, Error)]
pub enum IndexBuildError {
    /// I/O error while writing a table or swapping the pointer.
    #[error("failed to write index at {path}: {source}")]
    Io {
        /// Path being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A table could not be encoded.
    #[error("failed to encode {table}: {message}")]
    Encode {
        /// Table name.
        table: &'static str,
        /// Encoder message.
        message: String,
    },
}

impl IndexBuildError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Loading a persisted index failed. Any index already in memory stays usable.
#[derive(Debug, Error)]
pub enum IndexLoadError {
    /// No generation has been published under this root.
    #[error("index not built at {0}")]
    NotBuilt(PathBuf),

    /// I/O error reading a table.
    #[error("failed to read index file {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The manifest was written by an incompatible schema.
    #[error("index schema version {found} is not supported (expected {expected})")]
    SchemaMismatch {
        /// Version found on disk.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },

    /// A table failed to decode or violates an index invariant.
    #[error("corrupt index table {table}: {message}")]
    Corrupt {
        /// Table name.
        table: &'static str,
        /// What was wrong.
        message: String,
    },
}

impl IndexLoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        Self::Corrupt { table, message: message.into() }
    }
}

/// A filter specification was rejected before any scoring happened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterSyntaxError {
    /// The filter text was not valid JSON.
    #[error("filter is not valid JSON: {0}")]
    InvalidJson(String),

    /// The filter was valid JSON but not an object.
    #[error("filter must be a JSON object")]
    NotAnObject,

    /// A key no filter understands.
    #[error("unknown filter key `{0}`")]
    UnknownKey(String),

    /// A recognised key carried a value of the wrong type.
    #[error("filter `{key}` expects {expected}")]
    WrongType {
        /// Offending key.
        key: String,
        /// Description of the accepted type.
        expected: &'static str,
    },
}

/// Reading a gazetteer file failed.
#[derive(Debug, Error)]
pub enum GazetteerError {
    /// I/O error.
    #[error("failed to read gazetteer {path}: {source}")]
    Io {
        /// Gazetteer path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The file has no header line.
    #[error("gazetteer {0} is empty")]
    Empty(PathBuf),
}

/// Reading upstream document files failed.
#[derive(Debug, Error)]
pub enum InputError {
    /// I/O error.
    #[error("failed to read input {path}: {source}")]
    Io {
        /// Input path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The input path does not exist.
    #[error("input path {0} does not exist")]
    Missing(PathBuf),
}

/// A query could not be run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    /// No index generation has been installed yet.
    #[error("index not built")]
    IndexNotBuilt,

    /// The filter text was rejected.
    #[error(transparent)]
    Filter(#[from] FilterSyntaxError),
}

/// A search configuration file could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the file.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The file is not valid JSON for the config schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}
