//! Tunables shared by the indexer and the server.

use crate::error::ConfigError;
use crate::executor::{QueryExecutor, DEFAULT_MAX_TOP_K, DEFAULT_TOP_K};
use crate::index::{Field, FieldWeights};
use crate::rank::Bm25;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every key is optional; missing keys take their defaults.
///
/// ```json
/// { "field_weights": { "title": 3.0 }, "bm25": { "k1": 1.5 }, "default_top_k": 20 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    pub field_weights: FieldWeights,
    pub bm25: Bm25,
    pub default_top_k: usize,
    pub max_top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            field_weights: FieldWeights::default(),
            bm25: Bm25::default(),
            default_top_k: DEFAULT_TOP_K,
            max_top_k: DEFAULT_MAX_TOP_K,
        }
    }
}

impl SearchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), ?config, "loaded search config");
        Ok(config)
    }

    /// `None` means defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        path.map_or_else(|| Ok(Self::default()), Self::load)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for field in Field::ALL {
            let w = self.field_weights.get(field);
            if !w.is_finite() || w < 0.0 {
                return Err(ConfigError::Invalid(format!("field weight for {field} must be a non-negative number, got {w}")));
            }
        }
        if !self.bm25.k1.is_finite() || self.bm25.k1 < 0.0 {
            return Err(ConfigError::Invalid(format!("bm25.k1 must be non-negative, got {}", self.bm25.k1)));
        }
        if !(0.0..=1.0).contains(&self.bm25.b) {
            return Err(ConfigError::Invalid(format!("bm25.b must lie in [0, 1], got {}", self.bm25.b)));
        }
        if self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(ConfigError::Invalid(format!(
                "need 0 < default_top_k <= max_top_k, got {} and {}",
                self.default_top_k, self.max_top_k
            )));
        }
        Ok(())
    }

    /// An empty executor tuned by this config.
    pub fn executor(&self) -> QueryExecutor {
        QueryExecutor::default().with_bm25(self.bm25).with_max_top_k(self.max_top_k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let f = write(r#"{"field_weights": {"title": 5.0}, "bm25": {"k1": 1.5}}"#);
        let config = SearchConfig::load(f.path()).unwrap();
        assert_eq!(config.field_weights.title, 5.0);
        assert_eq!(config.field_weights.ingredients, 2.0);
        assert_eq!(config.bm25, Bm25 { k1: 1.5, b: 0.75 });
        assert_eq!(config.default_top_k, 10);
    }

    #[test]
    fn rejects_bad_values() {
        let f = write(r#"{"field_weights": {"title": -1.0}}"#);
        assert!(matches!(SearchConfig::load(f.path()), Err(ConfigError::Invalid(_))));
        let f = write(r#"{"bm25": {"b": 2.0}}"#);
        assert!(matches!(SearchConfig::load(f.path()), Err(ConfigError::Invalid(_))));
        let f = write(r#"{"default_top_k": 0}"#);
        assert!(matches!(SearchConfig::load(f.path()), Err(ConfigError::Invalid(_))));
        let f = write(r#"{"default_top_k": 20, "max_top_k": 10}"#);
        assert!(matches!(SearchConfig::load(f.path()), Err(ConfigError::Invalid(_))));
        let f = write(r#"{"unknown": 1}"#);
        assert!(matches!(SearchConfig::load(f.path()), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            SearchConfig::load(Path::new("/definitely/not/here.json")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn missing_path_means_defaults() {
        assert_eq!(SearchConfig::load_or_default(None).unwrap(), SearchConfig::default());
    }
}
