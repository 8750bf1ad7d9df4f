//! Surface form -> canonical knowledge-base entity table.

use crate::error::GazetteerError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GazetteerEntry {
    pub surface_form: String,
    pub canonical_entity: String,
    pub entity_type: String,
}

impl GazetteerEntry {
    pub fn new(surface_form: impl Into<String>, canonical_entity: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            surface_form: surface_form.into(),
            canonical_entity: canonical_entity.into(),
            entity_type: entity_type.into(),
        }
    }
}

/// Immutable once built. Surface forms are unique ignoring case; the first entry wins.
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    entries: Vec<GazetteerEntry>,
    by_surface: HashMap<String, usize>,
}

impl Gazetteer {
    pub fn from_entries<I: IntoIterator<Item = GazetteerEntry>>(entries: I) -> Self {
        let mut gazetteer = Self::default();
        for mut entry in entries {
            entry.surface_form = entry.surface_form.trim().to_owned();
            if entry.surface_form.is_empty() {
                continue;
            }
            let key = entry.surface_form.to_lowercase();
            if gazetteer.by_surface.contains_key(&key) {
                tracing::debug!(surface = %entry.surface_form, "duplicate surface form ignored");
                continue;
            }
            gazetteer.by_surface.insert(key, gazetteer.entries.len());
            gazetteer.entries.push(entry);
        }
        gazetteer
    }

    /// Load a TSV file: one header line, then `surface \t canonical \t type [\t ...]`.
    pub fn load_tsv(path: &Path) -> Result<Self, GazetteerError> {
        let io_err = |source| GazetteerError::Io { path: path.to_path_buf(), source };
        let reader = BufReader::new(File::open(path).map_err(io_err)?);
        let mut lines = reader.lines();
        match lines.next() {
            Some(header) => { header.map_err(io_err)?; }
            None => return Err(GazetteerError::Empty(path.to_path_buf())),
        }

        let mut entries = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() { continue; }
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 3 || parts[0].trim().is_empty() {
                tracing::warn!(line = i + 2, path = %path.display(), "invalid gazetteer line");
                continue;
            }
            entries.push(GazetteerEntry::new(parts[0], parts[1].trim(), parts[2].trim()));
        }
        let gazetteer = Self::from_entries(entries);
        tracing::info!(entries = gazetteer.len(), path = %path.display(), "loaded gazetteer");
        Ok(gazetteer)
    }

    pub fn entries(&self) -> &[GazetteerEntry] { &self.entries }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    #[cfg(test)]
    fn lookup(&self, surface_form: &str) -> Option<&GazetteerEntry> {
        self.by_surface
            .get(&surface_form.trim().to_lowercase())
            .map(|&i| &self.entries[i])
    }
}
