//! On-disk index layout.
//!
//! ```text
//! <root>/CURRENT                 name of the live generation
//! <root>/gen-000001/meta.json    manifest
//! <root>/gen-000001/terms.bin    Vec<TermRecord>, by term
//! <root>/gen-000001/postings.bin Vec<PostingRecord>, by (doc_id, field, term)
//! <root>/gen-000001/docmeta.bin  Vec<DocMeta>, by doc_id
//! ```
//!
//! A generation is written into a temp dir under the root and renamed into place;
//! `CURRENT` is then replaced by an atomic rename. Readers never see a half-written
//! generation and a failed save leaves the previous one live.

use crate::error::{IndexBuildError, IndexLoadError};
use crate::index::{DocId, DocMeta, Field, FieldWeights, Index, Posting, TermStats};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

pub const SCHEMA_VERSION: u32 = 2;

const CURRENT: &str = "CURRENT";
const GEN_PREFIX: &str = "gen-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub num_docs: u32,
    pub num_terms: u32,
    pub num_postings: u64,
    pub field_weights: FieldWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermRecord {
    pub term: String,
    pub df: u32,
    pub idf: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRecord {
    pub term: String,
    pub field: Field,
    pub doc_id: DocId,
    pub tf: u32,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn current(&self) -> PathBuf { self.root.join(CURRENT) }
    pub fn generation_dir(&self, generation: u64) -> PathBuf { self.root.join(generation_name(generation)) }
}

fn generation_name(generation: u64) -> String { format!("{GEN_PREFIX}{generation:06}") }
fn meta(dir: &Path) -> PathBuf { dir.join("meta.json") }
fn terms(dir: &Path) -> PathBuf { dir.join("terms.bin") }
fn postings(dir: &Path) -> PathBuf { dir.join("postings.bin") }
fn docs(dir: &Path) -> PathBuf { dir.join("docmeta.bin") }

/// Flatten an index into its three tables plus manifest, in canonical order.
pub fn to_tables(index: &Index) -> (MetaFile, Vec<TermRecord>, Vec<PostingRecord>, Vec<DocMeta>) {
    let term_records: Vec<TermRecord> = index
        .terms()
        .map(|(term, s)| TermRecord { term: term.to_owned(), df: s.df, idf: s.idf })
        .collect();
    let mut posting_records: Vec<PostingRecord> = index
        .postings_map()
        .iter()
        .flat_map(|(term, plist)| {
            plist.iter().map(move |p| PostingRecord { term: term.clone(), field: p.field, doc_id: p.doc_id, tf: p.tf })
        })
        .collect();
    posting_records.sort_by(|a, b| (a.doc_id, a.field, &a.term).cmp(&(b.doc_id, b.field, &b.term)));
    let meta = MetaFile {
        version: SCHEMA_VERSION,
        num_docs: index.num_docs(),
        num_terms: term_records.len() as u32,
        num_postings: posting_records.len() as u64,
        field_weights: *index.field_weights(),
    };
    (meta, term_records, posting_records, index.docs().to_vec())
}

/// Reassemble and validate an index from its tables.
pub fn from_tables(
    meta: MetaFile,
    term_records: Vec<TermRecord>,
    posting_records: Vec<PostingRecord>,
    doc_records: Vec<DocMeta>,
) -> Result<Index, IndexLoadError> {
    if meta.version != SCHEMA_VERSION {
        return Err(IndexLoadError::SchemaMismatch { found: meta.version, expected: SCHEMA_VERSION });
    }
    if doc_records.len() != meta.num_docs as usize {
        return Err(IndexLoadError::corrupt(
            "docmeta",
            format!("{} records, manifest says {}", doc_records.len(), meta.num_docs),
        ));
    }
    if let Some((i, d)) = doc_records.iter().enumerate().find(|(i, d)| d.doc_id as usize != *i) {
        return Err(IndexLoadError::corrupt("docmeta", format!("record {i} has doc id {}", d.doc_id)));
    }

    let mut terms: BTreeMap<String, TermStats> = BTreeMap::new();
    for r in term_records {
        if terms.insert(r.term.clone(), TermStats { df: r.df, idf: r.idf }).is_some() {
            return Err(IndexLoadError::corrupt("terms", format!("duplicate term `{}`", r.term)));
        }
    }

    let mut postings: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
    for r in posting_records {
        if !terms.contains_key(&r.term) {
            return Err(IndexLoadError::corrupt("postings", format!("term `{}` missing from terms", r.term)));
        }
        if r.doc_id >= meta.num_docs {
            return Err(IndexLoadError::corrupt("postings", format!("doc id {} out of range", r.doc_id)));
        }
        // records are ordered by doc_id then field, so each list stays sorted
        postings.entry(r.term).or_default().push(Posting { doc_id: r.doc_id, field: r.field, tf: r.tf });
    }
    for (term, plist) in &postings {
        if !plist.windows(2).all(|w| (w[0].doc_id, w[0].field) < (w[1].doc_id, w[1].field)) {
            return Err(IndexLoadError::corrupt("postings", format!("postings for `{term}` out of order")));
        }
    }

    Ok(Index::from_parts(terms, postings, doc_records, meta.field_weights))
}

/// Publish `index` as a new generation and return its number.
pub fn save_index(paths: &IndexPaths, index: &Index) -> Result<u64, IndexBuildError> {
    create_dir_all(&paths.root).map_err(|e| IndexBuildError::io(&paths.root, e))?;
    let previous = match read_current(paths) {
        Ok(g) => g,
        Err(e) => {
            tracing::warn!(error = %e, "unreadable CURRENT pointer, numbering after existing generations");
            None
        }
    };
    // never reuse the number of a generation directory that is still on disk
    let generation = previous.max(highest_generation_dir(paths)).map_or(1, |g| g + 1);

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&paths.root)
        .map_err(|e| IndexBuildError::io(&paths.root, e))?;
    let (meta_file, term_records, posting_records, doc_records) = to_tables(index);
    save_bincode(&terms(staging.path()), "terms", &term_records)?;
    save_bincode(&postings(staging.path()), "postings", &posting_records)?;
    save_bincode(&docs(staging.path()), "docmeta", &doc_records)?;
    save_meta(staging.path(), &meta_file)?;

    let target = paths.generation_dir(generation);
    if target.exists() {
        // leftover from a save that died before publishing
        fs::remove_dir_all(&target).map_err(|e| IndexBuildError::io(&target, e))?;
    }
    fs::rename(staging.path(), &target).map_err(|e| IndexBuildError::io(&target, e))?;
    drop(staging);

    let mut pointer = tempfile::NamedTempFile::new_in(&paths.root).map_err(|e| IndexBuildError::io(&paths.root, e))?;
    writeln!(pointer, "{}", generation_name(generation)).map_err(|e| IndexBuildError::io(paths.current(), e))?;
    pointer.as_file().sync_all().map_err(|e| IndexBuildError::io(paths.current(), e))?;
    pointer.persist(paths.current()).map_err(|e| IndexBuildError::io(paths.current(), e.error))?;

    tracing::info!(generation, root = %paths.root.display(), num_docs = meta_file.num_docs, "published index generation");
    prune_generations(paths, generation);
    Ok(generation)
}

/// Load the generation named by `CURRENT`.
pub fn load_index(paths: &IndexPaths) -> Result<Index, IndexLoadError> {
    let generation = read_current(paths)?.ok_or_else(|| IndexLoadError::NotBuilt(paths.root.clone()))?;
    let dir = paths.generation_dir(generation);
    let meta_file = load_meta(&dir)?;
    if meta_file.version != SCHEMA_VERSION {
        return Err(IndexLoadError::SchemaMismatch { found: meta_file.version, expected: SCHEMA_VERSION });
    }
    let term_records: Vec<TermRecord> = load_bincode(&terms(&dir), "terms")?;
    let posting_records: Vec<PostingRecord> = load_bincode(&postings(&dir), "postings")?;
    let doc_records: Vec<DocMeta> = load_bincode(&docs(&dir), "docmeta")?;
    let index = from_tables(meta_file, term_records, posting_records, doc_records)?;
    tracing::info!(generation, num_docs = index.num_docs(), num_terms = index.num_terms(), "loaded index");
    Ok(index)
}

pub fn load_meta(dir: &Path) -> Result<MetaFile, IndexLoadError> {
    let path = meta(dir);
    let mut buf = String::new();
    File::open(&path)
        .and_then(|mut f| f.read_to_string(&mut buf))
        .map_err(|e| IndexLoadError::io(&path, e))?;
    serde_json::from_str(&buf).map_err(|e| IndexLoadError::corrupt("meta", e.to_string()))
}

fn save_meta(dir: &Path, meta_file: &MetaFile) -> Result<(), IndexBuildError> {
    let path = meta(dir);
    let json = serde_json::to_string_pretty(meta_file)
        .map_err(|e| IndexBuildError::Encode { table: "meta", message: e.to_string() })?;
    let mut f = File::create(&path).map_err(|e| IndexBuildError::io(&path, e))?;
    f.write_all(json.as_bytes()).and_then(|_| f.sync_all()).map_err(|e| IndexBuildError::io(&path, e))
}

fn save_bincode<T: Serialize>(path: &Path, table: &'static str, value: &T) -> Result<(), IndexBuildError> {
    let f = File::create(path).map_err(|e| IndexBuildError::io(path, e))?;
    let mut w = BufWriter::new(f);
    bincode::serialize_into(&mut w, value).map_err(|e| IndexBuildError::Encode { table, message: e.to_string() })?;
    let f = w.into_inner().map_err(|e| IndexBuildError::io(path, e.into_error()))?;
    f.sync_all().map_err(|e| IndexBuildError::io(path, e))
}

fn load_bincode<T: DeserializeOwned>(path: &Path, table: &'static str) -> Result<T, IndexLoadError> {
    let f = File::open(path).map_err(|e| IndexLoadError::io(path, e))?;
    bincode::deserialize_from(BufReader::new(f)).map_err(|e| IndexLoadError::corrupt(table, e.to_string()))
}

/// Generation named by `CURRENT`; `Ok(None)` when nothing has been published yet.
pub fn read_current(paths: &IndexPaths) -> Result<Option<u64>, IndexLoadError> {
    let path = paths.current();
    let text = match fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IndexLoadError::io(&path, e)),
    };
    parse_generation(text.trim())
        .map(Some)
        .ok_or_else(|| IndexLoadError::corrupt("CURRENT", format!("bad generation name `{}`", text.trim())))
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(GEN_PREFIX)?.parse().ok()
}

fn highest_generation_dir(paths: &IndexPaths) -> Option<u64> {
    fs::read_dir(&paths.root)
        .ok()?
        .flatten()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|e| e.file_name().to_str().and_then(parse_generation))
        .max()
}

/// Keep the live generation and the one before it; in-flight loaders may still read it.
fn prune_generations(paths: &IndexPaths, live: u64) {
    let Ok(entries) = fs::read_dir(&paths.root) else { return };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(generation) = name.to_str().and_then(parse_generation) else { continue };
        if generation + 1 < live {
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                tracing::warn!(generation, error = %e, "could not prune old index generation");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::document::Document;

    fn sample() -> Index {
        build(
            vec![
                Document::new("a", "Chicken Pasta Bake").with_ingredients(["chicken", "penne"]),
                Document::new("b", "Chicken Soup"),
            ],
            FieldWeights::default(),
        )
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = sample();
        assert_eq!(save_index(&paths, &index).unwrap(), 1);
        assert_eq!(load_index(&paths).unwrap(), index);
    }

    #[test]
    fn missing_index_is_not_built() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_index(&IndexPaths::new(dir.path().join("nope"))).unwrap_err();
        assert!(matches!(err, IndexLoadError::NotBuilt(_)));
    }

    #[test]
    fn generations_advance_and_prune() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        for expected in 1..=3 {
            assert_eq!(save_index(&paths, &sample()).unwrap(), expected);
        }
        assert!(!paths.generation_dir(1).exists());
        assert!(paths.generation_dir(2).exists());
        assert!(paths.generation_dir(3).exists());
        assert_eq!(fs::read_to_string(dir.path().join(CURRENT)).unwrap().trim(), "gen-000003");
    }

    #[test]
    fn failed_save_leaves_previous_generation_live() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        let index = sample();
        save_index(&paths, &index).unwrap();
        // a plain file squatting on the next generation name cannot be replaced
        fs::write(paths.generation_dir(2), b"not a directory").unwrap();

        let err = save_index(&paths, &build(vec![Document::new("z", "Beef Stew")], FieldWeights::default()))
            .unwrap_err();
        assert!(matches!(err, IndexBuildError::Io { .. }));
        assert_eq!(fs::read_to_string(dir.path().join(CURRENT)).unwrap().trim(), "gen-000001");
        assert_eq!(load_index(&paths).unwrap(), index);
    }

    #[test]
    fn corrupt_pointer_does_not_reuse_generation_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        save_index(&paths, &sample()).unwrap();
        save_index(&paths, &sample()).unwrap();
        fs::write(dir.path().join(CURRENT), "garbage\n").unwrap();
        assert!(matches!(load_index(&paths), Err(IndexLoadError::Corrupt { table: "CURRENT", .. })));

        assert_eq!(save_index(&paths, &sample()).unwrap(), 3);
        assert!(paths.generation_dir(2).exists());
        assert_eq!(load_index(&paths).unwrap(), sample());
    }

    #[test]
    fn identical_builds_write_identical_bytes() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        save_index(&IndexPaths::new(a.path()), &sample()).unwrap();
        save_index(&IndexPaths::new(b.path()), &sample()).unwrap();
        for file in ["terms.bin", "postings.bin", "docmeta.bin", "meta.json"] {
            let x = fs::read(a.path().join("gen-000001").join(file)).unwrap();
            let y = fs::read(b.path().join("gen-000001").join(file)).unwrap();
            assert_eq!(x, y, "{file} differs");
        }
    }

    #[test]
    fn corrupt_table_is_rejected_and_schema_checked() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        save_index(&paths, &sample()).unwrap();
        fs::write(paths.generation_dir(1).join("postings.bin"), b"garbage").unwrap();
        assert!(matches!(load_index(&paths), Err(IndexLoadError::Corrupt { table: "postings", .. })));

        let (mut meta_file, t, p, d) = to_tables(&sample());
        meta_file.version = 99;
        assert!(matches!(from_tables(meta_file, t, p, d), Err(IndexLoadError::SchemaMismatch { found: 99, .. })));
    }

    #[test]
    fn dangling_posting_term_is_corrupt() {
        let (meta_file, mut t, p, d) = to_tables(&sample());
        t.retain(|r| r.term != "chicken");
        assert!(matches!(from_tables(meta_file, t, p, d), Err(IndexLoadError::Corrupt { table: "postings", .. })));
    }

    #[test]
    fn posting_table_is_ordered_by_doc_field_term() {
        let (_, _, p, _) = to_tables(&sample());
        assert!(p.windows(2).all(|w| (w[0].doc_id, w[0].field, &w[0].term) < (w[1].doc_id, w[1].field, &w[1].term)));
    }
}
