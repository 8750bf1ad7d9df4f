use crate::document::Document;
use crate::index::{idf, DocId, DocMeta, Field, FieldWeights, Index, PerField, Posting, TermStats};
use crate::linker::{entities_text, link_all, EntityLink};
use crate::matcher::EntityMatcher;
use crate::tokenizer::{term_frequencies, tokenize};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Build an index sequentially with no entity folding.
pub fn build(documents: Vec<Document>, field_weights: FieldWeights) -> Index {
    IndexBuilder::new(field_weights).build(documents)
}

/// One-pass index construction.
///
/// Documents are sorted by external id and numbered densely before any work is
/// split, so a sharded build merges back into exactly the sequential result.
pub struct IndexBuilder<'m> {
    field_weights: FieldWeights,
    matcher: Option<&'m EntityMatcher>,
    workers: usize,
}

#[derive(Default)]
struct Shard {
    postings: BTreeMap<String, Vec<Posting>>,
    df: BTreeMap<String, u32>,
    docs: Vec<DocMeta>,
}

impl<'m> IndexBuilder<'m> {
    pub fn new(field_weights: FieldWeights) -> Self {
        Self { field_weights, matcher: None, workers: 1 }
    }

    /// Link entities while building: links go into `DocMeta` and canonical names
    /// are indexed as the `entities` field.
    pub fn with_entity_matcher(mut self, matcher: &'m EntityMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn build(&self, documents: Vec<Document>) -> Index {
        let docs = dedupe_sorted(documents);
        let links = match self.matcher {
            Some(m) => link_all(m, &docs),
            None => vec![Vec::new(); docs.len()],
        };
        let units: Vec<(Document, Vec<EntityLink>)> = docs.into_iter().zip(links).collect();

        let shards = if self.workers <= 1 || units.len() < 2 {
            vec![build_shard(0, &units)]
        } else {
            self.build_sharded(&units)
        };

        let mut merged = Shard::default();
        for shard in shards {
            for (term, mut plist) in shard.postings {
                merged.postings.entry(term).or_default().append(&mut plist);
            }
            for (term, df) in shard.df {
                *merged.df.entry(term).or_insert(0) += df;
            }
            merged.docs.extend(shard.docs);
        }

        let n = merged.docs.len() as u32;
        let terms: BTreeMap<String, TermStats> = merged
            .df
            .into_iter()
            .map(|(term, df)| (term, TermStats { df, idf: idf(n, df) }))
            .collect();
        let index = Index::from_parts(terms, merged.postings, merged.docs, self.field_weights);
        tracing::info!(
            num_docs = index.num_docs(),
            num_terms = index.num_terms(),
            num_postings = index.num_postings(),
            workers = self.workers,
            "index built"
        );
        index
    }

    fn build_sharded(&self, units: &[(Document, Vec<EntityLink>)]) -> Vec<Shard> {
        let chunk = units.len().div_ceil(self.workers);
        let run = || {
            units
                .par_chunks(chunk)
                .enumerate()
                .map(|(i, c)| build_shard((i * chunk) as DocId, c))
                .collect::<Vec<_>>()
        };
        match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                tracing::warn!(error = %e, "could not start build pool, using global pool");
                run()
            }
        }
    }
}

/// Sort by external id; on duplicates the first document in input order wins.
fn dedupe_sorted(documents: Vec<Document>) -> Vec<Document> {
    let mut numbered: Vec<(usize, Document)> = documents.into_iter().enumerate().collect();
    numbered.sort_by(|a, b| a.1.id.cmp(&b.1.id).then(a.0.cmp(&b.0)));
    let mut out: Vec<Document> = Vec::with_capacity(numbered.len());
    for (_, doc) in numbered {
        if out.last().is_some_and(|prev| prev.id == doc.id) {
            tracing::warn!(doc_id = %doc.id, "duplicate document id, keeping first occurrence");
            continue;
        }
        out.push(doc);
    }
    out
}

fn build_shard(first_id: DocId, units: &[(Document, Vec<EntityLink>)]) -> Shard {
    let mut shard = Shard::default();
    for (offset, (doc, links)) in units.iter().enumerate() {
        let doc_id = first_id + offset as DocId;
        let mut field_lengths = PerField::<u32>::default();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for field in Field::ALL {
            let text = match field {
                Field::Entities => entities_text(links),
                _ => doc.text(field).into_owned(),
            };
            let tokens = tokenize(&text);
            *field_lengths.get_mut(field) = tokens.len() as u32;
            for (term, tf) in term_frequencies(tokens) {
                shard.postings.entry(term.clone()).or_default().push(Posting { doc_id, field, tf });
                seen.insert(term);
            }
        }
        for term in seen {
            *shard.df.entry(term).or_insert(0) += 1;
        }
        if field_lengths.title + field_lengths.ingredients + field_lengths.instructions == 0 {
            tracing::debug!(doc_id = %doc.id, "document has no indexable text");
        }
        shard.docs.push(DocMeta { field_lengths, entities: links.clone(), ..DocMeta::from_document(doc_id, doc) });
    }
    shard
}
