use crate::document::{Document, Facets};
use crate::linker::EntityLink;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type DocId = u32;

/// A searchable field. `Entities` holds the canonical names of linked entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Ingredients,
    Instructions,
    Entities,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Title, Field::Ingredients, Field::Instructions, Field::Entities];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Ingredients => "ingredients",
            Field::Instructions => "instructions",
            Field::Entities => "entities",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| format!("unknown field `{s}`"))
    }
}

/// One value per field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerField<T> {
    pub title: T,
    pub ingredients: T,
    pub instructions: T,
    pub entities: T,
}

impl<T: Copy> PerField<T> {
    pub fn get(&self, field: Field) -> T {
        match field {
            Field::Title => self.title,
            Field::Ingredients => self.ingredients,
            Field::Instructions => self.instructions,
            Field::Entities => self.entities,
        }
    }

    pub fn get_mut(&mut self, field: Field) -> &mut T {
        match field {
            Field::Title => &mut self.title,
            Field::Ingredients => &mut self.ingredients,
            Field::Instructions => &mut self.instructions,
            Field::Entities => &mut self.entities,
        }
    }
}

/// Per-field score multipliers, fixed when the index is built.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub title: f64,
    pub ingredients: f64,
    pub instructions: f64,
    pub entities: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self { title: 3.0, ingredients: 2.0, instructions: 1.0, entities: 1.0 }
    }
}

impl FieldWeights {
    pub fn get(&self, field: Field) -> f64 {
        match field {
            Field::Title => self.title,
            Field::Ingredients => self.ingredients,
            Field::Instructions => self.instructions,
            Field::Entities => self.entities,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TermStats {
    pub df: u32,
    pub idf: f64,
}

/// Occurrence of a term in one field of one document. The term itself is the map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub field: Field,
    pub tf: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    pub doc_id: DocId,
    pub external_id: String,
    pub url: Option<String>,
    pub title: String,
    pub description: String,
    pub instructions: Vec<String>,
    /// Token count per field, for BM25 length normalization.
    pub field_lengths: PerField<u32>,
    pub facets: Facets,
    #[serde(default)]
    pub entities: Vec<EntityLink>,
}

impl DocMeta {
    /// Display and filter data of `doc`; field lengths and entity links start empty.
    pub fn from_document(doc_id: DocId, doc: &Document) -> Self {
        Self {
            doc_id,
            external_id: doc.id.clone(),
            url: doc.url.clone(),
            title: doc.title.clone(),
            description: doc.description.clone(),
            instructions: doc.instructions.clone(),
            field_lengths: PerField::default(),
            facets: doc.facets.clone(),
            entities: Vec::new(),
        }
    }
}

/// `ln(N/df)`. Zero when the term occurs in every document.
pub fn idf(num_docs: u32, df: u32) -> f64 {
    (f64::from(num_docs) / f64::from(df.max(1))).ln()
}

/// Immutable field-aware inverted index. Only the builder and the loader create one.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    terms: BTreeMap<String, TermStats>,
    postings: BTreeMap<String, Vec<Posting>>, // sorted by (doc_id, field)
    docs: Vec<DocMeta>,                       // position == doc_id
    avg_field_len: PerField<f64>,
    field_weights: FieldWeights,
}

impl Index {
    pub(crate) fn from_parts(
        terms: BTreeMap<String, TermStats>,
        postings: BTreeMap<String, Vec<Posting>>,
        docs: Vec<DocMeta>,
        field_weights: FieldWeights,
    ) -> Self {
        let avg_field_len = average_field_lengths(&docs);
        Self { terms, postings, docs, avg_field_len, field_weights }
    }

    pub fn num_docs(&self) -> u32 { self.docs.len() as u32 }

    pub fn num_terms(&self) -> usize { self.terms.len() }

    pub fn num_postings(&self) -> usize { self.postings.values().map(Vec::len).sum() }

    pub fn term(&self, term: &str) -> Option<&TermStats> { self.terms.get(term) }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &TermStats)> {
        self.terms.iter().map(|(t, s)| (t.as_str(), s))
    }

    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn postings_map(&self) -> &BTreeMap<String, Vec<Posting>> { &self.postings }

    pub fn doc(&self, doc_id: DocId) -> Option<&DocMeta> { self.docs.get(doc_id as usize) }

    pub fn docs(&self) -> &[DocMeta] { &self.docs }

    /// Documents are ordered by external id, so this is a binary search.
    pub fn doc_by_external_id(&self, external_id: &str) -> Option<&DocMeta> {
        self.docs
            .binary_search_by(|d| d.external_id.as_str().cmp(external_id))
            .ok()
            .map(|i| &self.docs[i])
    }

    pub fn avg_field_len(&self, field: Field) -> f64 { self.avg_field_len.get(field) }

    pub fn field_weights(&self) -> &FieldWeights { &self.field_weights }
}

fn average_field_lengths(docs: &[DocMeta]) -> PerField<f64> {
    let mut avg = PerField::<f64>::default();
    if docs.is_empty() {
        return avg;
    }
    for field in Field::ALL {
        let total: u64 = docs.iter().map(|d| u64::from(d.field_lengths.get(field))).sum();
        *avg.get_mut(field) = total as f64 / docs.len() as f64;
    }
    avg
}
