use crate::document::Document;
use crate::index::Field;
use crate::matcher::EntityMatcher;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Fields scanned for entity mentions.
pub const LINKED_FIELDS: [Field; 3] = [Field::Title, Field::Ingredients, Field::Instructions];

/// Exact gazetteer matches always carry this confidence.
pub const EXACT_MATCH_CONFIDENCE: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityLink {
    pub doc_id: String,
    pub field: Field,
    /// Byte offsets into the field text (multi-value fields joined by a space).
    pub start_offset: usize,
    pub end_offset: usize,
    pub surface_form: String,
    pub canonical_entity: String,
    pub entity_type: String,
    pub confidence: f32,
}

pub fn link_document(matcher: &EntityMatcher, doc: &Document) -> Vec<EntityLink> {
    let mut links = Vec::new();
    for field in LINKED_FIELDS {
        let text = doc.text(field);
        for m in matcher.find(&text) {
            links.push(EntityLink {
                doc_id: doc.id.clone(),
                field,
                start_offset: m.start,
                end_offset: m.end,
                surface_form: m.surface_form.to_owned(),
                canonical_entity: m.entry.canonical_entity.clone(),
                entity_type: m.entry.entity_type.clone(),
                confidence: EXACT_MATCH_CONFIDENCE,
            });
        }
    }
    links
}

/// Link every document in parallel. Output order follows `docs`.
pub fn link_all(matcher: &EntityMatcher, docs: &[Document]) -> Vec<Vec<EntityLink>> {
    let links: Vec<Vec<EntityLink>> = docs.par_iter().map(|d| link_document(matcher, d)).collect();
    let total: usize = links.iter().map(Vec::len).sum();
    let linked = links.iter().filter(|l| !l.is_empty()).count();
    tracing::info!(documents = docs.len(), linked, total, "entity linking complete");
    links
}

/// Text of the synthetic `entities` field: canonical names in link order.
pub fn entities_text(links: &[EntityLink]) -> String {
    links.iter().map(|l| l.canonical_entity.as_str()).collect::<Vec<_>>().join(" ")
}

/// One JSON object per line.
pub fn write_links_jsonl<'a, I>(path: &Path, links: I) -> io::Result<usize>
where
    I: IntoIterator<Item = &'a EntityLink>,
{
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    let mut n = 0;
    for link in links {
        serde_json::to_writer(&mut w, link)?;
        w.write_all(b"\n")?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gazetteer::{Gazetteer, GazetteerEntry};

    fn matcher() -> EntityMatcher {
        EntityMatcher::new(Gazetteer::from_entries([
            GazetteerEntry::new("garlic", "Garlic", "ingredient"),
            GazetteerEntry::new("roast", "Roasting", "technique"),
        ]))
    }

    #[test]
    fn links_each_field_with_offsets() {
        let doc = Document::new("r1", "Roast Garlic Chicken")
            .with_ingredients(["1 head garlic", "salt"])
            .with_instructions(["Roast the garlic."]);
        let links = link_document(&matcher(), &doc);
        let summary: Vec<_> = links
            .iter()
            .map(|l| (l.field, l.start_offset, l.end_offset, l.canonical_entity.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Field::Title, 0, 5, "Roasting"),
                (Field::Title, 6, 12, "Garlic"),
                (Field::Ingredients, 7, 13, "Garlic"),
                (Field::Instructions, 0, 5, "Roasting"),
                (Field::Instructions, 10, 16, "Garlic"),
            ]
        );
        assert!(links.iter().all(|l| l.confidence == 1.0 && l.doc_id == "r1"));
        assert_eq!(entities_text(&links[..2]), "Roasting Garlic");
    }

    #[test]
    fn link_all_preserves_order_and_serializes_camel_case() {
        let docs = vec![Document::new("a", "plain toast"), Document::new("b", "garlic bread")];
        let links = link_all(&matcher(), &docs);
        assert!(links[0].is_empty());
        assert_eq!(links[1].len(), 1);

        let json = serde_json::to_value(&links[1][0]).unwrap();
        assert_eq!(json["docId"], "b");
        assert_eq!(json["startOffset"], 0);
        assert_eq!(json["canonicalEntity"], "Garlic");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/links.jsonl");
        assert_eq!(write_links_jsonl(&path, links.iter().flatten()).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
