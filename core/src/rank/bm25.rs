use super::{Query, ScoredDoc, Scorer};
use crate::index::{DocId, Index};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Okapi BM25 with per-field length normalization and field weights.
///
/// Each distinct query term contributes once per field it occurs in; the query's
/// own term frequency is not used. IDF is the index's `ln(N/df)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25 {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25 {
    fn default() -> Self { Self { k1: 1.2, b: 0.75 } }
}

impl Bm25 {
    /// Saturated term frequency `tf*(k1+1) / (tf + k1*(1 - b + b*len/avg))`.
    pub fn saturation(&self, tf: f64, field_len: f64, avg_field_len: f64) -> f64 {
        let rel_len = if avg_field_len > 0.0 { field_len / avg_field_len } else { 1.0 };
        let norm = 1.0 - self.b + self.b * rel_len;
        tf * (self.k1 + 1.0) / (tf + self.k1 * norm)
    }
}

impl Scorer for Bm25 {
    fn score_candidates(&self, index: &Index, query: &Query) -> Vec<ScoredDoc> {
        let weights = index.field_weights();
        let mut acc: HashMap<DocId, f64> = HashMap::new();

        for (term, _) in query.terms() {
            let Some(stats) = index.term(term) else { continue };
            for p in index.postings(term) {
                let Some(doc) = index.doc(p.doc_id) else { continue };
                let field_len = f64::from(doc.field_lengths.get(p.field));
                let sat = self.saturation(f64::from(p.tf), field_len, index.avg_field_len(p.field));
                *acc.entry(p.doc_id).or_insert(0.0) += stats.idf * sat * weights.get(p.field);
            }
        }

        acc.into_iter().map(|(doc_id, score)| ScoredDoc { doc_id, score }).collect()
    }

    fn name(&self) -> &'static str { "bm25" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::document::Document;
    use crate::index::FieldWeights;
    use crate::rank::score;

    #[test]
    fn saturation_is_increasing_and_concave() {
        let bm = Bm25::default();
        let f = |tf: f64| bm.saturation(tf, 20.0, 10.0);
        let mut prev_gain = f64::INFINITY;
        for tf in 1..15 {
            let gain = f(f64::from(tf) + 1.0) - f(f64::from(tf));
            assert!(gain > 0.0);
            assert!(gain < prev_gain);
            prev_gain = gain;
        }
        assert!(f(1000.0) < bm.k1 + 1.0);
    }

    #[test]
    fn shorter_field_scores_higher_at_equal_tf() {
        let index = build(
            vec![
                Document::new("a", "tomato"),
                Document::new("b", "tomato basil mozzarella salad"),
                Document::new("c", "bread"),
            ],
            FieldWeights::default(),
        );
        let ranked = score(&index, &Query::parse("tomato"), &Bm25::default());
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].doc_id, 0);
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn field_weight_scales_contribution() {
        let docs = vec![
            Document::new("a", "rice"),
            Document::new("b", "other").with_ingredients(["rice"]),
            Document::new("c", "bread"),
        ];
        let index = build(docs, FieldWeights::default());
        let ranked = score(&index, &Query::parse("rice"), &Bm25::default());
        let title_hit = ranked.iter().find(|s| s.doc_id == 0).unwrap().score;
        let ingredient_hit = ranked.iter().find(|s| s.doc_id == 1).unwrap().score;
        assert!(title_hit > ingredient_hit);
    }
}
