use super::{by_doc, Query, ScoredDoc, Scorer};
use crate::index::{DocId, Index};
use std::collections::HashMap;

/// Cosine similarity between the query vector (`qtf * idf`) and the document
/// vector (`sum over fields of tf * idf * field weight`), per term.
///
/// Norms are taken sparsely: the query over its in-vocabulary terms, each
/// document over the terms it shares with the query. Scores lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TfIdf;

#[derive(Default)]
struct Acc {
    dot: f64,
    norm_sq: f64,
}

impl Scorer for TfIdf {
    fn score_candidates(&self, index: &Index, query: &Query) -> Vec<ScoredDoc> {
        let weights = index.field_weights();
        let mut query_norm_sq = 0.0;
        let mut acc: HashMap<DocId, Acc> = HashMap::new();

        for (term, qtf) in query.terms() {
            let Some(stats) = index.term(term) else { continue };
            let q_w = f64::from(qtf) * stats.idf;
            query_norm_sq += q_w * q_w;
            for (doc_id, run) in by_doc(index.postings(term)) {
                let d_w: f64 = run
                    .iter()
                    .map(|p| f64::from(p.tf) * stats.idf * weights.get(p.field))
                    .sum();
                let a = acc.entry(doc_id).or_default();
                a.dot += q_w * d_w;
                a.norm_sq += d_w * d_w;
            }
        }

        let query_norm = query_norm_sq.sqrt();
        acc.into_iter()
            .map(|(doc_id, a)| {
                let denom = query_norm * a.norm_sq.sqrt();
                let score = if denom > 0.0 { (a.dot / denom).clamp(0.0, 1.0) } else { 0.0 };
                ScoredDoc { doc_id, score }
            })
            .collect()
    }

    fn name(&self) -> &'static str { "tfidf" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::document::Document;
    use crate::index::FieldWeights;
    use crate::rank::score;

    #[test]
    fn full_overlap_scores_one() {
        let index = build(
            vec![Document::new("a", "chicken pasta bake"), Document::new("b", "chicken soup"), Document::new("c", "stew")],
            FieldWeights::default(),
        );
        let ranked = score(&index, &Query::parse("chicken pasta"), &TfIdf);
        assert!((ranked[0].score - 1.0).abs() < 1e-9);
        // b shares only "chicken": qidf_c / |q|
        let idf_c = (1.5f64).ln();
        let idf_p = (3.0f64).ln();
        let expected = idf_c / (idf_c * idf_c + idf_p * idf_p).sqrt();
        assert!((ranked[1].score - expected).abs() < 1e-9);
    }

    #[test]
    fn term_in_every_document_scores_zero_not_nan() {
        let index = build(vec![Document::new("a", "salt"), Document::new("b", "salt pepper")], FieldWeights::default());
        let ranked = score(&index, &Query::parse("salt"), &TfIdf);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|s| s.score == 0.0));
    }

    #[test]
    fn unknown_terms_match_nothing() {
        let index = build(vec![Document::new("a", "salt")], FieldWeights::default());
        assert!(score(&index, &Query::parse("saffron"), &TfIdf).is_empty());
    }
}
