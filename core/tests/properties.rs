use proptest::prelude::*;
use recipe_core::executor::{QueryExecutor, QueryRequest};
use recipe_core::filter::{Filter, FilterSpec, NumericFacet};
use recipe_core::index::idf;
use recipe_core::rank::{score, Bm25, Query, ScoredDoc, TfIdf};
use recipe_core::{build, Document, EntityMatcher, Facets, FieldWeights, Gazetteer, GazetteerEntry, IndexBuilder};

const VOCAB: &[&str] = &[
    "chicken", "beef", "tofu", "pasta", "rice", "soup", "stew", "salad", "garlic", "onion", "basil", "lemon",
];

fn doc_strategy() -> impl Strategy<Value = (Vec<usize>, Vec<usize>, u8)> {
    (
        prop::collection::vec(0..VOCAB.len(), 0..5),
        prop::collection::vec(0..VOCAB.len(), 0..8),
        0u8..120,
    )
}

fn to_docs(raw: &[(Vec<usize>, Vec<usize>, u8)]) -> Vec<Document> {
    raw.iter()
        .enumerate()
        .map(|(i, (title, ingredients, minutes))| {
            let words = |ix: &[usize]| ix.iter().map(|&w| VOCAB[w]).collect::<Vec<_>>();
            Document::new(format!("doc{i:03}"), words(title.as_slice()).join(" "))
                .with_ingredients(words(ingredients.as_slice()))
                .with_facets(Facets {
                    total_minutes: Some(f64::from(*minutes)),
                    rating: Some(f64::from(minutes % 5)),
                    ..Facets::default()
                })
        })
        .collect()
}

#[test]
fn idf_decreases_with_df() {
    for n in [2u32, 10, 1000] {
        for df in 1..n {
            assert!(idf(n, df) > idf(n, df + 1));
            assert!(idf(n, df) > 0.0);
        }
        assert_eq!(idf(n, n), 0.0);
    }
}

#[test]
fn bm25_concave_in_tf() {
    let bm25 = Bm25::default();
    let s: Vec<f64> = (0..12).map(|tf| bm25.saturation(f64::from(tf), 10.0, 8.0)).collect();
    for w in s.windows(3) {
        assert!(w[1] > w[0]);
        assert!(w[2] - w[1] < w[1] - w[0]);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tfidf_within_unit_interval(raw in prop::collection::vec(doc_strategy(), 1..25), q in prop::collection::vec(0..VOCAB.len(), 1..4)) {
        let index = build(to_docs(&raw), FieldWeights::default());
        let query = Query::parse(&q.iter().map(|&w| VOCAB[w]).collect::<Vec<_>>().join(" "));
        for s in score(&index, &query, &TfIdf) {
            prop_assert!((0.0..=1.0).contains(&s.score), "score {} out of range", s.score);
        }
    }

    #[test]
    fn build_ignores_input_order_and_workers(
        raw in prop::collection::vec(doc_strategy(), 1..30),
        workers in 1usize..6,
        q in prop::collection::vec(0..VOCAB.len(), 1..3),
    ) {
        let matcher = EntityMatcher::new(Gazetteer::from_entries([
            GazetteerEntry::new("garlic", "Garlic", "ingredient"),
            GazetteerEntry::new("chicken soup", "Chicken soup", "dish"),
        ]));
        let docs = to_docs(&raw);
        let mut shuffled = docs.clone();
        shuffled.reverse();

        let a = IndexBuilder::new(FieldWeights::default()).with_entity_matcher(&matcher).build(docs);
        let b = IndexBuilder::new(FieldWeights::default()).with_entity_matcher(&matcher).workers(workers).build(shuffled);
        prop_assert_eq!(&a, &b);

        let query = q.iter().map(|&w| VOCAB[w]).collect::<Vec<_>>().join(" ");
        let request = QueryRequest::new(query).top_k(5);
        prop_assert_eq!(QueryExecutor::new(a).execute(&request), QueryExecutor::new(b).execute(&request));
    }

    #[test]
    fn filters_compose(
        raw in prop::collection::vec(doc_strategy(), 1..30),
        max_minutes in 0u8..120,
        min_rating in 0u8..5,
    ) {
        let index = build(to_docs(&raw), FieldWeights::default());
        let ranked: Vec<ScoredDoc> = (0..index.num_docs()).map(|d| ScoredDoc { doc_id: d, score: 1.0 / f64::from(d + 1) }).collect();
        let f1 = FilterSpec::new().with(Filter::max(NumericFacet::TotalMinutes, f64::from(max_minutes)));
        let f2 = FilterSpec::new().with(Filter::min(NumericFacet::Rating, f64::from(min_rating)));
        let stepwise = f2.apply(f1.apply(ranked.clone(), &index), &index);
        let combined = f1.and(f2).apply(ranked, &index);
        prop_assert_eq!(stepwise, combined);
    }

    #[test]
    fn matcher_reports_each_occurrence_once(words in prop::collection::vec(prop::sample::select(vec!["salt", "pepper", "black pepper", "oil", "water"]), 0..20)) {
        let matcher = EntityMatcher::new(Gazetteer::from_entries([
            GazetteerEntry::new("black pepper", "Black pepper", "ingredient"),
            GazetteerEntry::new("pepper", "Pepper", "ingredient"),
            GazetteerEntry::new("salt", "Salt", "ingredient"),
        ]));
        let text = words.join(", ");
        let found = matcher.find(&text);
        let expected = words.iter().filter(|w| matches!(**w, "salt" | "pepper" | "black pepper")).count();
        prop_assert_eq!(found.len(), expected);
        for pair in found.windows(2) {
            prop_assert!(pair[0].end <= pair[1].start);
        }
        for m in &found {
            prop_assert_eq!(&text[m.start..m.end], m.surface_form);
        }
    }
}
