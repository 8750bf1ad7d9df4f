use proptest::prelude::*;
use recipe_core::tokenizer::{is_stopword, tokenize, MIN_TERM_LEN};

#[test]
fn it_normalizes_without_stemming() {
    let words = tokenize("Roasted PEPPERS, 2 cups! Crème Fraîche");
    assert_eq!(words, vec!["roasted", "peppers", "cups", "crème", "fraîche"]);
}

#[test]
fn it_filters_stopwords() {
    let words = tokenize("The quick brown fox and the lazy dog");
    assert!(!words.iter().any(|w| w == "the" || w == "and"));
    assert_eq!(words.len(), 5);
}

#[test]
fn compatibility_forms_fold() {
    // fullwidth letters and the "ﬁ" ligature normalize under NFKC
    assert_eq!(tokenize("ＳＯＵＰ ﬁsh"), vec!["soup", "fish"]);
}

proptest! {
    #[test]
    fn idempotent_on_normalized_text(text in "[a-zA-Z0-9 .,;!'-]{0,120}") {
        let once = tokenize(&text);
        let twice = tokenize(&once.join(" "));
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn output_is_clean(text in "\\PC{0,80}") {
        for t in tokenize(&text) {
            prop_assert!(t.chars().count() >= MIN_TERM_LEN);
            prop_assert!(!is_stopword(&t));
            prop_assert!(t.chars().all(char::is_alphabetic));
        }
    }
}
