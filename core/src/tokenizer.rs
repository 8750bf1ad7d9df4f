use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"\p{Alphabetic}+").expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","also","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","don","down","during",
            "each","either","else","ever","every",
            "few","for","from","further",
            "get","got","had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "if","in","into","is","it","its","itself","just",
            "let","ll","me","may","might","more","most","much","must","my","myself",
            "no","nor","not","now","of","off","on","once","only","or","other","ought","our","ours","ourselves","out","over","own",
            "re","same","shall","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","upon","us",
            "ve","very","was","we","were","what","when","where","which","while","who","whom","why","will","with","within","without","would",
            "yet","you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Minimum length (in chars) of a kept term.
pub const MIN_TERM_LEN: usize = 2;

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Tokenize text into normalized terms: NFKC, lowercase, maximal alphabetic runs,
/// stopwords and single-letter runs dropped. No stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = text.nfkc().collect::<String>().to_lowercase();
    RE.find_iter(&normalized)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN && !is_stopword(t))
        .map(str::to_owned)
        .collect()
}

/// Term frequencies of a token sequence, ordered by term.
pub fn term_frequencies<I, S>(tokens: I) -> BTreeMap<String, u32>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tf = BTreeMap::new();
    for t in tokens {
        *tf.entry(t.into()).or_insert(0) += 1;
    }
    tf
}
