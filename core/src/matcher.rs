//! Aho-Corasick entity matcher over a [`Gazetteer`].
//!
//! The automaton works on lowercased chars. Each text char is folded on the fly and
//! remembers the byte span it came from, so reported offsets always index the
//! original text. Overlapping candidates are resolved leftmost-longest.

use crate::gazetteer::{Gazetteer, GazetteerEntry};

const ROOT: usize = 0;

#[derive(Debug, Default)]
struct State {
    /// Sorted by char.
    next: Vec<(char, usize)>,
    fail: usize,
    /// Pattern ending exactly here, with its length in folded chars.
    output: Option<(usize, usize)>,
    /// Nearest proper suffix state that has an output.
    dict: Option<usize>,
}

impl State {
    fn goto(&self, c: char) -> Option<usize> {
        self.next
            .binary_search_by_key(&c, |&(k, _)| k)
            .ok()
            .map(|i| self.next[i].1)
    }
}

/// One reported occurrence. `start..end` are byte offsets into the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMatch<'a> {
    pub start: usize,
    pub end: usize,
    /// The matched slice of the scanned text.
    pub surface_form: &'a str,
    pub entry: &'a GazetteerEntry,
}

/// Read-only after construction; share it across threads freely.
#[derive(Debug)]
pub struct EntityMatcher {
    gazetteer: Gazetteer,
    states: Vec<State>,
}

impl EntityMatcher {
    pub fn new(gazetteer: Gazetteer) -> Self {
        let mut states = vec![State::default()];
        for (pattern, entry) in gazetteer.entries().iter().enumerate() {
            let mut cur = ROOT;
            let mut len = 0;
            for c in fold(&entry.surface_form) {
                len += 1;
                cur = match states[cur].goto(c) {
                    Some(n) => n,
                    None => {
                        let n = states.len();
                        states.push(State::default());
                        let next = &mut states[cur].next;
                        let pos = next.partition_point(|&(k, _)| k < c);
                        next.insert(pos, (c, n));
                        n
                    }
                };
            }
            if len > 0 && states[cur].output.is_none() {
                states[cur].output = Some((pattern, len));
            }
        }
        build_failure_links(&mut states);
        tracing::info!(patterns = gazetteer.len(), states = states.len(), "built entity automaton");
        Self { gazetteer, states }
    }

    pub fn gazetteer(&self) -> &Gazetteer { &self.gazetteer }

    pub fn num_states(&self) -> usize { self.states.len() }

    /// All non-overlapping occurrences, leftmost first; at one start the longest wins.
    pub fn find<'a>(&'a self, text: &'a str) -> Vec<EntityMatch<'a>> {
        let mut candidates = self.scan(text);
        candidates.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut out = Vec::new();
        let mut covered_to = 0;
        for (start, end, pattern) in candidates {
            if start < covered_to {
                continue;
            }
            covered_to = end;
            out.push(EntityMatch {
                start,
                end,
                surface_form: &text[start..end],
                entry: &self.gazetteer.entries()[pattern],
            });
        }
        out
    }

    /// Every (start, end, pattern) occurrence, overlaps included.
    fn scan(&self, text: &str) -> Vec<(usize, usize, usize)> {
        // (folded char, byte start, byte end) of the source char
        let folded: Vec<(char, usize, usize)> = text
            .char_indices()
            .flat_map(|(i, ch)| ch.to_lowercase().map(move |lc| (lc, i, i + ch.len_utf8())))
            .collect();

        let mut hits = Vec::new();
        let mut state = ROOT;
        for (pos, &(c, _, end)) in folded.iter().enumerate() {
            state = self.step(state, c);
            let mut probe = if self.states[state].output.is_some() { Some(state) } else { self.states[state].dict };
            while let Some(s) = probe {
                if let Some((pattern, len)) = self.states[s].output {
                    let start = folded[pos + 1 - len].1;
                    hits.push((start, end, pattern));
                }
                probe = self.states[s].dict;
            }
        }
        hits
    }

    fn step(&self, mut state: usize, c: char) -> usize {
        loop {
            if let Some(n) = self.states[state].goto(c) {
                return n;
            }
            if state == ROOT {
                return ROOT;
            }
            state = self.states[state].fail;
        }
    }
}

fn fold(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_lowercase)
}

/// Breadth-first: a state's failure target is always shallower, so it is final
/// by the time its children are visited.
fn build_failure_links(states: &mut [State]) {
    let mut queue = std::collections::VecDeque::new();
    for &(_, child) in &states[ROOT].next {
        states[child].fail = ROOT;
        queue.push_back(child);
    }
    while let Some(u) = queue.pop_front() {
        let children = states[u].next.clone();
        for (c, v) in children {
            let mut f = states[u].fail;
            let target = loop {
                if let Some(n) = states[f].goto(c) {
                    break n;
                }
                if f == ROOT {
                    break ROOT;
                }
                f = states[f].fail;
            };
            states[v].fail = target;
            states[v].dict = if states[target].output.is_some() { Some(target) } else { states[target].dict };
            queue.push_back(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(entries: &[(&str, &str, &str)]) -> EntityMatcher {
        EntityMatcher::new(Gazetteer::from_entries(
            entries.iter().map(|(s, c, t)| GazetteerEntry::new(*s, *c, *t)),
        ))
    }

    fn spans(m: &EntityMatcher, text: &str) -> Vec<(usize, usize, String)> {
        m.find(text).into_iter().map(|x| (x.start, x.end, x.entry.canonical_entity.clone())).collect()
    }

    #[test]
    fn longest_match_at_same_start() {
        let m = matcher(&[("chicken breast", "Chicken", "ingredient"), ("chicken", "Chicken", "ingredient")]);
        let found = m.find("2 chicken breasts, diced");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].surface_form, "chicken breast");
        assert_eq!((found[0].start, found[0].end), (2, 16));
    }

    #[test]
    fn leftmost_wins_over_later_overlap() {
        let m = matcher(&[("olive oil", "Olive oil", "ingredient"), ("oil", "Oil", "ingredient"), ("live", "Live", "x")]);
        assert_eq!(spans(&m, "olive oil"), vec![(0, 9, "Olive oil".to_string())]);
    }

    #[test]
    fn failure_links_find_suffix_patterns() {
        let m = matcher(&[("he", "He", "x"), ("she", "She", "x"), ("hers", "Hers", "x")]);
        // "ushers": "she" at 1..4 wins over "he" at 2..4; "hers" at 2..6 overlaps "she"
        assert_eq!(spans(&m, "ushers"), vec![(1, 4, "She".to_string())]);
        assert_eq!(spans(&m, "xhers"), vec![(1, 5, "Hers".to_string())]);
    }

    #[test]
    fn case_insensitive_with_original_offsets() {
        let m = matcher(&[("crème fraîche", "Crème fraîche", "ingredient")]);
        let text = "Add CRÈME FRAÎCHE now";
        let found = m.find(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].surface_form, "CRÈME FRAÎCHE");
        assert_eq!(&text[found[0].start..found[0].end], "CRÈME FRAÎCHE");
    }

    #[test]
    fn every_occurrence_reported_once() {
        let m = matcher(&[("salt", "Salt", "ingredient")]);
        assert_eq!(m.find("salt, salt and more SALT").len(), 3);
        assert!(m.find("").is_empty());
    }

    #[test]
    fn empty_gazetteer_matches_nothing() {
        let m = EntityMatcher::new(Gazetteer::default());
        assert_eq!(m.num_states(), 1);
        assert!(m.find("anything").is_empty());
    }
}
