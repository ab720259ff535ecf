//! Iterative example selection.
//!
//! Each iteration queries the index with the words that are still unmatched,
//! keeps the best lines, and removes their vocabulary from the query. Pairs are
//! returned in retrieval order: earliest iteration first, and within one
//! iteration by descending similarity.

use std::collections::BTreeSet;

use crate::corpus::Corpus;
use crate::index::SimilarityIndex;
use crate::textutil::words;

/// Query state of one narrowing search. Never shared between calls.
pub(crate) struct Narrowing<'a> {
    index: &'a SimilarityIndex,
    remaining: BTreeSet<String>,
    width: usize,
}

pub(crate) struct NarrowingStep {
    pub selected: Vec<usize>,
    pub matched: BTreeSet<String>,
    pub removed: usize,
}

impl<'a> Narrowing<'a> {
    pub fn new(index: &'a SimilarityIndex, query: &str, width: usize) -> Self {
        Self {
            index,
            remaining: words(query).map(str::to_string).collect(),
            width: width.max(1),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_empty()
    }

    /// One narrowing iteration. `None` when no line shares a word with the
    /// remaining query.
    pub fn step(&mut self) -> Option<NarrowingStep> {
        let text = self
            .remaining
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        let scores = self.index.similarity(&text);
        let selected = SimilarityIndex::top_k(&scores, self.width);
        if selected.is_empty() {
            return None;
        }

        let mut matched: BTreeSet<String> = BTreeSet::new();
        for &idx in &selected {
            if let Some(terms) = self.index.line_terms(idx) {
                matched.extend(terms.iter().cloned());
            }
        }
        let before = self.remaining.len();
        self.remaining.retain(|w| !matched.contains(w));
        Some(NarrowingStep {
            selected,
            matched,
            removed: before - self.remaining.len(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetrievalOutcome {
    pub pairs: Vec<(String, String)>,
    pub indices: Vec<usize>,
    pub iterations: usize,
}

impl RetrievalOutcome {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[must_use]
    pub fn render(&self) -> String {
        render_examples(&self.pairs)
    }
}

pub struct ExampleRetriever<'a> {
    corpus: &'a Corpus,
    index: &'a SimilarityIndex,
    width: usize,
}

impl<'a> ExampleRetriever<'a> {
    /// `index` must have been built from `corpus.sources()`.
    pub fn new(corpus: &'a Corpus, index: &'a SimilarityIndex, width: usize) -> Self {
        Self {
            corpus,
            index,
            width: width.max(1),
        }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn retrieve(&self, query: &str, max_iterations: usize) -> RetrievalOutcome {
        let mut out = RetrievalOutcome::default();
        let mut search = Narrowing::new(self.index, query, self.width);

        while !search.is_exhausted() && out.iterations < max_iterations {
            let Some(step) = search.step() else {
                break;
            };
            out.iterations += 1;
            for idx in step.selected {
                if let Some((s, t)) = self.corpus.pair(idx) {
                    out.pairs.push((s.to_string(), t.to_string()));
                    out.indices.push(idx);
                }
            }
            tracing::debug!(
                iteration = out.iterations,
                removed = step.removed,
                "retrieval step"
            );
            if step.removed == 0 {
                break;
            }
        }
        out
    }
}

/// Alternating `source:` / `target:` lines, one pair after another.
#[must_use]
pub fn render_examples(pairs: &[(String, String)]) -> String {
    let mut out = String::new();
    for (s, t) in pairs {
        out.push_str("source: ");
        out.push_str(s);
        out.push_str("\ntarget: ");
        out.push_str(t);
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(pairs: &[(&str, &str)]) -> (Corpus, SimilarityIndex) {
        let corpus = Corpus::from_pairs(pairs).unwrap();
        let index = SimilarityIndex::build(corpus.sources()).unwrap();
        (corpus, index)
    }

    #[test]
    fn exact_line_is_retrieved_in_one_iteration() {
        let (corpus, index) = fixture(&[("a b", "x y"), ("c d", "z w")]);
        let out = ExampleRetriever::new(&corpus, &index, 1).retrieve("a b", 20);
        assert_eq!(out.pairs, vec![("a b".to_string(), "x y".to_string())]);
        assert_eq!(out.indices, vec![0]);
        assert_eq!(out.iterations, 1);
    }

    #[test]
    fn narrowing_covers_query_across_lines() {
        let (corpus, index) = fixture(&[
            ("er baute", "he built"),
            ("das haus", "the house"),
            ("die stadt", "the city"),
        ]);
        let out = ExampleRetriever::new(&corpus, &index, 1).retrieve("er baute das haus", 20);
        assert_eq!(out.iterations, 2);
        let mut got = out.indices.clone();
        got.sort_unstable();
        assert_eq!(got, vec![0, 1]);
    }

    #[test]
    fn wider_retrieval_takes_several_lines_per_iteration() {
        let (corpus, index) = fixture(&[("a b", "1"), ("a c", "2"), ("d", "3")]);
        let out = ExampleRetriever::new(&corpus, &index, 2).retrieve("a b c", 20);
        assert_eq!(out.iterations, 1);
        assert_eq!(out.indices, vec![0, 1]);
    }

    #[test]
    fn no_shared_vocabulary_returns_nothing() {
        let (corpus, index) = fixture(&[("a b", "x y"), ("c d", "z w")]);
        let out = ExampleRetriever::new(&corpus, &index, 1).retrieve("q r", 20);
        assert!(out.is_empty());
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn empty_query_takes_zero_iterations() {
        let (corpus, index) = fixture(&[("a b", "x y")]);
        let out = ExampleRetriever::new(&corpus, &index, 1).retrieve("   ", 20);
        assert!(out.is_empty());
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn iteration_budget_is_respected() {
        let (corpus, index) = fixture(&[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]);
        let out = ExampleRetriever::new(&corpus, &index, 1).retrieve("a b c d", 2);
        assert_eq!(out.iterations, 2);
        assert_eq!(out.pairs.len(), 2);

        let none = ExampleRetriever::new(&corpus, &index, 1).retrieve("a b c d", 0);
        assert_eq!(none.iterations, 0);
    }

    #[test]
    fn render_alternates_labels() {
        let pairs = vec![
            ("a b".to_string(), "x y".to_string()),
            ("c d".to_string(), "z w".to_string()),
        ];
        assert_eq!(
            render_examples(&pairs),
            "source: a b\ntarget: x y\nsource: c d\ntarget: z w"
        );
        assert_eq!(render_examples(&[]), "");
    }
}
