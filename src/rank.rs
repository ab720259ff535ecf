//! Difficulty ("rank") estimation.
//!
//! Runs the retrieval narrowing loop without collecting pairs and reports how
//! many iterations it took to cover the query. Higher ranks mean the corpus
//! covers the query poorly, so translations of it deserve less trust.

use std::collections::BTreeSet;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::index::SimilarityIndex;
use crate::retrieval::Narrowing;

pub const DEFAULT_MAX_RANK: u64 = 100;

#[derive(Clone, Debug)]
pub struct DifficultyEstimator<'a> {
    index: &'a SimilarityIndex,
    width: usize,
    stall_penalty: bool,
}

impl<'a> DifficultyEstimator<'a> {
    pub fn new(index: &'a SimilarityIndex, width: usize) -> Self {
        Self {
            index,
            width: width.max(1),
            stall_penalty: true,
        }
    }

    /// When the loop stalls, multiply the iteration count by the size of the
    /// repeated vocabulary instead of reporting the count as is.
    #[must_use]
    pub fn with_stall_penalty(mut self, enabled: bool) -> Self {
        self.stall_penalty = enabled;
        self
    }

    #[must_use]
    pub fn estimate_rank(&self, query: &str, max_rank: u64) -> u64 {
        let mut search = Narrowing::new(self.index, query, self.width);
        let mut counter = RankCounter::new(max_rank, self.stall_penalty);
        while !search.is_exhausted() && !counter.is_done() {
            let Some(step) = search.step() else {
                // words the corpus never covers: the loop cannot move on
                counter.observe_unresolved();
                break;
            };
            counter.observe(step.matched);
        }
        counter.rank()
    }

    /// Ranks every prompt, keeping each prompt's own position.
    #[must_use]
    pub fn rank_prompts<S: AsRef<str>>(&self, prompts: &[S], max_rank: u64) -> Vec<RankedPrompt> {
        prompts
            .iter()
            .enumerate()
            .map(|(index, p)| RankedPrompt {
                index,
                prompt: p.as_ref().to_string(),
                rank: self.estimate_rank(p.as_ref(), max_rank),
            })
            .collect()
    }
}

/// Iteration bookkeeping for [`DifficultyEstimator::estimate_rank`].
#[derive(Debug)]
struct RankCounter {
    max_rank: u64,
    stall_penalty: bool,
    iterations: u64,
    previous: Option<BTreeSet<String>>,
    stalled: Option<u64>,
}

impl RankCounter {
    fn new(max_rank: u64, stall_penalty: bool) -> Self {
        Self {
            max_rank,
            stall_penalty,
            iterations: 0,
            previous: None,
            stalled: None,
        }
    }

    fn is_done(&self) -> bool {
        self.stalled.is_some() || self.iterations >= self.max_rank
    }

    fn observe(&mut self, matched: BTreeSet<String>) {
        if self.previous.as_ref() == Some(&matched) {
            let rank = if self.stall_penalty {
                self.iterations * matched.len() as u64
            } else {
                self.iterations
            };
            tracing::debug!(iterations = self.iterations, rank, "rank loop stalled");
            self.stalled = Some(rank);
            return;
        }
        self.previous = Some(matched);
        self.iterations += 1;
    }

    /// A step that selects no line resolves to the previous vocabulary, which
    /// counts as a stall. Before the first iteration nothing is recorded.
    fn observe_unresolved(&mut self) {
        if let Some(previous) = self.previous.clone() {
            self.observe(previous);
        }
    }

    fn rank(&self) -> u64 {
        self.stalled.unwrap_or(self.iterations.min(self.max_rank))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedPrompt {
    pub index: usize,
    pub prompt: String,
    pub rank: u64,
}

/// Ascending rank, ties by original position.
pub fn sort_easiest_first(items: &mut [RankedPrompt]) {
    items.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.index.cmp(&b.index)));
}

pub fn write_ranked_prompts(path: &Path, items: &[RankedPrompt]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
    }
    let mut f = std::fs::File::create(path)
        .with_context(|| format!("create ranked prompts: {}", path.display()))?;
    for item in items {
        let line = serde_json::to_string(item).context("serialize ranked prompt")?;
        writeln!(f, "{line}").with_context(|| format!("write: {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index(lines: &[&str]) -> SimilarityIndex {
        SimilarityIndex::build(lines).unwrap()
    }

    fn set(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn identical_line_has_rank_one() {
        let idx = index(&["a b", "c d"]);
        assert_eq!(DifficultyEstimator::new(&idx, 1).estimate_rank("a b", 100), 1);
    }

    #[test]
    fn unrelated_query_has_rank_zero() {
        let idx = index(&["a b", "c d"]);
        let est = DifficultyEstimator::new(&idx, 1);
        assert_eq!(est.estimate_rank("q r", 100), 0);
        assert_eq!(est.estimate_rank("", 100), 0);
    }

    #[test]
    fn rank_counts_narrowing_iterations() {
        let idx = index(&["a", "b", "c", "d"]);
        let est = DifficultyEstimator::new(&idx, 1);
        assert_eq!(est.estimate_rank("a b c", 100), 3);
        // capped
        assert_eq!(est.estimate_rank("a b c d", 2), 2);
        // wider estimator needs fewer iterations
        assert_eq!(DifficultyEstimator::new(&idx, 2).estimate_rank("a b c", 100), 2);
    }

    #[test]
    fn uncovered_words_stall_the_loop() {
        let idx = index(&["a b", "c d"]);
        let penalized = DifficultyEstimator::new(&idx, 1);
        let plain = DifficultyEstimator::new(&idx, 1).with_stall_penalty(false);

        // one iteration, then "zzz" repeats the vocabulary {a, b}
        assert_eq!(penalized.estimate_rank("a b zzz", 100), 2);
        assert_eq!(plain.estimate_rank("a b zzz", 100), 1);

        assert_eq!(penalized.estimate_rank("c zzz yyy", 100), 2);
        assert_eq!(plain.estimate_rank("c zzz yyy", 100), 1);

        // nothing matched at all: no vocabulary to repeat
        assert_eq!(penalized.estimate_rank("zzz", 100), 0);
        // fully covered queries never stall
        assert_eq!(penalized.estimate_rank("a b", 100), 1);
    }

    #[test]
    fn stalled_loop_multiplies_by_vocabulary() {
        let mut c = RankCounter::new(100, true);
        c.observe(set(&["a"]));
        c.observe(set(&["x", "y", "z"]));
        c.observe(set(&["x", "y", "z"]));
        assert!(c.is_done());
        assert_eq!(c.rank(), 6);

        let mut plain = RankCounter::new(100, false);
        plain.observe(set(&["x", "y", "z"]));
        plain.observe(set(&["x", "y", "z"]));
        assert_eq!(plain.rank(), 1);

        let mut unresolved = RankCounter::new(100, true);
        unresolved.observe_unresolved();
        assert!(!unresolved.is_done());
        unresolved.observe(set(&["p", "q"]));
        unresolved.observe_unresolved();
        assert!(unresolved.is_done());
        assert_eq!(unresolved.rank(), 2);
    }

    #[test]
    fn ranked_prompts_keep_positions_for_duplicates() {
        let idx = index(&["a", "b", "c"]);
        let est = DifficultyEstimator::new(&idx, 1);
        let mut ranked = est.rank_prompts(&["a b c", "a", "a"], 100);
        assert_eq!(
            ranked.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        sort_easiest_first(&mut ranked);
        assert_eq!(
            ranked.iter().map(|r| (r.index, r.rank)).collect::<Vec<_>>(),
            vec![(1, 1), (2, 1), (0, 3)]
        );
    }

    #[test]
    fn ranked_prompts_are_written_as_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("ranked_prompts.jsonl");
        let items = vec![RankedPrompt {
            index: 0,
            prompt: "a b".into(),
            rank: 1,
        }];
        write_ranked_prompts(&path, &items).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "{\"index\":0,\"prompt\":\"a b\",\"rank\":1}\n");
    }
}
