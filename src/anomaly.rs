//! Linguistic anomaly detection (LAD).
//!
//! A plausible translation should relate to the reference targets the way its
//! source relates to the reference sources. The detector ranks both reference
//! sides by character similarity and scores how closely the two rankings agree.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rapidfuzz::distance::indel;

use crate::corpus::Corpus;
use crate::error::{CoreError, CoreResult};

pub const DEFAULT_REFERENCE_SIZE: usize = 20;
pub const DEFAULT_SEED: u64 = 3407;

/// `2 * LCS / (|a| + |b|)` over chars, in `[0, 1]`.
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    indel::normalized_similarity(a.chars(), b.chars())
}

#[derive(Clone, Debug)]
pub struct LinguisticAnomalyDetector {
    source_refs: Vec<String>,
    target_refs: Vec<String>,
    scores: Vec<f64>,
}

impl LinguisticAnomalyDetector {
    pub fn new(source_refs: Vec<String>, target_refs: Vec<String>) -> CoreResult<Self> {
        if source_refs.len() != target_refs.len() {
            return Err(CoreError::ReferenceLengthMismatch {
                source_refs: source_refs.len(),
                target_refs: target_refs.len(),
            });
        }
        if source_refs.is_empty() {
            return Err(CoreError::EmptyCorpus);
        }
        Ok(Self {
            source_refs,
            target_refs,
            scores: Vec::new(),
        })
    }

    /// Draws `size` corpus pairs with replacement. The same seed over the same
    /// corpus always yields the same reference set.
    pub fn from_corpus_sample(corpus: &Corpus, size: usize, seed: u64) -> CoreResult<Self> {
        if corpus.is_empty() {
            return Err(CoreError::EmptyCorpus);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sources = Vec::with_capacity(size);
        let mut targets = Vec::with_capacity(size);
        for _ in 0..size.max(1) {
            let i = rng.gen_range(0..corpus.len());
            if let Some((s, t)) = corpus.pair(i) {
                sources.push(s.to_string());
                targets.push(t.to_string());
            }
        }
        Self::new(sources, targets)
    }

    #[must_use]
    pub fn reference_len(&self) -> usize {
        self.source_refs.len()
    }

    /// Reference positions ordered by descending similarity to `query`; equal
    /// scores keep their original order.
    #[must_use]
    pub fn rank_similar<S: AsRef<str>>(references: &[S], query: &str) -> Vec<usize> {
        let scores: Vec<f64> = references
            .iter()
            .map(|r| lcs_ratio(r.as_ref(), query))
            .collect();
        let mut order: Vec<usize> = (0..references.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }

    #[must_use]
    pub fn rank_similar_source(&self, query: &str) -> Vec<usize> {
        Self::rank_similar(&self.source_refs, query)
    }

    #[must_use]
    pub fn rank_similar_target(&self, query: &str) -> Vec<usize> {
        Self::rank_similar(&self.target_refs, query)
    }

    /// Agreement between the target-side ranking of `target_draft` and the
    /// source-side ranking of `source_baseline`, in `[0, 100]`. The score is
    /// appended to the history.
    pub fn detect(&mut self, target_draft: &str, source_baseline: &str) -> f64 {
        let target_rank = self.rank_similar_target(target_draft);
        let source_rank = self.rank_similar_source(source_baseline);
        // usize -> u64 widens on every supported target
        let score = indel::normalized_similarity(
            target_rank.iter().map(|&i| i as u64),
            source_rank.iter().map(|&i| i as u64),
        ) * 100.0;
        let score = score.clamp(0.0, 100.0);
        self.scores.push(score);
        score
    }

    #[must_use]
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    #[must_use]
    pub fn average_score(&self) -> Option<f64> {
        if self.scores.is_empty() {
            return None;
        }
        Some(self.scores.iter().sum::<f64>() / self.scores.len() as f64)
    }
}

impl fmt::Display for LinguisticAnomalyDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Average score: {:.2} over {} detections.",
            self.average_score().unwrap_or(0.0),
            self.scores.len()
        )
    }
}
