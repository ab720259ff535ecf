//! TF-IDF vector space over the corpus source lines.
//!
//! Terms are whitespace-separated words. Weights use raw term frequency and the
//! smoothed inverse document frequency `ln((1 + n) / (1 + df)) + 1`; every
//! vector is L2-normalized, so cosine similarity reduces to a dot product.

use std::collections::{BTreeSet, HashMap};

use crate::error::{CoreError, CoreResult};
use crate::textutil::words;

#[derive(Clone, Debug)]
pub struct SimilarityIndex {
    /// term -> dimension
    vocabulary: HashMap<String, usize>,
    idf: Vec<f32>,
    /// dimension -> (line, normalized weight)
    postings: Vec<Vec<(usize, f32)>>,
    line_terms: Vec<BTreeSet<String>>,
}

impl SimilarityIndex {
    pub fn build<S: AsRef<str>>(lines: &[S]) -> CoreResult<Self> {
        if lines.is_empty() {
            return Err(CoreError::EmptyCorpus);
        }
        let n = lines.len() as f32;

        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: Vec<usize> = Vec::new();
        let mut line_counts: Vec<HashMap<usize, f32>> = Vec::with_capacity(lines.len());
        let mut line_terms: Vec<BTreeSet<String>> = Vec::with_capacity(lines.len());

        for line in lines {
            let mut counts: HashMap<usize, f32> = HashMap::new();
            let mut terms: BTreeSet<String> = BTreeSet::new();
            for w in words(line.as_ref()) {
                let dim = match vocabulary.get(w) {
                    Some(&d) => d,
                    None => {
                        let d = vocabulary.len();
                        vocabulary.insert(w.to_string(), d);
                        doc_freq.push(0);
                        d
                    }
                };
                if terms.insert(w.to_string()) {
                    doc_freq[dim] += 1;
                }
                *counts.entry(dim).or_insert(0.0) += 1.0;
            }
            line_counts.push(counts);
            line_terms.push(terms);
        }

        let idf: Vec<f32> = doc_freq
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f32)).ln() + 1.0)
            .collect();

        let mut postings: Vec<Vec<(usize, f32)>> = vec![Vec::new(); vocabulary.len()];
        for (line_idx, counts) in line_counts.iter().enumerate() {
            let norm = counts
                .iter()
                .map(|(&dim, &tf)| (tf * idf[dim]).powi(2))
                .sum::<f32>()
                .sqrt();
            if norm == 0.0 {
                continue;
            }
            for (&dim, &tf) in counts {
                postings[dim].push((line_idx, tf * idf[dim] / norm));
            }
        }

        Ok(Self {
            vocabulary,
            idf,
            postings,
            line_terms,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.line_terms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.line_terms.is_empty()
    }

    #[must_use]
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Distinct words of source line `idx`.
    #[must_use]
    pub fn line_terms(&self, idx: usize) -> Option<&BTreeSet<String>> {
        self.line_terms.get(idx)
    }

    /// Cosine similarity of `query` against every indexed line.
    /// Unknown terms are ignored; a query made only of unknown terms yields all zeros.
    #[must_use]
    pub fn similarity(&self, query: &str) -> Vec<f32> {
        let mut scores = vec![0.0f32; self.len()];

        let mut counts: HashMap<usize, f32> = HashMap::new();
        for w in words(query) {
            if let Some(&dim) = self.vocabulary.get(w) {
                *counts.entry(dim).or_insert(0.0) += 1.0;
            }
        }
        let norm = counts
            .iter()
            .map(|(&dim, &tf)| (tf * self.idf[dim]).powi(2))
            .sum::<f32>()
            .sqrt();
        if norm == 0.0 {
            return scores;
        }

        for (&dim, &tf) in &counts {
            let q = tf * self.idf[dim] / norm;
            for &(line, weight) in &self.postings[dim] {
                scores[line] += q * weight;
            }
        }
        scores
    }

    /// Indices of the `k` best strictly positive scores, best first, ties by lowest index.
    #[must_use]
    pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
        let mut ranked: Vec<usize> = (0..scores.len()).filter(|&i| scores[i] > 0.0).collect();
        ranked.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });
        ranked.truncate(k.max(1));
        ranked
    }
}
