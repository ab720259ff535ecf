use std::path::Path;

use anyhow::Context;
use encoding_rs::UTF_8;

use crate::error::{CoreError, CoreResult};
use crate::textutil::normalize_line;

/// Index-aligned parallel corpus. Read-only once built.
#[derive(Clone, Debug)]
pub struct Corpus {
    sources: Vec<String>,
    targets: Vec<String>,
}

impl Corpus {
    pub fn new(sources: Vec<String>, targets: Vec<String>) -> CoreResult<Self> {
        if sources.len() != targets.len() {
            return Err(CoreError::CorpusLengthMismatch {
                source_lines: sources.len(),
                target_lines: targets.len(),
            });
        }
        if sources.is_empty() {
            return Err(CoreError::EmptyCorpus);
        }
        Ok(Self { sources, targets })
    }

    /// Convenience constructor from borrowed pairs, lines used as given.
    pub fn from_pairs<S: AsRef<str>, T: AsRef<str>>(pairs: &[(S, T)]) -> CoreResult<Self> {
        let (sources, targets): (Vec<String>, Vec<String>) = pairs
            .iter()
            .map(|(s, t)| (s.as_ref().to_string(), t.as_ref().to_string()))
            .unzip();
        Self::new(sources, targets)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    #[must_use]
    pub fn pair(&self, idx: usize) -> Option<(&str, &str)> {
        Some((self.sources.get(idx)?.as_str(), self.targets.get(idx)?.as_str()))
    }

    #[must_use]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    #[must_use]
    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

#[derive(Clone, Debug)]
pub struct CorpusFiles<'a> {
    pub source: &'a str,
    pub target: &'a str,
    pub prompts: &'a str,
}

impl Default for CorpusFiles<'_> {
    fn default() -> Self {
        Self {
            source: "source.txt",
            target: "target.txt",
            prompts: "prompts.txt",
        }
    }
}

/// Corpus plus the normalized prompt lines that drive a batch.
#[derive(Clone, Debug)]
pub struct LoadedData {
    pub corpus: Corpus,
    pub prompts: Vec<String>,
}

pub fn load_data_dir(dir: &Path, files: &CorpusFiles<'_>) -> anyhow::Result<LoadedData> {
    let sources = read_normalized_lines(&dir.join(files.source))?;
    let targets = read_normalized_lines(&dir.join(files.target))?;
    let prompts = read_normalized_lines(&dir.join(files.prompts))?;
    let corpus = Corpus::new(sources, targets)
        .with_context(|| format!("build corpus from {}", dir.display()))?;
    Ok(LoadedData { corpus, prompts })
}

pub fn read_normalized_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let bytes = std::fs::read(path).with_context(|| format!("read corpus file: {}", path.display()))?;
    Ok(decode_lines(&bytes).iter().map(|l| normalize_line(l)).collect())
}

fn decode_lines(bytes: &[u8]) -> Vec<String> {
    let (text, _) = UTF_8.decode_with_bom_removal(bytes);
    text.lines().map(|l| l.to_string()).collect()
}
