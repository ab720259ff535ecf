use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::tokenizer::Granularity;

pub const DEFAULT_CONFIG_FILENAME: &str = "metapattern.toml";
pub const CONFIG_ENV: &str = "METAPATTERN_CONFIG";

/// On-disk configuration. Every section and field is optional; defaults are
/// applied when the pipeline config is resolved.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub corpus: CorpusSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub rank: RankSection,
    #[serde(default)]
    pub anomaly: AnomalySection,
    #[serde(default)]
    pub tokenizer: TokenizerSection,
    #[serde(default)]
    pub completion: CompletionSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CorpusSection {
    /// Directory holding the three corpus files. Relative to the config file.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub target_file: Option<String>,
    #[serde(default)]
    pub prompts_file: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RetrievalSection {
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub max_iterations: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RankSection {
    #[serde(default)]
    pub width: Option<usize>,
    #[serde(default)]
    pub max_rank: Option<u64>,
    /// Multiply the iteration count by the repeated vocabulary size when the
    /// narrowing loop stops making progress.
    #[serde(default)]
    pub stall_penalty: Option<bool>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AnomalySection {
    #[serde(default)]
    pub reference_size: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TokenizerSection {
    /// "word" or "char".
    #[serde(default)]
    pub granularity: Option<Granularity>,
    #[serde(default)]
    pub unknown_placeholder: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CompletionSection {
    /// "anthropic" or "openai".
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub initial_backoff_ms: Option<u64>,
    #[serde(default)]
    pub max_backoff_ms: Option<u64>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub backends: HashMap<String, BackendSection>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BackendSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct OutputSection {
    #[serde(default)]
    pub records_file: Option<String>,
    #[serde(default)]
    pub ranked_prompts_file: Option<String>,
    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}
