use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context};

use crate::anomaly::{DEFAULT_REFERENCE_SIZE, DEFAULT_SEED};
use crate::completion::{BackendSettings, Provider, RetryPolicy};
use crate::config::{
    find_default_config, load_config, AppConfig, BackendSection, CONFIG_ENV,
    DEFAULT_CONFIG_FILENAME,
};
use crate::corpus::CorpusFiles;
use crate::pipeline::prompts::{default_prompt_files, PromptSet, DEFAULT_PROMPTS_DIR};
use crate::rank::DEFAULT_MAX_RANK;
use crate::tokenizer::{Granularity, DEFAULT_UNKNOWN_PLACEHOLDER};

/// Everything a run needs, with file values, CLI overrides and defaults merged.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub workdir: PathBuf,
    pub config_path: PathBuf,

    pub data_dir: PathBuf,
    pub source_file: String,
    pub target_file: String,
    pub prompts_file: String,

    pub retrieval_width: usize,
    pub max_iterations: usize,

    pub rank_width: usize,
    pub max_rank: u64,
    pub stall_penalty: bool,

    pub reference_size: usize,
    pub seed: u64,

    pub granularity: Granularity,
    pub unknown_placeholder: String,

    pub backend: BackendSettings,
    pub retry: RetryPolicy,

    pub records_path: PathBuf,
    pub ranked_prompts_path: PathBuf,
    pub trace_dir: PathBuf,
    pub trace_prompts: bool,

    pub prompts: PromptSet,
}

impl PipelineConfig {
    pub fn from_args(
        config_path: Option<PathBuf>,
        data_dir: Option<PathBuf>,
        provider: Option<String>,
    ) -> anyhow::Result<Self> {
        let workdir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let cfg_file = config_path
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
            .or_else(|| find_default_config(&workdir, DEFAULT_CONFIG_FILENAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| workdir.join(DEFAULT_CONFIG_FILENAME));
        Self::resolve(workdir, cfg_path, file_cfg, data_dir, provider)
    }

    /// Merges an already parsed config file with CLI overrides.
    pub fn resolve(
        workdir: PathBuf,
        cfg_path: PathBuf,
        file_cfg: AppConfig,
        data_dir: Option<PathBuf>,
        provider: Option<String>,
    ) -> anyhow::Result<Self> {
        let config_dir = cfg_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| workdir.clone());

        let data_dir = match data_dir {
            Some(d) if d.is_relative() => workdir.join(d),
            Some(d) => d,
            None => {
                let d = file_cfg
                    .corpus
                    .data_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("."));
                if d.is_relative() {
                    config_dir.join(d)
                } else {
                    d
                }
            }
        };
        let defaults = CorpusFiles::default();
        let source_file = non_empty(file_cfg.corpus.source_file.clone())
            .unwrap_or_else(|| defaults.source.to_string());
        let target_file = non_empty(file_cfg.corpus.target_file.clone())
            .unwrap_or_else(|| defaults.target.to_string());
        let prompts_file = non_empty(file_cfg.corpus.prompts_file.clone())
            .unwrap_or_else(|| defaults.prompts.to_string());

        let retrieval_width = file_cfg.retrieval.width.unwrap_or(1).max(1);
        let max_iterations = file_cfg.retrieval.max_iterations.unwrap_or(20);
        let rank_width = file_cfg.rank.width.unwrap_or(1).max(1);
        let max_rank = file_cfg.rank.max_rank.unwrap_or(DEFAULT_MAX_RANK);
        let stall_penalty = file_cfg.rank.stall_penalty.unwrap_or(true);

        let reference_size = file_cfg
            .anomaly
            .reference_size
            .unwrap_or(DEFAULT_REFERENCE_SIZE)
            .max(1);
        let seed = file_cfg.anomaly.seed.unwrap_or(DEFAULT_SEED);

        let granularity = file_cfg.tokenizer.granularity.unwrap_or_default();
        let unknown_placeholder = file_cfg
            .tokenizer
            .unknown_placeholder
            .clone()
            .unwrap_or_else(|| DEFAULT_UNKNOWN_PLACEHOLDER.to_string());

        let provider_name = provider
            .or_else(|| file_cfg.completion.provider.clone())
            .unwrap_or_else(|| Provider::default().as_str().to_string());
        let provider = Provider::parse(&provider_name)
            .ok_or_else(|| anyhow!("unknown completion provider: {provider_name}"))?;
        let backend_cfg = file_cfg
            .completion
            .backends
            .get(provider.as_str())
            .cloned()
            .unwrap_or_default();
        let backend = resolve_backend(provider, &backend_cfg, &file_cfg);
        let retry = RetryPolicy {
            max_attempts: file_cfg.completion.max_attempts.unwrap_or(3).max(1),
            initial_backoff: Duration::from_millis(
                file_cfg.completion.initial_backoff_ms.unwrap_or(500),
            ),
            max_backoff: Duration::from_millis(file_cfg.completion.max_backoff_ms.unwrap_or(8000)),
        };

        let in_data_dir = |name: Option<String>, default: &str| {
            let p = PathBuf::from(name.unwrap_or_else(|| default.to_string()));
            if p.is_absolute() {
                p
            } else {
                data_dir.join(p)
            }
        };
        let records_path = in_data_dir(file_cfg.output.records_file.clone(), "output.jsonl");
        let ranked_prompts_path = in_data_dir(
            file_cfg.output.ranked_prompts_file.clone(),
            "ranked_prompts.jsonl",
        );
        let trace_dir = in_data_dir(file_cfg.output.trace_dir.clone(), "_trace");
        let trace_prompts = file_cfg.output.trace_prompts.unwrap_or(true);

        let prompts = PromptSet::load(&cfg_path, &file_cfg).context("load prompts")?;

        Ok(Self {
            workdir,
            config_path: cfg_path,
            data_dir,
            source_file,
            target_file,
            prompts_file,
            retrieval_width,
            max_iterations,
            rank_width,
            max_rank,
            stall_penalty,
            reference_size,
            seed,
            granularity,
            unknown_placeholder,
            backend,
            retry,
            records_path,
            ranked_prompts_path,
            trace_dir,
            trace_prompts,
            prompts,
        })
    }

    #[must_use]
    pub fn corpus_files(&self) -> CorpusFiles<'_> {
        CorpusFiles {
            source: &self.source_file,
            target: &self.target_file,
            prompts: &self.prompts_file,
        }
    }
}

fn resolve_backend(provider: Provider, b: &BackendSection, cfg: &AppConfig) -> BackendSettings {
    let (model, key_env, base_url) = match provider {
        Provider::Anthropic => (
            "claude-3-opus-20240229",
            "ANTHROPIC_API_KEY",
            "https://api.anthropic.com",
        ),
        Provider::OpenAi => ("gpt-4o", "OPENAI_API_KEY", "https://api.openai.com"),
    };
    BackendSettings {
        provider,
        model: non_empty(b.model.clone()).unwrap_or_else(|| model.to_string()),
        base_url: non_empty(b.base_url.clone()).unwrap_or_else(|| base_url.to_string()),
        api_key_env: non_empty(b.api_key_env.clone()).unwrap_or_else(|| key_env.to_string()),
        temperature: cfg.completion.temperature.unwrap_or(0.01),
        max_tokens: cfg.completion.max_tokens.unwrap_or(2048),
        timeout: Duration::from_secs(cfg.completion.timeout_secs.unwrap_or(120).max(1)),
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(DEFAULT_CONFIG_FILENAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;

    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[corpus]
data_dir = "."
source_file = "source.txt"
target_file = "target.txt"
prompts_file = "prompts.txt"

[retrieval]
# Lines taken per narrowing iteration.
width = 1
max_iterations = 20

[rank]
width = 1
max_rank = 100
# When the loop stops making progress, report iterations x repeated vocabulary size.
stall_penalty = true

[anomaly]
reference_size = 20
seed = 3407

[tokenizer]
# "word" or "char"
granularity = "word"
unknown_placeholder = "[unclear]"

[completion]
# "anthropic" or "openai"
provider = "anthropic"
timeout_secs = 120
max_attempts = 3
initial_backoff_ms = 500
max_backoff_ms = 8000
temperature = 0.01
max_tokens = 2048

[completion.backends.anthropic]
model = "claude-3-opus-20240229"
api_key_env = "ANTHROPIC_API_KEY"
base_url = "https://api.anthropic.com"

[completion.backends.openai]
model = "gpt-4o"
api_key_env = "OPENAI_API_KEY"
base_url = "https://api.openai.com"

[prompts]
system = "prompts/system.txt"
message = "prompts/message.txt"

[output]
records_file = "output.jsonl"
ranked_prompts_file = "ranked_prompts.jsonl"
trace_dir = "_trace"
trace_prompts = true
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig::resolve(
            dir.path().to_path_buf(),
            dir.path().join(DEFAULT_CONFIG_FILENAME),
            AppConfig::default(),
            None,
            None,
        )
        .unwrap();
        assert_eq!(cfg.retrieval_width, 1);
        assert_eq!(cfg.max_iterations, 20);
        assert_eq!(cfg.max_rank, 100);
        assert!(cfg.stall_penalty);
        assert_eq!(cfg.reference_size, 20);
        assert_eq!(cfg.seed, 3407);
        assert_eq!(cfg.granularity, Granularity::Word);
        assert_eq!(cfg.backend.provider, Provider::Anthropic);
        assert_eq!(cfg.backend.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert_eq!(cfg.records_path, dir.path().join("output.jsonl"));
        assert_eq!(cfg.corpus_files().source, "source.txt");
    }

    #[test]
    fn char_granularity_flows_from_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_cfg: AppConfig = toml::from_str("[tokenizer]\ngranularity = \"char\"").unwrap();
        let cfg = PipelineConfig::resolve(
            dir.path().to_path_buf(),
            dir.path().join(DEFAULT_CONFIG_FILENAME),
            file_cfg,
            None,
            None,
        )
        .unwrap();
        assert_eq!(cfg.granularity, Granularity::Char);
    }

    #[test]
    fn cli_provider_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut file_cfg = AppConfig::default();
        file_cfg.completion.provider = Some("anthropic".into());
        let cfg = PipelineConfig::resolve(
            dir.path().to_path_buf(),
            dir.path().join(DEFAULT_CONFIG_FILENAME),
            file_cfg,
            Some(PathBuf::from("data")),
            Some("openai".into()),
        )
        .unwrap();
        assert_eq!(cfg.backend.provider, Provider::OpenAi);
        assert_eq!(cfg.backend.model, "gpt-4o");
        assert_eq!(cfg.data_dir, dir.path().join("data"));
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = PipelineConfig::resolve(
            dir.path().to_path_buf(),
            dir.path().join(DEFAULT_CONFIG_FILENAME),
            AppConfig::default(),
            None,
            Some("llama".into()),
        );
        assert!(res.is_err());
    }

    #[test]
    fn init_writes_a_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = init_default_config(dir.path(), false).unwrap();
        assert!(dir.path().join("prompts/system.txt").exists());
        let file_cfg = load_config(&path).unwrap();
        assert_eq!(file_cfg.rank.max_rank, Some(100));

        let cfg = PipelineConfig::resolve(
            dir.path().to_path_buf(),
            path.clone(),
            file_cfg,
            None,
            None,
        )
        .unwrap();
        assert_eq!(cfg.backend.base_url, "https://api.anthropic.com");
        assert_eq!(cfg.prompts.system, crate::pipeline::prompts::DEFAULT_SYSTEM_TEXT);

        // existing files are kept unless forced
        std::fs::write(&path, "[rank]\nmax_rank = 5\n").unwrap();
        init_default_config(dir.path(), false).unwrap();
        assert_eq!(load_config(&path).unwrap().rank.max_rank, Some(5));
        init_default_config(dir.path(), true).unwrap();
        assert_eq!(load_config(&path).unwrap().rank.max_rank, Some(100));
    }
}
