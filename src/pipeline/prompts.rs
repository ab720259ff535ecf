use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};

use crate::config::AppConfig;
use crate::textutil::filter_text;
use crate::tokenizer::{render_codes, RelativeTokenizer};

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_SYSTEM: &str = "system.txt";
pub const DEFAULT_MESSAGE: &str = "message.txt";

#[derive(Clone, Debug)]
pub struct PromptSet {
    pub system: String,
    pub message: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_TEXT.to_string(),
            message: DEFAULT_MESSAGE_TEXT.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-in templates, replaced by any file the config names. A named file
    /// that does not exist is an error.
    pub fn load(config_path: &Path, cfg: &AppConfig) -> anyhow::Result<Self> {
        let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
        let mut set = Self::default();
        if let Some(rel) = cfg.prompts.system.as_deref() {
            set.system = read_prompt(config_dir, "system", rel)?;
        }
        if let Some(rel) = cfg.prompts.message.as_deref() {
            set.message = read_prompt(config_dir, "message", rel)?;
        }
        Ok(set)
    }

    /// User message for one query.
    #[must_use]
    pub fn render_message(&self, pairs: &str, input_prompt: &str) -> String {
        render_template(
            &self.message,
            &[("pairs", pairs), ("input_prompt", input_prompt)],
        )
    }
}

fn read_prompt(config_dir: &Path, key: &str, rel: &str) -> anyhow::Result<String> {
    let mut p = PathBuf::from(rel.trim());
    if p.is_relative() {
        p = config_dir.join(&p);
    }
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found for {key}: {} (run: metapattern init-config)",
            p.display()
        ));
    }
    let text = std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))?;
    Ok(text)
}

pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (k, v) in vars {
        let pat = format!("{{{{{k}}}}}");
        out = out.replace(&pat, v);
    }
    out
}

/// Rewrites an example block for the completion service: `source:` lines pass
/// through, each `target:` line becomes `target: <codes>` using `tokenizer`.
/// Other lines are dropped.
pub fn encode_example_block(block: &str, tokenizer: &mut RelativeTokenizer) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in block.lines() {
        if line.starts_with("source:") {
            out.push(line.to_string());
        } else if let Some(rest) = line.strip_prefix("target:") {
            let text = filter_text(rest.strip_prefix(' ').unwrap_or(rest));
            let codes = tokenizer.tokenize(&text);
            out.push(format!("target: {}", render_codes(&codes)));
        }
    }
    out.join("\n")
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_SYSTEM, DEFAULT_SYSTEM_TEXT),
        (DEFAULT_MESSAGE, DEFAULT_MESSAGE_TEXT),
    ]
}

pub const DEFAULT_SYSTEM_TEXT: &str = r#"You are skilled at finding general sequence-to-sequence patterns in data. Here there are 'source' and 'target' sequences.
You will be given some translation pairs and your task is to generate the 'target' sequence corresponding to the given 'source' sequence.
These are language translation pairings, but each unique word in the target has been assigned a number. The overall patterns are therefore linguistic in nature.
Work through the problem step by step, outlining your evidence for each decision.
"#;

pub const DEFAULT_MESSAGE_TEXT: &str = r#"Based on the provided translation pairs, generate the 'target' sequence corresponding to the given 'source' sequence.

1. First, create a 'target word bank' of target numbers that will probably occur given the source sequence. Write out the probable target numbers, and say why each is probable. In effect, map source phrases to target sequences.
2. Formulate grammatical rules that are apparent in the target texts and relevant to the sequence you will translate.
3. Arrange these target numbers in the correct order to form a coherent translation, and say why.
4. Do not copy any of the examples verbatim; use the underlying linguistic rules instead.
5. Avoid repetition.
6. Only predict numbers that already occur in the pairs.

Here are the pairs:
{{pairs}}

Source Sequence:
{{input_prompt}}

The last part of your response must follow this format: 'target: <numbers>'
Be concise and use the examples provided.
"#;
