//! Text-completion service boundary.
//!
//! The orchestrator only ever sees [`CompletionBackend`]: a system message and a
//! user message go in, free-form text comes out. Which vendor answers is a
//! configuration value resolved by [`build_backend`].

mod anthropic;
mod openai;
mod parse;
mod retry;

use std::time::Duration;

use crate::error::CompletionError;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;
pub use parse::extract_target_codes;
pub use retry::{RetryPolicy, RetryingBackend};

pub trait CompletionBackend {
    fn name(&self) -> &str;

    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError>;
}

impl<B: CompletionBackend + ?Sized> CompletionBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        (**self).complete(system, user)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
}

impl Provider {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "gpt" => Some(Self::OpenAi),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

/// Fully resolved settings for one HTTP backend.
#[derive(Clone, Debug)]
pub struct BackendSettings {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Reads the API key from the configured environment variable and builds the
/// matching backend, wrapped in `policy`.
pub fn build_backend(
    settings: &BackendSettings,
    policy: RetryPolicy,
) -> Result<RetryingBackend<Box<dyn CompletionBackend>>, CompletionError> {
    let api_key = std::env::var(&settings.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            CompletionError::Config(format!(
                "environment variable {} is not set",
                settings.api_key_env
            ))
        })?;
    let inner: Box<dyn CompletionBackend> = match settings.provider {
        Provider::Anthropic => Box::new(AnthropicBackend::new(settings, api_key)),
        Provider::OpenAi => Box::new(OpenAiBackend::new(settings, api_key)),
    };
    Ok(RetryingBackend::new(inner, policy))
}

pub(crate) fn http_agent(timeout: Duration) -> ureq::Agent {
    let config = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    ureq::Agent::new_with_config(config)
}

/// POSTs a JSON body and returns the response text, mapping non-2xx statuses to
/// [`CompletionError::Status`].
pub(crate) fn post_json(
    agent: &ureq::Agent,
    backend: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &serde_json::Value,
) -> Result<String, CompletionError> {
    let payload = serde_json::to_string(body).map_err(|e| CompletionError::Malformed {
        backend: backend.to_string(),
        message: format!("encode request: {e}"),
    })?;
    let mut req = agent.post(url).header("content-type", "application/json");
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    let response = req
        .send(payload.as_bytes())
        .map_err(|e| CompletionError::Transport {
            backend: backend.to_string(),
            message: format!("{url}: {e}"),
        })?;
    let status = response.status().as_u16();
    let text = response
        .into_body()
        .read_to_string()
        .map_err(|e| CompletionError::Transport {
            backend: backend.to_string(),
            message: format!("read body: {e}"),
        })?;
    if !(200..300).contains(&status) {
        return Err(CompletionError::Status {
            backend: backend.to_string(),
            status,
            body: crate::textutil::truncate_chars(&text, 400),
        });
    }
    Ok(text)
}

pub(crate) fn malformed(backend: &str, message: impl Into<String>) -> CompletionError {
    CompletionError::Malformed {
        backend: backend.to_string(),
        message: message.into(),
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names() {
        assert_eq!(Provider::parse("OpenAI"), Some(Provider::OpenAi));
        assert_eq!(Provider::parse(" anthropic "), Some(Provider::Anthropic));
        assert_eq!(Provider::parse("llama"), None);
        assert_eq!(Provider::OpenAi.as_str(), "openai");
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let settings = BackendSettings {
            provider: Provider::Anthropic,
            model: "m".into(),
            base_url: "http://localhost".into(),
            api_key_env: "METAPATTERN_TEST_KEY_THAT_IS_NEVER_SET".into(),
            temperature: 0.0,
            max_tokens: 16,
            timeout: Duration::from_secs(1),
        };
        let err = build_backend(&settings, RetryPolicy::default()).err().unwrap();
        assert!(matches!(err, CompletionError::Config(_)));
    }

    #[test]
    fn urls_join_with_one_slash() {
        assert_eq!(join_url("https://x/", "/v1/messages"), "https://x/v1/messages");
        assert_eq!(join_url("https://x", "v1/messages"), "https://x/v1/messages");
    }
}
