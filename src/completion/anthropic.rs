use serde_json::{json, Value};

use super::{http_agent, join_url, malformed, post_json, BackendSettings, CompletionBackend};
use crate::error::CompletionError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client.
pub struct AnthropicBackend {
    agent: ureq::Agent,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(settings: &BackendSettings, api_key: String) -> Self {
        Self {
            agent: http_agent(settings.timeout),
            url: join_url(&settings.base_url, "/v1/messages"),
            api_key,
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    fn request_body(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.model,
            "system": system,
            "messages": [{ "role": "user", "content": user }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

pub(super) fn extract_text(backend: &str, body: &str) -> Result<String, CompletionError> {
    let v: Value =
        serde_json::from_str(body).map_err(|e| malformed(backend, format!("invalid JSON: {e}")))?;
    v["content"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(backend, "missing content[0].text"))
}

impl CompletionBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = self.request_body(system, user);
        let text = post_json(
            &self.agent,
            self.name(),
            &self.url,
            &[
                ("x-api-key", self.api_key.as_str()),
                ("anthropic-version", ANTHROPIC_VERSION),
            ],
            &body,
        )?;
        extract_text(self.name(), &text)
    }
}
