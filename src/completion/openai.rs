use serde_json::{json, Value};

use super::{http_agent, join_url, malformed, post_json, BackendSettings, CompletionBackend};
use crate::error::CompletionError;

/// Chat Completions API client.
pub struct OpenAiBackend {
    agent: ureq::Agent,
    url: String,
    auth: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(settings: &BackendSettings, api_key: String) -> Self {
        Self {
            agent: http_agent(settings.timeout),
            url: join_url(&settings.base_url, "/v1/chat/completions"),
            auth: format!("Bearer {api_key}"),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    fn request_body(&self, system: &str, user: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        })
    }
}

fn extract_text(backend: &str, body: &str) -> Result<String, CompletionError> {
    let v: Value =
        serde_json::from_str(body).map_err(|e| malformed(backend, format!("invalid JSON: {e}")))?;
    v["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(backend, "missing choices[0].message.content"))
}

impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = self.request_body(system, user);
        let text = post_json(
            &self.agent,
            self.name(),
            &self.url,
            &[("authorization", self.auth.as_str())],
            &body,
        )?;
        extract_text(self.name(), &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::completion::Provider;

    #[test]
    fn request_has_system_then_user() {
        let settings = BackendSettings {
            provider: Provider::OpenAi,
            model: "gpt-4o".into(),
            base_url: "https://api.openai.com".into(),
            api_key_env: String::new(),
            temperature: 0.01,
            max_tokens: 2048,
            timeout: Duration::from_secs(5),
        };
        let b = OpenAiBackend::new(&settings, "k".into());
        assert_eq!(b.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(b.auth, "Bearer k");
        let body = b.request_body("sys", "hello");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hello");
        assert_eq!(body["model"], "gpt-4o");
    }

    #[test]
    fn text_is_read_from_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"target: 3"}}]}"#;
        assert_eq!(extract_text("openai", body).unwrap(), "target: 3");
        assert!(extract_text("openai", r#"{"choices":[]}"#).is_err());
    }
}
