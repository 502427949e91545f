// crates/llm/src/client.rs
//! Structured-output client for an OpenAI-compatible chat-completions API.
//!
//! One request in, one decoded value out. No retries at this layer; the
//! selection engine decides what a failed generation is worth.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

const DEFAULT_MODEL: &str = "deepseek-v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const TEMPERATURE: f64 = 0.9;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("generator transport error: {0}")]
    Transport(String),

    #[error("incomplete generator response: {0}")]
    Incomplete(String),

    #[error("generator response failed schema decode: {0}")]
    Schema(String),
}

/// Connection settings for the external generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub default_max_tokens: u32,
    pub timeout: Duration,
}

impl GeneratorConfig {
    /// Read `GENERATOR_BASE_URL`, `GENERATOR_API_KEY`, and optional
    /// `GENERATOR_MODEL` from the environment.
    pub fn from_env() -> Result<Self, GenerateError> {
        let base_url = std::env::var("GENERATOR_BASE_URL")
            .map_err(|_| GenerateError::Transport("GENERATOR_BASE_URL is not set".into()))?;
        let api_key = std::env::var("GENERATOR_API_KEY")
            .map_err(|_| GenerateError::Transport("GENERATOR_API_KEY is not set".into()))?;
        let model = std::env::var("GENERATOR_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Ok(Self {
            base_url,
            api_key,
            model,
            default_max_tokens: 300,
            timeout: DEFAULT_TIMEOUT,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// Strip markdown fencing and internal reasoning tokens from raw generator
/// output before JSON parsing.
pub fn sanitize_output(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        text = stripped.trim_start();
    } else if let Some(stripped) = text.strip_prefix("```") {
        text = stripped.trim_start();
    }
    if let Some(stripped) = text.strip_suffix("```") {
        text = stripped.trim_end();
    }
    text.replace("<think></think>", "").trim().to_string()
}

/// Client for structured-output requests against the generator.
pub struct GeneratorClient {
    http: reqwest::Client,
    config: GeneratorConfig,
}

impl GeneratorClient {
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerateError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerateError::Transport(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn default_max_tokens(&self) -> u32 {
        self.config.default_max_tokens
    }

    /// Request a completion constrained to `schema` and decode it into `T`.
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Json,
        max_tokens: u32,
    ) -> Result<T, GenerateError> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
            "max_tokens": max_tokens,
            "n": 1,
            "temperature": TEMPERATURE,
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": "response", "schema": schema},
            },
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            error!(%status, %detail, "generator returned an error status");
            return Err(GenerateError::Transport(format!("status {status}: {detail}")));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| GenerateError::Transport(e.to_string()))?;

        if let Some(usage) = &completion.usage {
            debug!(
                prompt = usage.prompt_tokens,
                completion = usage.completion_tokens,
                total = usage.total_tokens,
                "generator token usage"
            );
        }

        let choice = completion
            .choices
            .first()
            .ok_or_else(|| GenerateError::Incomplete("response carries no choices".into()))?;
        match choice.finish_reason.as_deref() {
            Some("stop") | None => {}
            Some(other) => {
                return Err(GenerateError::Incomplete(format!(
                    "finish reason '{other}'"
                )));
            }
        }
        let content = choice
            .message
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GenerateError::Incomplete("response content is empty".into()))?;

        let sanitized = sanitize_output(content);
        serde_json::from_str(&sanitized).map_err(|e| GenerateError::Schema(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_json_fence() {
        assert_eq!(
            sanitize_output("```json\n{\"a\": 1}\n```"),
            "{\"a\": 1}"
        );
    }

    #[test]
    fn test_sanitize_strips_bare_fence() {
        assert_eq!(sanitize_output("```\n[1, 2]\n```"), "[1, 2]");
    }

    #[test]
    fn test_sanitize_removes_think_tokens_and_whitespace() {
        assert_eq!(sanitize_output("  <think></think>{\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_sanitize_passthrough() {
        assert_eq!(sanitize_output("{\"ok\": true}"), "{\"ok\": true}");
    }

    #[test]
    fn test_chat_completion_deserializes() {
        let raw = serde_json::json!({
            "choices": [{
                "finish_reason": "stop",
                "message": {"content": "{\"questions\": []}"}
            }],
            "usage": {"prompt_tokens": 100, "completion_tokens": 20, "total_tokens": 120}
        });
        let completion: ChatCompletion = serde_json::from_value(raw).unwrap();
        assert_eq!(completion.choices.len(), 1);
        assert_eq!(completion.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(completion.usage.as_ref().unwrap().total_tokens, 120);
    }
}
