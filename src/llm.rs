//! Chat model client.
//!
//! The answering path makes exactly one completion call per question —
//! no retries, no fallback — so a single upstream failure fails the whole
//! question, and the queue-free request path stays simple.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;

const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";
const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// One-shot completion: a system instruction plus a user message.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Chat model served by Groq's OpenAI-compatible completions endpoint.
/// Requires the `GROQ_API_KEY` environment variable.
pub struct GroqChat {
    model: String,
    temperature: f32,
    client: reqwest::Client,
    api_key: String,
}

impl GroqChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(GROQ_API_KEY_ENV)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", GROQ_API_KEY_ENV))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            client,
            api_key,
        })
    }
}

#[async_trait]
impl ChatModel for GroqChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let resp = self
            .client
            .post(GROQ_CHAT_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Groq API error {}: {}", status, text);
        }

        let json: serde_json::Value = resp.json().await?;
        parse_completion(&json)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid completion response: missing choices[0].message.content"))
}

/// Create the configured [`ChatModel`] implementation.
pub fn create_chat(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "groq" => Ok(Box::new(GroqChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_first_choice() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "The title is Foo." } }
            ]
        });
        assert_eq!(parse_completion(&json).unwrap(), "The title is Foo.");
    }

    #[test]
    fn parse_rejects_malformed_response() {
        assert!(parse_completion(&serde_json::json!({})).is_err());
        assert!(parse_completion(&serde_json::json!({ "choices": [] })).is_err());
    }
}
