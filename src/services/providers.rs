use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::config::{ProviderKind, Settings};

#[derive(Debug, Clone)]
pub(crate) struct ProviderResponse {
    pub(crate) text: String,
    /// Output token count as reported by the provider, when it reports one.
    pub(crate) output_tokens: Option<i64>,
}

/// One implementation per model provider. Adding a provider means adding an
/// impl and a `ProviderKind` arm; the orchestrator never changes.
#[async_trait]
pub(crate) trait ModelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Divisor for the character-count token approximation used when the
    /// provider reports no usage metadata. Approximate, not billing-grade.
    fn token_divisor(&self) -> usize;

    async fn invoke(&self, prompt: &str) -> Result<ProviderResponse>;
}

pub(crate) fn from_settings(settings: &Settings) -> Result<Box<dyn ModelProvider>> {
    let ai = settings.ai();
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .timeout(Duration::from_secs(ai.request_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;

    match ai.provider {
        ProviderKind::Google => Ok(Box::new(GoogleProvider {
            client,
            api_key: ai.gemini_api_key.clone(),
            base_url: ai.gemini_base_url.trim_end_matches('/').to_string(),
            model: ai.model_id.clone(),
            temperature: ai.temperature,
            max_output_tokens: ai.max_output_tokens,
        })),
        ProviderKind::OpenAi => Ok(Box::new(OpenAiProvider {
            client,
            api_key: ai.openai_api_key.clone(),
            base_url: ai.openai_base_url.trim_end_matches('/').to_string(),
            model: ai.model_id.clone(),
            temperature: ai.temperature,
            max_output_tokens: ai.max_output_tokens,
        })),
    }
}

pub(crate) struct GoogleProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
}

#[async_trait]
impl ModelProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "GOOGLE"
    }

    fn token_divisor(&self) -> usize {
        4
    }

    async fn invoke(&self, prompt: &str) -> Result<ProviderResponse> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let payload = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens,
            }
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await
            .context("Failed to call Gemini API")?;

        let status = response.status();
        let body: Value = response.json().await.context("Failed to read Gemini response")?;
        if !status.is_success() {
            anyhow::bail!("Gemini API error: {body}");
        }

        let text = body
            .get("candidates")
            .and_then(|candidates| candidates.get(0))
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(|parts| parts.get(0))
            .and_then(|part| part.get("text"))
            .and_then(|value| value.as_str())
            .context("Missing Gemini response text")?;

        Ok(ProviderResponse { text: text.to_string(), output_tokens: None })
    }
}

pub(crate) struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "OPENAI"
    }

    fn token_divisor(&self) -> usize {
        4
    }

    async fn invoke(&self, prompt: &str) -> Result<ProviderResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_completion_tokens": self.max_output_tokens,
            "temperature": self.temperature,
            "response_format": {"type": "json_object"}
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("Failed to call OpenAI API")?;

        let status = response.status();
        let body: Value = response.json().await.context("Failed to read OpenAI response")?;
        if !status.is_success() {
            anyhow::bail!("OpenAI API error: {body}");
        }

        let text = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|value| value.as_str())
            .context("Missing OpenAI response content")?;

        let output_tokens = body
            .get("usage")
            .and_then(|usage| usage.get("completion_tokens"))
            .and_then(|value| value.as_i64());

        Ok(ProviderResponse { text: text.to_string(), output_tokens })
    }
}
