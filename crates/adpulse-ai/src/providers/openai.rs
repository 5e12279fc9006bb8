use crate::generator::{InsightGenerator, InsightRequest};
use crate::models::{ChatRequest, ChatResponse};
use crate::prompt::{build_insight_prompt, parse_insights};
use adpulse_common::types::Insights;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

const SYSTEM_PROMPT: &str =
    "You are a senior performance-marketing analyst. You explain anomalies in advertising metrics and answer in JSON.";

/// Insight generator backed by any OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: Client,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
}

impl OpenAiCompatProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout_secs: Option<u64>,
        max_tokens: Option<usize>,
        temperature: Option<f32>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs.unwrap_or(60)))
            .build()?;

        Ok(Self {
            api_key,
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            client,
            max_tokens,
            temperature,
        })
    }

    async fn call_api(&self, prompt: &str) -> Result<String> {
        let mut req = ChatRequest::json_completion(&self.model, SYSTEM_PROMPT, prompt);
        req.temperature = self.temperature;
        req.max_tokens = self.max_tokens;

        tracing::debug!(
            model = %self.model,
            prompt_length = prompt.len(),
            "Calling chat completions API"
        );

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("Failed to send chat completions request")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Chat completions request failed");
            anyhow::bail!("chat completions error {}: {}", status, body);
        }

        let chat_resp: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse chat completions response")?;

        tracing::debug!(usage = ?chat_resp.usage, "Chat completions response received");

        chat_resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("Empty response from chat completions API"))
    }
}

#[async_trait]
impl InsightGenerator for OpenAiCompatProvider {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &InsightRequest) -> Result<Insights> {
        let prompt = build_insight_prompt(request)?;
        let reply = self.call_api(&prompt).await?;
        parse_insights(&reply).with_context(|| {
            format!(
                "Failed to parse insights for alarm {} from {}",
                request.alarm.id, self.model
            )
        })
    }
}
