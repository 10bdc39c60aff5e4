use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{non_empty, GenerationSettings, TextGenerator};

/// Any server with `/v1/chat/completions`: OpenAI itself, vLLM, llama-server.
pub struct OpenAiCompatibleClient {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    settings: GenerationSettings,
}

impl OpenAiCompatibleClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<&str>,
        settings: GenerationSettings,
    ) -> anyhow::Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build chat completions HTTP client")?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.map(str::to_string),
            settings,
        })
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleClient {
    async fn generate(&self, system: &str, prompt: &str) -> anyhow::Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: Some(self.settings.temperature),
            max_tokens: Some(self.settings.max_output_tokens),
            stream: false,
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "sending chat completion");
        let response = self
            .authorized(
                self.http_client
                    .post(format!("{}/v1/chat/completions", self.base_url))
                    .json(&request),
            )
            .send()
            .await
            .context("chat completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("chat completion API error {status}: {body}");
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .context("invalid chat completion response")?;
        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        non_empty(content, "chat completion API")
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        let response = self
            .authorized(
                self.http_client
                    .get(format!("{}/v1/models", self.base_url)),
            )
            .send()
            .await
            .context("chat completion health check failed")?;
        if !response.status().is_success() {
            bail!("model listing returned {}", response.status());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "openai_compatible"
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}
