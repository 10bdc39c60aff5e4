use std::sync::Arc;

use async_trait::async_trait;
use trendpost_core::config::{LlmConfig, LlmProvider};

pub mod gemini;
pub mod openai_compatible;

pub use gemini::GeminiClient;
pub use openai_compatible::OpenAiCompatibleClient;

/// Given a prompt, return text or fail.
///
/// An empty completion is a failure: the report must never go out with a
/// blank summary.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> anyhow::Result<String>;

    async fn health_check(&self) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

/// Sampling settings shared by every backend.
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl From<&LlmConfig> for GenerationSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }
}

pub fn from_config(config: &LlmConfig) -> anyhow::Result<Arc<dyn TextGenerator>> {
    let settings = GenerationSettings::from(config);
    let generator: Arc<dyn TextGenerator> = match config.provider {
        LlmProvider::Gemini => {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("Gemini requires an API key"))?;
            Arc::new(GeminiClient::new(
                &config.base_url,
                &config.model,
                api_key,
                settings,
            )?)
        }
        LlmProvider::OpenAiCompatible => Arc::new(OpenAiCompatibleClient::new(
            &config.base_url,
            &config.model,
            config.api_key.as_deref(),
            settings,
        )?),
    };
    tracing::info!(provider = generator.name(), model = %config.model, "text generator ready");
    Ok(generator)
}

/// Rejects completions that carry no text.
pub(crate) fn non_empty(text: String, backend: &str) -> anyhow::Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        anyhow::bail!("{backend} returned an empty completion");
    }
    Ok(trimmed.to_string())
}
