//! LLM provider abstraction
//!
//! Every provider exposes one capability, turning a prompt into text. The active
//! provider is picked from configuration once, at construction time; callers only
//! ever see [`TextGenerator`].

mod gemini;
mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Uniform "generate text for prompt" capability
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a single prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Name used in logs and metrics
    fn name(&self) -> &str;
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Google Generative Language API
    Gemini,
    /// OpenAI chat completions
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini",
            LlmProvider::OpenAi => "openai",
        }
    }

    /// Model used when configuration does not name one
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-2.0-flash",
            LlmProvider::OpenAi => "gpt-4o-mini",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmProvider::Gemini),
            "openai" => Ok(LlmProvider::OpenAi),
            other => Err(AppError::Configuration {
                message: format!("Unknown LLM provider: {}", other),
            }),
        }
    }
}

/// The configured provider client
#[derive(Debug, Clone)]
pub enum LlmBackend {
    Gemini(GeminiClient),
    OpenAi(OpenAiClient),
}

impl LlmBackend {
    /// Build the backend named by configuration.
    ///
    /// Credentials are not checked here: a missing key surfaces from `generate`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider: LlmProvider = config.provider.parse()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());

        tracing::info!(
            provider = %provider,
            model = %model,
            temperature = config.temperature,
            "Creating LLM backend"
        );

        Ok(match provider {
            LlmProvider::Gemini => LlmBackend::Gemini(GeminiClient::new(
                http,
                config.google_api_key.clone(),
                model,
                config.temperature,
                config.api_base.clone(),
            )),
            LlmProvider::OpenAi => LlmBackend::OpenAi(OpenAiClient::new(
                http,
                config.openai_api_key.clone(),
                model,
                config.temperature,
                config.api_base.clone(),
            )),
        })
    }

    pub fn provider(&self) -> LlmProvider {
        match self {
            LlmBackend::Gemini(_) => LlmProvider::Gemini,
            LlmBackend::OpenAi(_) => LlmProvider::OpenAi,
        }
    }
}

#[async_trait]
impl TextGenerator for LlmBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let start = Instant::now();
        let result = match self {
            LlmBackend::Gemini(client) => client.generate(prompt).await,
            LlmBackend::OpenAi(client) => client.generate(prompt).await,
        };
        metrics::record_llm(start.elapsed().as_secs_f64(), self.name(), result.is_ok());
        result
    }

    fn name(&self) -> &str {
        self.provider().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("gemini".parse::<LlmProvider>().unwrap(), LlmProvider::Gemini);
        assert_eq!(" OpenAI ".parse::<LlmProvider>().unwrap(), LlmProvider::OpenAi);
        assert!("llama".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_backend_selection_follows_config() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            ..LlmConfig::default()
        };
        let backend = LlmBackend::from_config(&config).unwrap();
        assert_eq!(backend.provider(), LlmProvider::OpenAi);
        assert_eq!(backend.name(), "openai");

        let backend = LlmBackend::from_config(&LlmConfig::default()).unwrap();
        assert_eq!(backend.provider(), LlmProvider::Gemini);
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_at_generation() {
        let backend = LlmBackend::from_config(&LlmConfig::default()).unwrap();
        let err = backend.generate("hello").await.unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
