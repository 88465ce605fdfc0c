//! OpenAI chat completions client

use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    base_url: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        api_key: Option<String>,
        model: String,
        temperature: f32,
        base_url: Option<String>,
    ) -> Self {
        Self {
            http,
            api_key,
            model,
            temperature,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    fn error(message: impl Into<String>) -> AppError {
        AppError::LlmError {
            provider: "openai".to_string(),
            message: message.into(),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            tracing::error!("OPENAI_API_KEY_MISSING");
            AppError::Configuration {
                message: "OpenAI API key is required for OpenAI models".to_string(),
            }
        })?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::error(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error(format!("API error {}: {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Self::error(format!("Failed to parse response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Self::error("Empty response from LLM"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing() {
        let response: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Try the dal." } }]
        }))
        .unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("Try the dal.")
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_configuration_error() {
        let client = OpenAiClient::new(
            reqwest::Client::new(),
            None,
            "gpt-4o-mini".to_string(),
            0.0,
            None,
        );
        let err = client.generate("hi").await.unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
