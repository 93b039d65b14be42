use crate::config::LlmConfig;
use crate::llm::providers::{endpoint, OllamaOptions};
use crate::llm::{http_client, LanguageModel, LlmError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Single-turn chat through Ollama's `/api/chat`.
pub struct OllamaChatProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f32,
    num_ctx: Option<u32>,
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: String,
}

impl OllamaChatProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(config)?,
            api_url: endpoint(config.api_url.as_deref(), "/api/chat"),
            model: config.model.clone(),
            temperature: config.temperature,
            num_ctx: config.num_ctx,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaChatProvider {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        info!("Sending chat request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.api_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_ctx: self.num_ctx,
            },
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Ollama chat API responded with status code: {} - {}", status, body);
            return Err(LlmError::ResponseError(format!(
                "Ollama chat API responded with status code: {} - {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        match chat_response.message {
            Some(message) if !message.content.trim().is_empty() => Ok(message.content),
            _ => Err(LlmError::ResponseError("No message content in chat response".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::providers::test_support::spawn_stub;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[tokio::test]
    async fn test_chat_sends_single_user_message() {
        let router = Router::new().route(
            "/api/chat",
            post(|Json(body): Json<Value>| async move {
                let messages = body["messages"].as_array().cloned().unwrap_or_default();
                let content = format!(
                    "{}:{}:{}",
                    messages.len(),
                    messages[0]["role"].as_str().unwrap_or_default(),
                    messages[0]["content"].as_str().unwrap_or_default()
                );
                Json(json!({"message": {"role": "assistant", "content": content}, "done": true}))
            }),
        );
        let config = LlmConfig {
            api_url: Some(spawn_stub(router).await),
            ..AppConfig::default().llm
        };

        let provider = OllamaChatProvider::new(&config).unwrap();
        let text = provider.complete("How many patients?").await.unwrap();
        assert_eq!(text, "1:user:How many patients?");
    }

    #[tokio::test]
    async fn test_missing_message_is_response_error() {
        let router = Router::new().route(
            "/api/chat",
            post(|| async { Json(json!({"done": true})) }),
        );
        let config = LlmConfig {
            api_url: Some(spawn_stub(router).await),
            ..AppConfig::default().llm
        };

        let provider = OllamaChatProvider::new(&config).unwrap();
        let err = provider.complete("How many patients?").await.unwrap_err();
        assert!(matches!(err, LlmError::ResponseError(_)), "{err:?}");
    }
}
