pub mod extract;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

/// A text-completion endpoint: prompt in, raw model text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Ollama `/api/generate`
    Ollama,
    /// Ollama `/api/chat`
    OllamaChat,
    /// OpenAI-compatible chat completions
    Remote,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Ollama => write!(f, "ollama"),
            Backend::OllamaChat => write!(f, "ollama-chat"),
            Backend::Remote => write!(f, "remote"),
        }
    }
}

pub struct LlmManager {
    model: Box<dyn LanguageModel>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig, backend: Backend) -> Result<Self, LlmError> {
        let model: Box<dyn LanguageModel> = match backend {
            Backend::Ollama => Box::new(providers::ollama::OllamaProvider::new(config)?),
            Backend::OllamaChat => Box::new(providers::ollama_chat::OllamaChatProvider::new(config)?),
            Backend::Remote => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
        };

        Ok(Self { model })
    }
}

#[async_trait]
impl LanguageModel for LlmManager {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.model.complete(prompt).await
    }
}

/// HTTP client shared by the providers. No timeout unless one is configured.
pub(crate) fn http_client(config: &LlmConfig) -> Result<reqwest::Client, LlmError> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|e| LlmError::ConfigError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn test_remote_requires_url_and_key() {
        let config = AppConfig::default().llm;
        match LlmManager::new(&config, Backend::Remote) {
            Err(LlmError::ConfigError(msg)) => assert!(msg.contains("API URL")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("remote backend built without an API URL"),
        }
    }

    #[test]
    fn test_ollama_backends_build_from_defaults() {
        let config = AppConfig::default().llm;
        assert!(LlmManager::new(&config, Backend::Ollama).is_ok());
        assert!(LlmManager::new(&config, Backend::OllamaChat).is_ok());
    }

    #[test]
    fn test_backend_names() {
        let backend: Backend = serde_json::from_str("\"ollama-chat\"").unwrap();
        assert_eq!(backend, Backend::OllamaChat);
        assert_eq!(Backend::Remote.to_string(), "remote");
    }
}
