pub mod ollama;
pub mod ollama_chat;
pub mod remote;

use serde::Serialize;

pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Sampling options understood by both Ollama endpoints.
#[derive(Serialize, Debug)]
pub(crate) struct OllamaOptions {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_ctx: Option<u32>,
}

/// Joins `path` onto a configured base URL unless the URL already names it.
pub(crate) fn endpoint(base: Option<&str>, path: &str) -> String {
    let base = base.unwrap_or(DEFAULT_OLLAMA_URL).trim_end_matches('/');
    if base.ends_with(path) {
        base.to_string()
    } else {
        format!("{}{}", base, path)
    }
}
