//! Boundary to the hosted generative text and embedding services.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{EmbedderKind, LlmConfig};
use crate::errors::GenerationError;

pub mod hash;
pub mod openai;

/// One chat-style completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the raw text of the first completion choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds every text, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GenerationError>;

    /// Identifies the vector space; persisted with the index.
    fn model_name(&self) -> String;
}

/// Builds the embedder selected in the config.
pub fn embedder_from_config(config: &LlmConfig) -> Result<Arc<dyn Embedder>, GenerationError> {
    match config.embedder {
        EmbedderKind::OpenAi => Ok(Arc::new(openai::OpenAiClient::new(config.clone())?)),
        EmbedderKind::Hash => Ok(Arc::new(hash::HashEmbedder::default())),
    }
}

/// Builds the chat client if an API key is configured.
pub fn generator_from_config(
    config: &LlmConfig,
) -> Result<Option<Arc<dyn TextGenerator>>, GenerationError> {
    if config.api_key.is_none() {
        return Ok(None);
    }
    Ok(Some(Arc::new(openai::OpenAiClient::new(config.clone())?)))
}
