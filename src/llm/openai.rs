use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::LlmConfig;
use crate::errors::GenerationError;

use super::{CompletionRequest, Embedder, TextGenerator};

/// Client for OpenAI-compatible `/chat/completions` and `/embeddings`.
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsRow {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn api_key(&self) -> Result<&str, GenerationError> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::NotConfigured("OPENAI_API_KEY is not set".into()))
    }

    async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
        timeout: std::time::Duration,
    ) -> Result<reqwest::Response, GenerationError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(self.api_key()?)
            .timeout(timeout)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.config.chat_model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self.post("chat/completions", body, request.timeout).await?;
        let parsed: ChatResponse = response.json().await?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse("no completion choice".into()))?;

        debug!("completion: {} chars", content.len());
        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GenerationError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.config.embedding_model,
            "input": texts,
            "encoding_format": "float",
        });

        let response = self.post("embeddings", body, self.config.timeout).await?;
        let parsed: EmbeddingsResponse = response.json().await?;

        if parsed.data.len() != texts.len() {
            return Err(GenerationError::InvalidResponse(format!(
                "embeddings returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        let mut out = vec![Vec::<f32>::new(); texts.len()];
        for row in parsed.data {
            if row.index < out.len() {
                out[row.index] = row.embedding;
            }
        }
        if out.iter().any(|v| v.is_empty()) {
            return Err(GenerationError::InvalidResponse(
                "embeddings returned empty vector(s)".into(),
            ));
        }
        Ok(out)
    }

    fn model_name(&self) -> String {
        format!("openai/{}", self.config.embedding_model)
    }
}
