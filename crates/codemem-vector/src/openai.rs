// ABOUTME: OpenAI embeddings provider over the REST API
// ABOUTME: Single-call semantics; the batch coordinator owns retry policy

use crate::provider::{
    BatchLimits, EmbeddingProvider, EmbeddingResponse, HeuristicTokenCounter, ProviderCallError,
    TokenCounter,
};
use async_trait::async_trait;
use codemem_core::{EmbeddingProviderKind, IndexError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            api_base: "https://api.openai.com/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: Vec<ApiEmbedding>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: usize,
}

#[derive(Debug)]
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
    counter: HeuristicTokenCounter,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(IndexError::Config(
                "OpenAI embedding requires EMBEDDING_API_KEY".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent("codemem/0.4")
            .build()
            .map_err(|e| IndexError::Config(e.to_string()))?;
        Ok(Self {
            config,
            client,
            counter: HeuristicTokenCounter,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        EmbeddingProviderKind::OpenAi.as_str()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        EmbeddingProviderKind::OpenAi.dimension_for(&self.config.model)
    }

    fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_tokens: 8000,
            max_items: 2048,
        }
    }

    fn token_counter(&self) -> &dyn TokenCounter {
        &self.counter
    }

    async fn embed(&self, texts: &[String]) -> std::result::Result<EmbeddingResponse, ProviderCallError> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.config.model,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.api_base))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ProviderCallError::transient(format!("openai request failed: {e}"))
                } else {
                    ProviderCallError::hard(format!("openai request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retryable = status.as_u16() == 429 || status.is_server_error();
            let error = ProviderCallError {
                retryable,
                message: format!("openai returned {}: {}", status, body),
            };
            return Err(error);
        }

        let mut parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderCallError::hard(format!("openai response unreadable: {e}")))?;

        // The API documents order preservation; sort by index anyway.
        parsed.data.sort_by_key(|d| d.index);
        if parsed.data.len() != texts.len() {
            return Err(ProviderCallError::hard(format!(
                "openai returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }
        debug!(
            "openai embedded {} texts, {} prompt tokens",
            texts.len(),
            parsed.usage.prompt_tokens
        );

        Ok(EmbeddingResponse {
            vectors: parsed.data.into_iter().map(|d| d.embedding).collect(),
            prompt_tokens: parsed.usage.prompt_tokens,
        })
    }
}
