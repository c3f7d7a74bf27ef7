use crate::provider::{
    BatchLimits, EmbeddingProvider, EmbeddingResponse, HeuristicTokenCounter, ProviderCallError,
    TokenCounter,
};
use async_trait::async_trait;
use codemem_core::{EmbeddingProviderKind, IndexError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VoyageConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

impl VoyageConfig {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            api_base: "https://api.voyageai.com/v1".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
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
    total_tokens: usize,
}

pub struct VoyageProvider {
    config: VoyageConfig,
    client: Client,
    counter: HeuristicTokenCounter,
}

impl VoyageProvider {
    pub fn new(config: VoyageConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(IndexError::Config(
                "Voyage embedding requires EMBEDDING_API_KEY".to_string(),
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
impl EmbeddingProvider for VoyageProvider {
    fn name(&self) -> &'static str {
        EmbeddingProviderKind::Voyage.as_str()
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        EmbeddingProviderKind::Voyage.dimension_for(&self.config.model)
    }

    fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_tokens: 120_000,
            max_items: 128,
        }
    }

    fn token_counter(&self) -> &dyn TokenCounter {
        &self.counter
    }

    async fn embed(&self, texts: &[String]) -> std::result::Result<EmbeddingResponse, ProviderCallError> {
        let request = EmbeddingRequest {
            input: texts,
            model: &self.config.model,
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
                    ProviderCallError::transient(format!("voyage request failed: {e}"))
                } else {
                    ProviderCallError::hard(format!("voyage request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let retryable = status.as_u16() == 429 || status.is_server_error();
            return Err(ProviderCallError {
                retryable,
                message: format!("voyage returned {}: {}", status, body),
            });
        }

        let mut parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderCallError::hard(format!("voyage response unreadable: {e}")))?;
        parsed.data.sort_by_key(|d| d.index);
        if parsed.data.len() != texts.len() {
            return Err(ProviderCallError::hard(format!(
                "voyage returned {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        Ok(EmbeddingResponse {
            vectors: parsed.data.into_iter().map(|d| d.embedding).collect(),
            prompt_tokens: parsed.usage.total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_dimension_is_512() {
        let provider = VoyageProvider::new(VoyageConfig::new(
            "key".to_string(),
            "voyage-3-lite".to_string(),
        ))
        .unwrap();
        assert_eq!(provider.dimension(), 512);
        assert_eq!(provider.name(), "voyage");
    }
}
