// ABOUTME: Embedding coordinator: batch packing, dedup, retry, and cost ledger
// ABOUTME: Greedy-first packing under simultaneous token and item limits

use crate::provider::{price_per_million_tokens, truncate_to_tokens, EmbeddingProvider};
use codemem_core::{EmbeddingProviderKind, IndexError, Result};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One text to embed. `key` is the chunk or relation id reported in
/// failures; dedup is by `content_hash`.
#[derive(Debug, Clone)]
pub struct EmbedItem {
    pub key: String,
    pub content_hash: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

/// Monotonic accumulator for token and cost accounting across a run.
#[derive(Debug, Default)]
pub struct CostLedger {
    inner: Mutex<CostSummary>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostSummary {
    pub prompt_tokens: u64,
    pub requests: u64,
    pub estimated_usd: f64,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, tokens: usize, usd: f64) {
        let mut inner = self.inner.lock();
        inner.prompt_tokens += tokens as u64;
        inner.requests += 1;
        inner.estimated_usd += usd;
    }

    pub fn snapshot(&self) -> CostSummary {
        *self.inner.lock()
    }
}

pub struct EmbeddingCoordinator {
    provider: Arc<dyn EmbeddingProvider>,
    provider_kind: EmbeddingProviderKind,
    retry: RetryPolicy,
    ledger: Arc<CostLedger>,
}

impl EmbeddingCoordinator {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        provider_kind: EmbeddingProviderKind,
        ledger: Arc<CostLedger>,
    ) -> Self {
        Self {
            provider,
            provider_kind,
            retry: RetryPolicy::default(),
            ledger,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    pub fn ledger(&self) -> &CostLedger {
        &self.ledger
    }

    /// Embed every item, returning vectors keyed by item key. Identical
    /// content hashes are embedded once and fanned out.
    pub async fn embed_items(&self, items: Vec<EmbedItem>) -> Result<HashMap<String, Vec<f32>>> {
        if items.is_empty() {
            return Ok(HashMap::new());
        }

        let limits = self.provider.limits();
        let counter = self.provider.token_counter();

        // Dedup by content hash, remembering which keys share each hash.
        let mut fanout: HashMap<String, Vec<String>> = HashMap::new();
        let mut unique: Vec<EmbedItem> = Vec::new();
        for item in items {
            let entry = fanout.entry(item.content_hash.clone()).or_default();
            entry.push(item.key.clone());
            if entry.len() == 1 {
                unique.push(item);
            }
        }
        debug!("embedding {} unique texts", unique.len());

        // Greedy-first packing; a single over-budget text is truncated and
        // sent alone.
        let mut batches: Vec<Vec<EmbedItem>> = Vec::new();
        let mut current: Vec<EmbedItem> = Vec::new();
        let mut current_tokens = 0usize;
        for mut item in unique {
            let mut tokens = counter.count(&item.text);
            if tokens > limits.max_tokens {
                warn!(
                    "text for {} exceeds provider budget ({} tokens), truncating",
                    item.key, tokens
                );
                item.text = truncate_to_tokens(&item.text, limits.max_tokens, counter);
                tokens = limits.max_tokens;
            }
            let fits =
                current_tokens + tokens <= limits.max_tokens && current.len() < limits.max_items;
            if !fits && !current.is_empty() {
                batches.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            current_tokens += tokens;
            current.push(item);
        }
        if !current.is_empty() {
            batches.push(current);
        }

        let mut by_hash: HashMap<String, Vec<f32>> = HashMap::new();
        for batch in batches {
            let texts: Vec<String> = batch.iter().map(|i| i.text.clone()).collect();
            let response = self.call_with_retry(&texts, &batch[0].key).await?;

            let usd = price_per_million_tokens(self.provider_kind, self.provider.model())
                .map(|price| price * response.prompt_tokens as f64 / 1_000_000.0)
                .unwrap_or(0.0);
            self.ledger.record(response.prompt_tokens, usd);

            for (item, vector) in batch.into_iter().zip(response.vectors) {
                by_hash.insert(item.content_hash, vector);
            }
        }

        let mut result = HashMap::new();
        for (hash, keys) in fanout {
            if let Some(vector) = by_hash.get(&hash) {
                for key in keys {
                    result.insert(key, vector.clone());
                }
            }
        }
        Ok(result)
    }

    async fn call_with_retry(
        &self,
        texts: &[String],
        sample_key: &str,
    ) -> Result<crate::provider::EmbeddingResponse> {
        let mut last_message = String::new();
        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let backoff = self.retry.base_delay * 2u32.pow(attempt as u32 - 1);
                let jitter =
                    Duration::from_millis(rand::thread_rng().gen_range(0..=backoff.as_millis().max(1) as u64 / 2));
                tokio::time::sleep(backoff + jitter).await;
            }
            match self.provider.embed(texts).await {
                Ok(response) => return Ok(response),
                Err(error) => {
                    last_message = error.message.clone();
                    if !error.retryable {
                        break;
                    }
                    warn!(
                        "embedding attempt {}/{} failed: {}",
                        attempt + 1,
                        self.retry.max_attempts,
                        error.message
                    );
                }
            }
        }
        Err(IndexError::Embedding {
            chunk_id: sample_key.to_string(),
            detail: last_message,
        })
    }
}
