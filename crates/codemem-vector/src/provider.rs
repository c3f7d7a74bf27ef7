use async_trait::async_trait;
use codemem_core::EmbeddingProviderKind;

/// Token accounting seam. An exact tokenizer is an optional capability; the
/// byte heuristic is always available.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// `max(1, bytes / 4)` approximation, used whenever no exact tokenizer is
/// wired in for the active model.
#[derive(Debug)]
pub struct HeuristicTokenCounter;

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        (text.len() / 4).max(1)
    }
}

/// Provider-specific packing limits, enforced simultaneously.
#[derive(Debug, Clone, Copy)]
pub struct BatchLimits {
    pub max_tokens: usize,
    pub max_items: usize,
}

/// Vectors plus the provider-reported token usage for one request.
#[derive(Debug, Clone)]
pub struct EmbeddingResponse {
    pub vectors: Vec<Vec<f32>>,
    pub prompt_tokens: usize,
}

/// Classified failure from a single provider call. The coordinator decides
/// whether to retry.
#[derive(Debug, Clone)]
pub struct ProviderCallError {
    pub retryable: bool,
    pub message: String,
}

impl ProviderCallError {
    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self {
            retryable: true,
            message: message.into(),
        }
    }

    pub fn hard<S: Into<String>>(message: S) -> Self {
        Self {
            retryable: false,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ProviderCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Text -> vector black box. One call embeds one packed batch.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn model(&self) -> &str;
    fn dimension(&self) -> usize;
    fn limits(&self) -> BatchLimits;
    fn token_counter(&self) -> &dyn TokenCounter;

    async fn embed(&self, texts: &[String]) -> Result<EmbeddingResponse, ProviderCallError>;
}

/// Static price table, USD per million tokens, keyed by (provider, model).
pub fn price_per_million_tokens(provider: EmbeddingProviderKind, model: &str) -> Option<f64> {
    match (provider, model) {
        (EmbeddingProviderKind::OpenAi, "text-embedding-3-small") => Some(0.02),
        (EmbeddingProviderKind::OpenAi, "text-embedding-3-large") => Some(0.13),
        (EmbeddingProviderKind::OpenAi, "text-embedding-ada-002") => Some(0.10),
        (EmbeddingProviderKind::Voyage, "voyage-3-lite") => Some(0.02),
        (EmbeddingProviderKind::Voyage, "voyage-3") => Some(0.06),
        (EmbeddingProviderKind::Voyage, "voyage-code-3") => Some(0.18),
        _ => None,
    }
}

/// Truncate to a token budget at a char boundary, heuristic accounting.
pub fn truncate_to_tokens(text: &str, max_tokens: usize, counter: &dyn TokenCounter) -> String {
    if counter.count(text) <= max_tokens {
        return text.to_string();
    }
    let budget_bytes = max_tokens.saturating_mul(4);
    let mut end = budget_bytes.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_counter_floors_at_one() {
        let counter = HeuristicTokenCounter;
        assert_eq!(counter.count(""), 1);
        assert_eq!(counter.count("ab"), 1);
        assert_eq!(counter.count("abcdefgh"), 2);
    }

    #[test]
    fn price_table_covers_both_providers() {
        assert_eq!(
            price_per_million_tokens(EmbeddingProviderKind::OpenAi, "text-embedding-3-small"),
            Some(0.02)
        );
        assert_eq!(
            price_per_million_tokens(EmbeddingProviderKind::Voyage, "voyage-3-lite"),
            Some(0.02)
        );
        assert_eq!(
            price_per_million_tokens(EmbeddingProviderKind::OpenAi, "unknown-model"),
            None
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let counter = HeuristicTokenCounter;
        let text = "é".repeat(100);
        let truncated = truncate_to_tokens(&text, 10, &counter);
        assert!(truncated.len() <= 40);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn short_text_is_untouched() {
        let counter = HeuristicTokenCounter;
        assert_eq!(truncate_to_tokens("short", 100, &counter), "short");
    }
}
