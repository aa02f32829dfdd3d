use crate::error::{RetrievalError, Result};
use crate::traits::EmbeddingProvider;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Vector size of `text-embedding-3-small`.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
pub const DEFAULT_BATCH_SIZE: usize = 16;
/// Roughly 8191 tokens.
pub const MAX_INPUT_CHARS: usize = 32_000;

const EMPTY_INPUT_PLACEHOLDER: &str = " ";

/// Batched, order-preserving front for an [`EmbeddingProvider`].
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    model: String,
    dimensions: usize,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, model: impl Into<String>, dimensions: usize) -> Self {
        let model = model.into();
        info!(provider = provider.name(), model = %model, dimensions, "embedding service ready");
        Self {
            provider,
            model,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RetrievalError::validation("text to embed must not be empty"));
        }

        let input = truncate_chars(text, MAX_INPUT_CHARS).to_string();
        debug!(text_length = input.chars().count(), "generating embedding");

        let mut vectors = self.call_provider(std::slice::from_ref(&input)).await.map_err(|err| {
            error!(error = %err, text_length = input.chars().count(), "embedding request failed");
            err
        })?;

        let vector = vectors.pop().ok_or_else(|| {
            RetrievalError::provider(self.provider.name(), "provider returned no embedding")
        })?;
        debug!(dimensions = vector.len(), "embedding generated");
        Ok(vector)
    }

    /// Embeds `texts` in groups of `batch_size`, one provider call per group,
    /// strictly in sequence. The first failing group aborts the whole call.
    pub async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(RetrievalError::validation("batch of texts must not be empty"));
        }
        if batch_size == 0 {
            return Err(RetrievalError::validation("batch size must be positive"));
        }

        info!(total_texts = texts.len(), batch_size, "generating embeddings in batches");

        let mut embeddings = Vec::with_capacity(texts.len());
        for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
            let cleaned: Vec<String> = batch
                .iter()
                .map(|text| {
                    if text.is_empty() {
                        EMPTY_INPUT_PLACEHOLDER.to_string()
                    } else {
                        truncate_chars(text, MAX_INPUT_CHARS).to_string()
                    }
                })
                .collect();

            let vectors = self.call_provider(&cleaned).await.map_err(|err| {
                error!(batch_index, error = %err, "embedding batch failed");
                err
            })?;

            debug!(batch_index, batch_size = batch.len(), "embedding batch processed");
            embeddings.extend(vectors);
        }

        info!(total_embeddings = embeddings.len(), "embeddings generated");
        Ok(embeddings)
    }

    async fn call_provider(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let provider = self.provider.name();
        let vectors = self
            .provider
            .create_embeddings(inputs, &self.model)
            .await
            .map_err(|err| match err {
                provider_error @ RetrievalError::Provider { .. } => provider_error,
                other => RetrievalError::provider(provider, other),
            })?;

        if vectors.len() != inputs.len() {
            return Err(RetrievalError::provider(
                provider,
                format!("expected {} embeddings, got {}", inputs.len(), vectors.len()),
            ));
        }
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != self.dimensions) {
            return Err(RetrievalError::provider(
                provider,
                format!("embedding dimension {} != {}", vector.len(), self.dimensions),
            ));
        }

        Ok(vectors)
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
