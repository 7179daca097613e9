use async_trait::async_trait;
use dashmap::DashMap;
use prompt::EndpointError;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::embeddings::Embedder;

/// Embeddings keyed by the SHA-256 of their text.
#[derive(Clone, Default)]
pub struct EmbeddingCache {
    embeddings: Arc<DashMap<String, Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, text: &str, embedding: Vec<f32>) {
        self.embeddings.insert(hash_text(text), embedding);
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.embeddings.get(&hash_text(text)).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Wraps an embedder so repeated texts are embedded once.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: EmbeddingCache,
}

impl<E: Embedder> CachedEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(),
        }
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl<E: Embedder> Embedder for CachedEmbedder<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EndpointError> {
        if let Some(hit) = self.cache.get(text) {
            tracing::debug!(chars = text.len(), "Embedding cache hit");
            return Ok(hit);
        }

        let embedding = self.inner.embed(text).await?;
        self.cache.set(text, embedding.clone());
        Ok(embedding)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
