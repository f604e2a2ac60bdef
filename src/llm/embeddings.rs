use anyhow::{anyhow, Result};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::providers::traits::EmbeddingProvider;

pub const QUERY_CACHE_CAPACITY: usize = 256;
const BATCH_SIZE: usize = 32;

/// Embeds chunks and queries, checking every vector against the collection
/// size. Query vectors are cached since students repeat questions.
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    dimension: u64,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, dimension: u64) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            dimension,
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn dimension(&self) -> u64 {
        self.dimension
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.query_cache.lock().await.get(query) {
            tracing::debug!("Query embedding served from cache");
            return Ok(vector.clone());
        }

        let vector = self.provider.embed(query).await?;
        self.check_dimension(&vector)?;

        self.query_cache
            .lock()
            .await
            .put(query.to_string(), vector.clone());
        Ok(vector)
    }

    pub async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            let embedded = self.provider.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(anyhow!(
                    "Embedding provider returned {} vectors for {} texts",
                    embedded.len(),
                    batch.len()
                ));
            }
            for vector in &embedded {
                self.check_dimension(vector)?;
            }
            vectors.extend(embedded);
            tracing::debug!("Embedded {}/{} chunks", vectors.len(), texts.len());
        }
        Ok(vectors)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() as u64 != self.dimension {
            return Err(anyhow!(
                "Generated embedding has wrong size: {} (expected {})",
                vector.len(),
                self.dimension
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
        width: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32; self.width])
        }

        fn model_name(&self) -> String {
            "counting".to_string()
        }
    }

    fn generator(width: usize, dimension: u64) -> (Arc<CountingEmbedder>, EmbeddingGenerator) {
        let provider = Arc::new(CountingEmbedder {
            calls: AtomicUsize::new(0),
            width,
        });
        let generator = EmbeddingGenerator::new(provider.clone(), dimension);
        (provider, generator)
    }

    #[tokio::test]
    async fn test_repeated_query_hits_cache() {
        let (provider, generator) = generator(4, 4);

        let first = generator.embed_query("exam dates").await.unwrap();
        let second = generator.embed_query("exam dates").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_dimension_is_rejected() {
        let (_, generator) = generator(3, 384);
        let err = generator.embed_query("exam dates").await.unwrap_err();
        assert!(err.to_string().contains("expected 384"));
    }

    #[tokio::test]
    async fn test_documents_are_embedded_in_order() {
        let (provider, generator) = generator(2, 2);
        let texts: Vec<String> = (0..40).map(|i| "x".repeat(i + 1)).collect();

        let vectors = generator.embed_documents(&texts).await.unwrap();

        assert_eq!(vectors.len(), 40);
        assert_eq!(vectors[0], vec![1.0, 1.0]);
        assert_eq!(vectors[39], vec![40.0, 40.0]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 40);
    }
}
