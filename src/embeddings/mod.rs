// Embeddings module
// The Embedder seam and the OpenAI embeddings client

pub mod openai;

use async_trait::async_trait;
use tracing::error;

use crate::Result;

pub use openai::OpenAiEmbedder;

/// Dense vector produced by an embedding model
pub type EmbeddingVector = Vec<f32>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Embed each text in order, one request per text.
    ///
    /// Stops at the first failure and returns that error unchanged; the
    /// failing position is logged.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (position, text) in texts.iter().enumerate() {
            match self.embed(text).await {
                Ok(vector) => vectors.push(vector),
                Err(e) => {
                    error!("Embedding failed for text at position {}: {}", position, e);
                    return Err(e);
                }
            }
        }

        Ok(vectors)
    }
}
