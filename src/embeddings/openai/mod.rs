
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::{Embedder, EmbeddingVector};
use crate::config::OpenAiConfig;
use crate::http::{Auth, JsonClient, blocking, endpoint};
use crate::{RagError, Result, Service};

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Client for the OpenAI embeddings endpoint
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: JsonClient,
    url: Url,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .map_err(|e| RagError::Config(e.to_string()))?;

        Ok(Self {
            client: JsonClient::new(
                Service::OpenAi,
                Auth::Bearer(config.api_key.clone()),
                Duration::from_secs(config.timeout_seconds),
            ),
            url: endpoint(&base_url, "embeddings")?,
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Generate the embedding for a single text on the calling thread
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> Result<EmbeddingVector> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };
        let response: EmbedResponse = self.client.post(&self.url, &request)?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| RagError::UnexpectedResponse {
                service: Service::OpenAi,
                message: "Embedding response contained no data".to_string(),
            })?;

        if embedding.len() != self.dimension {
            return Err(RagError::UnexpectedResponse {
                service: Service::OpenAi,
                message: format!(
                    "Model {} returned {} dimensions, expected {}",
                    self.model,
                    embedding.len(),
                    self.dimension
                ),
            });
        }

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let embedder = self.clone();
        let text = text.to_string();
        blocking(move || embedder.generate_embedding(&text)).await
    }
}
