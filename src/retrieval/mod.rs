//! Retrieval tool exposed to the agent.
//!
//! Embeds a query, runs a similarity search, keeps only matches whose score
//! is strictly above the relevance threshold and renders them as context
//! blocks the model reads as part of its prompt:
//!
//! ```text
//! Context (relevance: 0.92):
//! The sky is blue because of Rayleigh scattering of sunlight.
//!
//! Context (relevance: 0.75):
//! ...
//! ```
//!
//! When nothing clears the threshold the tool answers [`NO_CONTEXT`].


use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::Result;
use crate::database::{SearchMatch, VectorIndex};
use crate::embeddings::{Embedder, EmbeddingVector};
use crate::llm::ToolDefinition;

pub const TOOL_NAME: &str = "retrieve";
pub const TOOL_DESCRIPTION: &str =
    "Retrieve relevant documents based on the query using vector similarity search.";
pub const NO_CONTEXT: &str = "No relevant context found.";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_RELEVANCE_THRESHOLD: f64 = 0.7;

/// The two operations retrieval needs from the outside world
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Similarity search including metadata, best match first
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchMatch>>;
}

/// Embedder and vector index bundled as a [`RetrievalBackend`]
#[derive(Clone)]
pub struct RetrievalDeps {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl RetrievalDeps {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl RetrievalBackend for RetrievalDeps {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.embedder.embed(text).await
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<SearchMatch>> {
        self.index.query(vector, top_k, true).await
    }
}

/// Arguments the model passes when calling the tool
#[derive(Debug, Deserialize)]
pub struct RetrieveArgs {
    pub query: String,
}

#[derive(Clone)]
pub struct RetrievalTool {
    backend: Arc<dyn RetrievalBackend>,
    top_k: usize,
    relevance_threshold: f64,
}

impl RetrievalTool {
    #[inline]
    pub fn new(backend: Arc<dyn RetrievalBackend>) -> Self {
        Self {
            backend,
            top_k: DEFAULT_TOP_K,
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }

    #[inline]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[inline]
    pub fn with_relevance_threshold(mut self, threshold: f64) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    /// Declaration handed to the chat model
    #[inline]
    pub fn definition() -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            description: TOOL_DESCRIPTION.to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        }
    }

    /// Run the tool for `query` and return the formatted context
    #[inline]
    pub async fn retrieve(&self, query: &str) -> Result<String> {
        debug!("Retrieving context for query: '{}'", query);

        let vector = self.backend.embed(query).await?;
        let matches = self.backend.search(&vector, self.top_k).await?;

        debug!(
            "Search returned {} matches (threshold {})",
            matches.len(),
            self.relevance_threshold
        );
        Ok(format_context(&matches, self.relevance_threshold))
    }
}

/// Render matches scoring strictly above `threshold` as context blocks
#[inline]
pub fn format_context(matches: &[SearchMatch], threshold: f64) -> String {
    let blocks: Vec<String> = matches
        .iter()
        .filter(|m| m.score > threshold)
        .map(|m| format!("Context (relevance: {:.2}):\n{}", m.score, m.text()))
        .collect();

    if blocks.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        blocks.join("\n\n")
    }
}
