//! Pipeline entry points.
//!
//! [`RagContext`] owns the embedder, the vector index and the agent. It is
//! built once at startup (usually with [`RagContext::from_config`]) and
//! passed to whatever drives indexing and querying.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::agent::{Agent, StructuredAnswer};
use crate::config::{Config, RetrievalConfig};
use crate::database::{IndexRecord, IndexSpec, Metadata, PineconeIndex, TEXT_KEY, VectorIndex};
use crate::embeddings::{Embedder, EmbeddingVector, OpenAiEmbedder};
use crate::llm::{ChatModel, OpenAiChat};
use crate::retrieval::{RetrievalDeps, RetrievalTool};
use crate::{RagError, Result};

/// A text to index together with caller-supplied metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    #[inline]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub struct RagContext {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    agent: Agent,
    index_spec: IndexSpec,
}

impl RagContext {
    /// Wire up the OpenAI and Pinecone clients described by `config`
    ///
    /// Fails with [`RagError::Config`] when either API key is missing.
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        config
            .require_credentials()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let timeout = Duration::from_secs(config.openai.timeout_seconds);
        let embedder = Arc::new(OpenAiEmbedder::new(&config.openai)?);
        let index = Arc::new(PineconeIndex::new(&config.pinecone, timeout)?);
        let model = Arc::new(OpenAiChat::new(&config.openai)?);

        let index_spec = IndexSpec {
            name: config.pinecone.index_name.clone(),
            dimension: config.openai.embedding_dimension,
            metric: config.pinecone.metric,
        };

        info!(
            "Using index '{}' with {} ({} dimensions) and chat model {}",
            index_spec.name,
            embedder.model(),
            index_spec.dimension,
            model.model()
        );

        Ok(Self::with_settings(
            embedder,
            index,
            model,
            index_spec,
            &config.retrieval,
        ))
    }

    /// Build a context with default retrieval settings
    #[inline]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn ChatModel>,
        index_spec: IndexSpec,
    ) -> Self {
        Self::with_settings(
            embedder,
            index,
            model,
            index_spec,
            &RetrievalConfig::default(),
        )
    }

    #[inline]
    pub fn with_settings(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        model: Arc<dyn ChatModel>,
        index_spec: IndexSpec,
        retrieval: &RetrievalConfig,
    ) -> Self {
        let backend = Arc::new(RetrievalDeps::new(embedder.clone(), index.clone()));
        let tool = RetrievalTool::new(backend)
            .with_top_k(retrieval.top_k)
            .with_relevance_threshold(retrieval.relevance_threshold);
        let agent = Agent::new(model, tool).with_max_tool_rounds(retrieval.max_tool_rounds);

        Self {
            embedder,
            index,
            agent,
            index_spec,
        }
    }

    #[inline]
    pub fn index_spec(&self) -> &IndexSpec {
        &self.index_spec
    }

    /// Embed `texts` and upsert them with their `metadata`
    ///
    /// The index is created first if it does not exist. Each text is embedded
    /// with its own request, in order; the records are written with a single
    /// upsert. Record ids are the positions of the texts (`"0"`, `"1"`, ...)
    /// and every record stores its text under the `"text"` metadata key.
    ///
    /// # Arguments
    /// * `texts` - Document texts to index
    /// * `metadata` - One metadata map per text
    ///
    /// # Returns
    /// The number of records the index acknowledged.
    #[inline]
    pub async fn index_documents(&self, texts: &[String], metadata: &[Metadata]) -> Result<usize> {
        if texts.len() != metadata.len() {
            return Err(RagError::InvalidInput(format!(
                "Got {} texts but {} metadata entries",
                texts.len(),
                metadata.len()
            )));
        }

        self.index.ensure_index(&self.index_spec).await?;

        if texts.is_empty() {
            debug!("Nothing to index");
            return Ok(0);
        }

        info!("Embedding {} documents", texts.len());
        let vectors = self.embedder.embed_many(texts).await?;
        let records = build_records(texts, metadata, vectors);

        let upserted = self.index.upsert(records).await?;
        info!(
            "Indexed {} documents into '{}'",
            upserted, self.index_spec.name
        );
        Ok(upserted)
    }

    /// Index owned documents; see [`RagContext::index_documents`]
    #[inline]
    pub async fn index(&self, documents: Vec<Document>) -> Result<usize> {
        let (texts, metadata): (Vec<String>, Vec<Metadata>) = documents
            .into_iter()
            .map(|document| (document.text, document.metadata))
            .unzip();
        self.index_documents(&texts, &metadata).await
    }

    /// Answer `question` using retrieved context
    #[inline]
    pub async fn query(&self, question: &str) -> Result<String> {
        info!("Answering question: '{}'", question);
        self.agent.run(&question_prompt(question)).await
    }

    /// Like [`RagContext::query`], with the answer constrained to
    /// [`StructuredAnswer`]
    #[inline]
    pub async fn query_structured(&self, question: &str) -> Result<StructuredAnswer> {
        info!("Answering question (structured): '{}'", question);
        self.agent.run_structured(&question_prompt(question)).await
    }
}

/// User prompt wrapping the caller's question
#[inline]
pub fn question_prompt(question: &str) -> String {
    format!(
        "Use the retrieve tool to find relevant information and answer this question: {}",
        question
    )
}

fn build_records(
    texts: &[String],
    metadata: &[Metadata],
    vectors: Vec<EmbeddingVector>,
) -> Vec<IndexRecord> {
    texts
        .iter()
        .zip(metadata)
        .zip(vectors)
        .enumerate()
        .map(|(position, ((text, metadata), vector))| {
            let mut metadata = metadata.clone();
            metadata.insert(TEXT_KEY.to_string(), Value::String(text.clone()));
            IndexRecord {
                id: position.to_string(),
                vector,
                metadata,
            }
        })
        .collect()
}
