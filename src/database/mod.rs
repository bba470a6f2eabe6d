// Vector database module
// Record types, the VectorIndex seam, and the Pinecone implementation

pub mod pinecone;

use std::borrow::Cow;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;
use crate::embeddings::EmbeddingVector;

pub use pinecone::PineconeIndex;

/// Free-form metadata stored next to each vector
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key holding the original document text
pub const TEXT_KEY: &str = "text";

/// Similarity metric an index is created with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
    Euclidean,
    DotProduct,
}

impl fmt::Display for Metric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cosine => f.write_str("cosine"),
            Self::Euclidean => f.write_str("euclidean"),
            Self::DotProduct => f.write_str("dotproduct"),
        }
    }
}

/// Parameters an index is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

/// A vector with its id and metadata, as written to the index
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub vector: EmbeddingVector,
    pub metadata: Metadata,
}

/// A ranked hit returned by a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchMatch {
    pub id: String,
    pub score: f64,
    pub metadata: Metadata,
}

impl SearchMatch {
    /// The stored document text; missing or null renders as empty
    #[inline]
    pub fn text(&self) -> Cow<'_, str> {
        match self.metadata.get(TEXT_KEY) {
            Some(Value::String(text)) => Cow::Borrowed(text.as_str()),
            None | Some(Value::Null) => Cow::Borrowed(""),
            Some(other) => Cow::Owned(other.to_string()),
        }
    }
}

/// Remote vector index operations used by the pipeline
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the index described by `spec` unless it already exists, and
    /// wait until it accepts writes
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Write records, overwriting any existing record with the same id.
    /// Returns the number of records the service acknowledged.
    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize>;

    /// Return at most `top_k` matches ordered by descending score
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<SearchMatch>>;
}
