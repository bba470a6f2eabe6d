// Deterministic stand-ins for the embedding service, the vector index and
// the chat model, shared by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rag_agent::Result;
use rag_agent::database::{IndexRecord, IndexSpec, Metadata, SearchMatch, VectorIndex};
use rag_agent::embeddings::{Embedder, EmbeddingVector};
use rag_agent::llm::{ChatCompletion, ChatModel, ChatRequest, Role, ToolCall};

/// Keywords whose presence makes up each embedding dimension
pub const VOCABULARY: [&str; 10] = [
    "sky", "blue", "scatter", "water", "boil", "celsius", "earth", "rotat", "axis", "day",
];

/// Bag-of-keywords embedder: dimension `i` is 1.0 when `VOCABULARY[i]`
/// occurs in the lowercased text
#[derive(Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = text.to_lowercase();
        Ok(VOCABULARY
            .iter()
            .map(|keyword| if text.contains(keyword) { 1.0 } else { 0.0 })
            .collect())
    }
}

/// Brute-force cosine index kept in memory
#[derive(Default)]
pub struct MemoryIndex {
    records: Mutex<BTreeMap<String, (EmbeddingVector, Metadata)>>,
    indexes: Mutex<HashSet<String>>,
    creates: AtomicUsize,
    upserts: AtomicUsize,
}

impl MemoryIndex {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("lock should not be poisoned").len()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        let mut indexes = self.indexes.lock().expect("lock should not be poisoned");
        if indexes.insert(spec.name.clone()) {
            self.creates.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.records.lock().expect("lock should not be poisoned");
        let count = records.len();
        for record in records {
            stored.insert(record.id, (record.vector, record.metadata));
        }
        Ok(count)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<SearchMatch>> {
        let stored = self.records.lock().expect("lock should not be poisoned");
        let mut matches: Vec<SearchMatch> = stored
            .iter()
            .map(|(id, (values, metadata))| SearchMatch {
                id: id.clone(),
                score: cosine(vector, values),
                metadata: if include_metadata {
                    metadata.clone()
                } else {
                    Metadata::new()
                },
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(x * y)).sum();
    let norm = |v: &[f32]| v.iter().map(|x| f64::from(x * x)).sum::<f64>().sqrt();
    let denominator = norm(a) * norm(b);
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

/// Chat model that always calls `retrieve` with the user's question first,
/// then answers from whatever context the tool returned
#[derive(Default)]
pub struct ScriptedChatModel {
    tool_outputs: Mutex<Vec<String>>,
}

impl ScriptedChatModel {
    pub fn tool_outputs(&self) -> Vec<String> {
        self.tool_outputs
            .lock()
            .expect("lock should not be poisoned")
            .clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<ChatCompletion> {
        let tool_output = request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Tool)
            .and_then(|message| message.content.clone());

        let Some(context) = tool_output else {
            let prompt = request
                .messages
                .iter()
                .find(|message| message.role == Role::User)
                .and_then(|message| message.content.as_deref())
                .unwrap_or_default();
            let question = prompt.rsplit(": ").next().unwrap_or(prompt);

            return Ok(ChatCompletion {
                content: None,
                tool_calls: vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "retrieve".to_string(),
                    arguments: serde_json::json!({ "query": question }).to_string(),
                }],
                finish_reason: Some("tool_calls".to_string()),
            });
        };

        self.tool_outputs
            .lock()
            .expect("lock should not be poisoned")
            .push(context.clone());

        let found = context.contains("Rayleigh scattering");
        let content = match (request.response_format.is_some(), found) {
            (false, true) => {
                "The sky is blue because of Rayleigh scattering: air molecules scatter \
                 short blue wavelengths of sunlight far more than red ones."
                    .to_string()
            }
            (false, false) => "I could not find relevant information in the context.".to_string(),
            (true, true) => serde_json::json!({
                "answer": "Rayleigh scattering makes the sky look blue.",
                "sources": [context],
                "confidence": 0.9
            })
            .to_string(),
            (true, false) => serde_json::json!({
                "answer": "I could not find relevant information in the context.",
                "sources": [],
                "confidence": 0.0
            })
            .to_string(),
        };

        Ok(ChatCompletion {
            content: Some(content),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".to_string()),
        })
    }
}
