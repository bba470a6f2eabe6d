use super::*;
use crate::database::{Metric, SearchMatch};
use crate::llm::{ChatCompletion, ChatRequest, Role};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;

#[derive(Default)]
struct CountingEmbedder {
    seen: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.seen
            .lock()
            .expect("lock should not be poisoned")
            .push(text.to_string());
        if self.fail_on.as_deref() == Some(text) {
            return Err(RagError::Upstream {
                service: crate::Service::OpenAi,
                status: 429,
                message: "Rate limit reached".to_string(),
            });
        }
        Ok(vec![text.len() as f32, 1.0])
    }
}

#[derive(Default)]
struct RecordingIndex {
    ensured: Mutex<Vec<IndexSpec>>,
    upserts: Mutex<Vec<Vec<IndexRecord>>>,
}

#[async_trait]
impl VectorIndex for RecordingIndex {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        self.ensured
            .lock()
            .expect("lock should not be poisoned")
            .push(spec.clone());
        Ok(())
    }

    async fn upsert(&self, records: Vec<IndexRecord>) -> Result<usize> {
        let count = records.len();
        self.upserts
            .lock()
            .expect("lock should not be poisoned")
            .push(records);
        Ok(count)
    }

    async fn query(
        &self,
        _vector: &[f32],
        _top_k: usize,
        _include_metadata: bool,
    ) -> Result<Vec<SearchMatch>> {
        Ok(Vec::new())
    }
}

/// Answers immediately and remembers the user prompt it was given
#[derive(Default)]
struct EchoModel {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatModel for EchoModel {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<ChatCompletion> {
        let prompt = request
            .messages
            .iter()
            .find(|message| message.role == Role::User)
            .and_then(|message| message.content.clone())
            .unwrap_or_default();
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .push(prompt);

        let content = if request.response_format.is_some() {
            r#"{"answer":"42","sources":[],"confidence":0.5}"#.to_string()
        } else {
            "42".to_string()
        };
        Ok(ChatCompletion {
            content: Some(content),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".to_string()),
        })
    }
}

fn spec() -> IndexSpec {
    IndexSpec {
        name: "rag-documents".to_string(),
        dimension: 2,
        metric: Metric::Cosine,
    }
}

fn metadata(value: Value) -> Metadata {
    value.as_object().cloned().unwrap_or_default()
}

fn context(
    embedder: Arc<CountingEmbedder>,
    index: Arc<RecordingIndex>,
    model: Arc<EchoModel>,
) -> RagContext {
    RagContext::new(embedder, index, model, spec())
}

#[tokio::test]
async fn index_documents_embeds_each_text_and_upserts_once() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(RecordingIndex::default());
    let rag = context(
        embedder.clone(),
        index.clone(),
        Arc::new(EchoModel::default()),
    );

    let texts = vec![
        "The sky is blue because of Rayleigh scattering.".to_string(),
        "Water boils at 100 degrees Celsius at sea level.".to_string(),
        "The Earth rotates on its axis once every 24 hours.".to_string(),
    ];
    let metadata = vec![
        metadata(json!({"topic": "atmosphere"})),
        metadata(json!({"topic": "physics"})),
        metadata(json!({"topic": "astronomy"})),
    ];

    let indexed = rag
        .index_documents(&texts, &metadata)
        .await
        .expect("indexing should succeed");
    assert_eq!(indexed, 3);

    assert_eq!(
        *embedder.seen.lock().expect("lock should not be poisoned"),
        texts
    );
    assert_eq!(
        *index.ensured.lock().expect("lock should not be poisoned"),
        vec![spec()]
    );

    let upserts = index.upserts.lock().expect("lock should not be poisoned");
    assert_eq!(upserts.len(), 1);
    let records = &upserts[0];
    assert_eq!(records.len(), 3);
    for (position, record) in records.iter().enumerate() {
        assert_eq!(record.id, position.to_string());
        assert_eq!(record.metadata["text"], texts[position].as_str());
        assert_eq!(record.metadata["topic"], metadata[position]["topic"]);
        assert_eq!(record.vector, vec![texts[position].len() as f32, 1.0]);
    }
}

#[tokio::test]
async fn caller_text_key_is_replaced() {
    let index = Arc::new(RecordingIndex::default());
    let rag = context(
        Arc::new(CountingEmbedder::default()),
        index.clone(),
        Arc::new(EchoModel::default()),
    );

    rag.index_documents(
        &["actual text".to_string()],
        &[metadata(json!({"text": "stale", "source": "notes"}))],
    )
    .await
    .expect("indexing should succeed");

    let upserts = index.upserts.lock().expect("lock should not be poisoned");
    assert_eq!(upserts[0][0].metadata["text"], "actual text");
    assert_eq!(upserts[0][0].metadata["source"], "notes");
}

#[tokio::test]
async fn mismatched_lengths_are_rejected_before_any_call() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(RecordingIndex::default());
    let rag = context(
        embedder.clone(),
        index.clone(),
        Arc::new(EchoModel::default()),
    );

    let result = rag
        .index_documents(&["one".to_string(), "two".to_string()], &[Metadata::new()])
        .await;

    assert!(matches!(result, Err(RagError::InvalidInput(_))));
    assert!(
        index
            .ensured
            .lock()
            .expect("lock should not be poisoned")
            .is_empty()
    );
    assert!(
        embedder
            .seen
            .lock()
            .expect("lock should not be poisoned")
            .is_empty()
    );
}

#[tokio::test]
async fn empty_input_only_ensures_index() {
    let embedder = Arc::new(CountingEmbedder::default());
    let index = Arc::new(RecordingIndex::default());
    let rag = context(
        embedder.clone(),
        index.clone(),
        Arc::new(EchoModel::default()),
    );

    let indexed = rag
        .index_documents(&[], &[])
        .await
        .expect("empty indexing should succeed");

    assert_eq!(indexed, 0);
    assert_eq!(
        index.ensured.lock().expect("lock should not be poisoned").len(),
        1
    );
    assert!(
        index
            .upserts
            .lock()
            .expect("lock should not be poisoned")
            .is_empty()
    );
    assert!(
        embedder
            .seen
            .lock()
            .expect("lock should not be poisoned")
            .is_empty()
    );
}

#[tokio::test]
async fn embedding_failure_skips_upsert() {
    let embedder = Arc::new(CountingEmbedder {
        fail_on: Some("second".to_string()),
        ..CountingEmbedder::default()
    });
    let index = Arc::new(RecordingIndex::default());
    let rag = context(embedder, index.clone(), Arc::new(EchoModel::default()));

    let texts = vec![
        "first".to_string(),
        "second".to_string(),
        "third".to_string(),
    ];
    let result = rag
        .index_documents(&texts, &vec![Metadata::new(); 3])
        .await;

    assert!(matches!(
        result,
        Err(RagError::Upstream { status: 429, .. })
    ));
    assert!(
        index
            .upserts
            .lock()
            .expect("lock should not be poisoned")
            .is_empty()
    );
}

#[tokio::test]
async fn index_accepts_documents() {
    let index = Arc::new(RecordingIndex::default());
    let rag = context(
        Arc::new(CountingEmbedder::default()),
        index.clone(),
        Arc::new(EchoModel::default()),
    );

    let documents = vec![
        Document::new("alpha").with_metadata("topic", "letters"),
        Document::new("beta"),
    ];
    let indexed = rag.index(documents).await.expect("indexing should succeed");

    assert_eq!(indexed, 2);
    let upserts = index.upserts.lock().expect("lock should not be poisoned");
    assert_eq!(upserts[0][0].metadata["topic"], "letters");
    assert_eq!(upserts[0][1].metadata.len(), 1);
}

#[tokio::test]
async fn query_wraps_question_in_prompt() {
    let model = Arc::new(EchoModel::default());
    let rag = context(
        Arc::new(CountingEmbedder::default()),
        Arc::new(RecordingIndex::default()),
        model.clone(),
    );

    let answer = rag
        .query("what is the answer?")
        .await
        .expect("query should succeed");
    assert_eq!(answer, "42");

    let structured = rag
        .query_structured("what is the answer?")
        .await
        .expect("structured query should succeed");
    assert_eq!(structured.answer, "42");

    let prompts = model.prompts.lock().expect("lock should not be poisoned");
    assert_eq!(
        prompts[0],
        "Use the retrieve tool to find relevant information and answer this question: what is the answer?"
    );
    assert_eq!(prompts[0], prompts[1]);
}

#[test]
fn from_config_requires_api_keys() {
    let result = RagContext::from_config(&Config::default());
    assert!(matches!(result, Err(RagError::Config(message)) if message.contains("OPENAI_API_KEY")));
}

#[test]
fn from_config_uses_configured_index() {
    let mut config = Config::default();
    config.openai.api_key = "sk-test".to_string();
    config.pinecone.api_key = "pc-test".to_string();
    config.pinecone.index_name = "science-notes".to_string();

    let rag = RagContext::from_config(&config).expect("context should build");

    assert_eq!(
        *rag.index_spec(),
        IndexSpec {
            name: "science-notes".to_string(),
            dimension: 1536,
            metric: Metric::Cosine,
        }
    );
}

#[test]
fn document_metadata_is_optional() {
    let documents: Vec<Document> = serde_json::from_value(json!([
        {"text": "plain"},
        {"text": "tagged", "metadata": {"topic": "physics"}}
    ]))
    .expect("documents should parse");

    assert!(documents[0].metadata.is_empty());
    assert_eq!(documents[1].metadata["topic"], "physics");
}
