//! Shared helpers for integration tests
#![allow(dead_code)]

use chrono::Utc;
use lorekeeper::error::Result;
use lorekeeper::llm::{ChatOptions, GenerationResponse, LlmProvider, Message, TextStream};
use lorekeeper::models::{Chunk, Document, DocumentType};
use lorekeeper::store::SqliteStore;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// LLM provider stub driven by a script of canned replies
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    stream_deltas: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            stream_deltas: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_stream(deltas: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            stream_deltas: Mutex::new(deltas.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: &[Message], _: &ChatOptions) -> Result<GenerationResponse> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "out of scripted replies".to_string());

        Ok(GenerationResponse {
            text: reply,
            model: "scripted".to_string(),
            usage: None,
            finish_reason: Some("stop".to_string()),
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        _: &ChatOptions,
        _: CancellationToken,
    ) -> Result<TextStream> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let deltas: Vec<Result<String>> = self
            .stream_deltas
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        Ok(Box::pin(futures::stream::iter(deltas)))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Responds to `POST /embed` with one fixed vector per input
struct FixedEmbeddings {
    vector: Vec<f32>,
}

impl Respond for FixedEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        let count = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
        let embeddings: Vec<&Vec<f32>> = (0..count).map(|_| &self.vector).collect();
        ResponseTemplate::new(200).set_body_json(serde_json::json!({ "embeddings": embeddings }))
    }
}

/// Mount an embedding endpoint returning the same vector for every input
pub async fn mount_embeddings(server: &MockServer, vector: Vec<f32>) {
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(FixedEmbeddings { vector })
        .mount(server)
        .await;
}

/// A unit vector of the given dimension with weight on one axis
pub fn axis_vector(dimension: usize, axis: usize) -> Vec<f32> {
    let mut vector = vec![0.0; dimension];
    vector[axis % dimension] = 1.0;
    vector
}

/// Insert a ready document with the given chunk contents and embeddings
pub async fn seed_ready_document(
    store: &SqliteStore,
    campaign_id: Uuid,
    name: &str,
    document_type: DocumentType,
    chunks: &[(&str, Vec<f32>)],
) -> Document {
    let document = Document::new(campaign_id, name, document_type, "text/plain");
    store.insert_document(&document).await.unwrap();

    let rows: Vec<Chunk> = chunks
        .iter()
        .enumerate()
        .map(|(i, (content, embedding))| Chunk {
            id: Uuid::new_v4(),
            document_id: document.id,
            campaign_id,
            content: content.to_string(),
            embedding: embedding.clone(),
            chunk_index: i as i64,
            token_count: content.len().div_ceil(4) as i64,
            page_number: None,
            section: None,
            created_at: Utc::now(),
        })
        .collect();

    store.insert_chunks(&rows).await.unwrap();
    store
        .finalize_document(document.id, rows.len() as i64)
        .await
        .unwrap();

    store.get_document(document.id).await.unwrap().unwrap()
}
