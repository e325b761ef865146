//! Core domain types: documents, chunks, retrieval and answer results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Canonical embedding dimension expected by the chunk store
pub const EMBEDDING_DIMENSION: usize = 768;

/// Kind of uploaded campaign document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Rulebook,
    Setting,
    Notes,
    Map,
    Image,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Rulebook => "rulebook",
            DocumentType::Setting => "setting",
            DocumentType::Notes => "notes",
            DocumentType::Map => "map",
            DocumentType::Image => "image",
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "rulebook" => Ok(DocumentType::Rulebook),
            "setting" => Ok(DocumentType::Setting),
            "notes" => Ok(DocumentType::Notes),
            "map" => Ok(DocumentType::Map),
            "image" => Ok(DocumentType::Image),
            other => Err(format!("unknown document type: {}", other)),
        }
    }
}

/// Indexing lifecycle state of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Ready => "ready",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentStatus::Pending),
            "processing" => Ok(DocumentStatus::Processing),
            "ready" => Ok(DocumentStatus::Ready),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status: {}", other)),
        }
    }
}

/// A user-uploaded campaign artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub name: String,
    pub document_type: DocumentType,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub failure_message: Option<String>,
    pub metadata: HashMap<String, String>,
    pub chunk_count: i64,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document in the `pending` state
    pub fn new(
        campaign_id: Uuid,
        name: impl Into<String>,
        document_type: DocumentType,
        mime_type: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            name: name.into(),
            document_type,
            mime_type: mime_type.into(),
            status: DocumentStatus::Pending,
            failure_message: None,
            metadata: HashMap::new(),
            chunk_count: 0,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// An embedded searchable segment of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub document_id: Uuid,
    pub campaign_id: Uuid,
    pub content: String,
    pub embedding: Vec<f32>,
    pub chunk_index: i64,
    pub token_count: i64,
    pub page_number: Option<i64>,
    pub section: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A fused retrieval hit
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub document: Document,
    /// Fused score in [0, 1]
    pub score: f32,
    pub vector_score: f32,
    pub keyword_score: f32,
}

/// A cited source inside a built context
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextSource {
    /// 1-based citation index
    pub index: usize,
    pub document_id: Uuid,
    pub document_name: String,
    pub document_type: DocumentType,
    pub page_number: Option<i64>,
    pub section: Option<String>,
    pub relevance_score: f32,
}

/// Prompt context assembled under a token budget
#[derive(Debug, Clone, Serialize)]
pub struct BuiltContext {
    pub context_text: String,
    pub sources: Vec<ContextSource>,
    pub chunks_used: usize,
    pub estimated_tokens: usize,
}

impl BuiltContext {
    pub fn empty() -> Self {
        Self {
            context_text: String::new(),
            sources: Vec::new(),
            chunks_used: 0,
            estimated_tokens: 0,
        }
    }
}

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// A message in a campaign conversation thread
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<ContextSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            sources: None,
            confidence: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            sources: None,
            confidence: None,
        }
    }
}

/// Three-level confidence label exposed by the query API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    /// Map an internal confidence score onto the public label
    pub fn from_score(score: f32) -> Self {
        if score >= 0.7 {
            ConfidenceLabel::High
        } else if score >= 0.4 {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}

/// An indexing task travelling through the `document-indexing` queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexJob {
    pub document_id: Uuid,
    pub campaign_id: Uuid,
    /// Chunking strategy override; the configured default applies when absent
    #[serde(default)]
    pub strategy: Option<crate::chunking::ChunkStrategy>,
    #[serde(default)]
    pub attempt: u32,
}

impl IndexJob {
    pub fn new(document_id: Uuid, campaign_id: Uuid) -> Self {
        Self {
            document_id,
            campaign_id,
            strategy: None,
            attempt: 0,
        }
    }
}

/// Progress report emitted while a job runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub percentage: u8,
    pub message: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl JobProgress {
    pub fn new(percentage: u8, message: impl Into<String>) -> Self {
        Self {
            percentage,
            message: message.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lifecycle_defaults() {
        let doc = Document::new(
            Uuid::new_v4(),
            "manual.pdf",
            DocumentType::Rulebook,
            "application/pdf",
        );
        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.chunk_count, 0);
        assert!(doc.failure_message.is_none());
    }

    #[test]
    fn test_document_type_roundtrip() {
        for ty in ["rulebook", "setting", "notes", "map", "image"] {
            let parsed: DocumentType = ty.parse().unwrap();
            assert_eq!(parsed.as_str(), ty);
        }
        assert!("scroll".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_confidence_label_thresholds() {
        assert_eq!(ConfidenceLabel::from_score(0.7), ConfidenceLabel::High);
        assert_eq!(ConfidenceLabel::from_score(0.69), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_score(0.4), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_score(0.39), ConfidenceLabel::Low);
    }
}
