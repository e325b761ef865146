//! Error handling for the knowledge service

use thiserror::Error;

/// Result type alias for the knowledge service
pub type Result<T> = std::result::Result<T, LoreError>;

/// Main error type for the knowledge service
#[derive(Error, Debug)]
pub enum LoreError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkingError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Context build failed: {0}")]
    ContextBuild(String),

    #[error("Rerank failed: {0}")]
    Rerank(String),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

/// Errors related to language model and embedding operations
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout: operation took too long")]
    Timeout,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limited")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),
}

/// Errors raised while extracting text from an uploaded document
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Unsupported MIME type: {0}")]
    UnsupportedMimeType(String),

    #[error("PDF is encrypted")]
    EncryptedPdf,

    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    #[error("File is empty")]
    EmptyFile,

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Errors raised while splitting content into chunks
#[derive(Error, Debug)]
pub enum ChunkingError {
    #[error("Content is empty")]
    EmptyContent,

    #[error("Invalid chunking options: {0}")]
    InvalidOptions(String),
}

/// Errors related to the chunk store and retrieval
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid embedding dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Search failed: {0}")]
    SearchFailed(String),

    #[error("Storage failed: {0}")]
    StorageFailed(String),
}

impl LoreError {
    /// Check if the error is retryable at the job level
    pub fn is_retryable(&self) -> bool {
        match self {
            LoreError::Llm(e) => matches!(
                e,
                LlmError::Timeout
                    | LlmError::ConnectionFailed(_)
                    | LlmError::RateLimited
                    | LlmError::ServerError(_)
                    | LlmError::EmbeddingFailed(_)
            ),
            LoreError::Processing(e) => matches!(e, ProcessingError::StorageError(_)),
            LoreError::Search(e) => matches!(e, SearchError::StorageFailed(_)),
            LoreError::Http(_) | LoreError::Database(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging/metrics
    pub fn category(&self) -> &'static str {
        match self {
            LoreError::Llm(LlmError::EmbeddingFailed(_)) => "embedding_failed",
            LoreError::Llm(_) => "llm_error",
            LoreError::Processing(ProcessingError::UnsupportedMimeType(_)) => {
                "unsupported_mime_type"
            }
            LoreError::Processing(ProcessingError::StorageError(_)) => "storage_failed",
            LoreError::Processing(_) => "extraction_failed",
            LoreError::Chunking(_) => "chunking_failed",
            LoreError::Search(_) => "search_failed",
            LoreError::InvalidQuery(_) => "invalid_query",
            LoreError::ContextBuild(_) => "context_build_failed",
            LoreError::Rerank(_) => "rerank_failed",
            LoreError::Cancelled => "cancelled",
            LoreError::Config(_) => "config",
            LoreError::NotFound(_) => "not_found",
            LoreError::Io(_) => "io",
            LoreError::Serialization(_) => "serialization",
            LoreError::Http(_) => "http",
            LoreError::Database(_) => "database",
            LoreError::Generic(_) => "generic",
        }
    }
}
