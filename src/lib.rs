//! Lorekeeper: campaign knowledge service for tabletop RPGs
//!
//! The library wires four surfaces around one chunk index:
//! - An indexing pipeline: extract -> chunk -> embed -> persist, run by a
//!   queue of workers with progress reporting and recovery
//! - Hybrid retrieval: lexical + vector search with score fusion, optional
//!   LLM re-ranking, and follow-up query rewriting
//! - Grounded answer generation with citations and confidence scoring
//! - Streamed structured generation (adventure hooks, NPCs) over the same
//!   retrieval base
//!
//! # Example
//!
//! ```rust,no_run
//! use lorekeeper::{api, AppConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let state = api::AppState::new(config.clone()).await?;
//!     api::serve(state, &config.server.host, config.server.port).await?;
//!     Ok(())
//! }
//! ```

pub mod answer;
pub mod api;
pub mod chunking;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod indexing;
pub mod llm;
pub mod models;
pub mod objects;
pub mod processor;
pub mod query;
pub mod rerank;
pub mod rewrite;
pub mod search;
pub mod store;

// Re-export main types
pub use answer::{GeneratedAnswer, ResponseGenerator};
pub use chunking::{
    estimate_tokens, ChunkInput, ChunkOptions, ChunkStrategy, ChunkingOutcome, DraftChunk,
    FixedSizeOptions, MarkdownOptions, SemanticOptions,
};
pub use config::{
    AppConfig, ContextConfig, EmbeddingConfig, IndexingConfig, LlmConfig, SearchConfig,
    ServerConfig, StorageConfig,
};
pub use context::ContextBuilder;
pub use embedding::EmbeddingClient;
pub use error::{ChunkingError, LlmError, LoreError, ProcessingError, Result, SearchError};
pub use generate::{
    AdventureHook, GeneratedNpc, GenerationEvent, GenerationKind, GenerationOutcome,
    GenerationParams, GenerationStreamer,
};
pub use indexing::{IndexingWorker, JobQueue, ProgressSink, ProgressTracker, QUEUE_NAME};
pub use llm::{LlmProvider, Message, Role};
pub use models::{
    BuiltContext, Chunk, ConfidenceLabel, ContextSource, ConversationMessage, Document,
    DocumentStatus, DocumentType, IndexJob, JobProgress, MessageRole, SearchResult,
    EMBEDDING_DIMENSION,
};
pub use objects::{FsObjectStore, ObjectStore};
pub use query::{QueryEngine, QueryFilters, QueryResult};
pub use rerank::Reranker;
pub use rewrite::QueryRewriter;
pub use search::{HybridSearch, SearchFilters};
pub use store::SqliteStore;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
