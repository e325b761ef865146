//! Configuration management for the knowledge service

use serde::{Deserialize, Serialize};

/// Main configuration for the knowledge service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Document and chunk storage configuration
    pub storage: StorageConfig,

    /// Indexing pipeline configuration
    pub indexing: IndexingConfig,

    /// Retrieval configuration
    pub search: SearchConfig,

    /// Context assembly configuration
    pub context: ContextConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider kind ("local" or "anthropic")
    pub provider: String,

    /// Base URL for the provider API
    pub base_url: String,

    /// API key (usually from environment variable)
    pub api_key: Option<String>,

    /// Model for chat and generation
    pub chat_model: String,

    /// Maximum tokens for generation
    pub max_tokens: u32,

    /// Default temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "local".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            chat_model: "llama3.2".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            timeout: 60,
        }
    }
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service
    pub base_url: String,

    /// Embedding model name
    pub model: String,

    /// Vector dimension produced by the model
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Maximum inputs per request
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout: u64,
}

fn default_embedding_dimension() -> usize {
    768
}

fn default_embedding_batch_size() -> usize {
    20
}

fn default_embedding_timeout() -> u64 {
    120
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            timeout: default_embedding_timeout(),
        }
    }
}

/// Document and chunk storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database URL (SQLite)
    pub database_url: String,

    /// Directory holding uploaded document objects
    pub objects_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:lorekeeper.db".to_string(),
            objects_dir: "objects".to_string(),
        }
    }
}

/// Indexing pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Number of concurrent indexing workers
    #[serde(default = "default_worker_concurrency")]
    pub concurrency: usize,

    /// Attempt budget per job (including the first run)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Default chunking strategy ("fixed-size", "semantic", "markdown")
    #[serde(default = "default_chunking_strategy")]
    pub default_strategy: String,

    /// Target tokens per chunk
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,

    /// Overlap between consecutive chunks in tokens
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,

    /// Minimum tokens for a standalone chunk
    #[serde(default = "default_min_chunk_tokens")]
    pub min_chunk_tokens: usize,

    /// Template joining PDF pages; must contain `{n}`
    #[serde(default = "default_page_delimiter")]
    pub page_delimiter: String,

    /// Average chars per page below which a PDF counts as scanned
    #[serde(default = "default_scanned_page_threshold")]
    pub scanned_page_threshold: usize,
}

fn default_worker_concurrency() -> usize {
    2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_chunking_strategy() -> String {
    "fixed-size".to_string()
}

fn default_target_tokens() -> usize {
    128
}

fn default_overlap_tokens() -> usize {
    24
}

fn default_min_chunk_tokens() -> usize {
    20
}

fn default_page_delimiter() -> String {
    "\n\n--- Page {n} ---\n\n".to_string()
}

fn default_scanned_page_threshold() -> usize {
    50
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_worker_concurrency(),
            max_attempts: default_max_attempts(),
            default_strategy: default_chunking_strategy(),
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
            min_chunk_tokens: default_min_chunk_tokens(),
            page_delimiter: default_page_delimiter(),
            scanned_page_threshold: default_scanned_page_threshold(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum fused results returned
    #[serde(default = "default_search_limit")]
    pub limit: usize,

    /// Weight of the vector score in fusion
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// Weight of the keyword score in fusion
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,

    /// Enable LLM re-ranking of candidates
    #[serde(default)]
    pub rerank: bool,

    /// Rescaled re-rank score below which candidates are dropped
    #[serde(default = "default_rerank_drop_threshold")]
    pub rerank_drop_threshold: f32,

    /// Timeout for follow-up query rewriting in seconds
    #[serde(default = "default_rewrite_timeout")]
    pub rewrite_timeout: u64,
}

fn default_search_limit() -> usize {
    8
}

fn default_vector_weight() -> f32 {
    0.7
}

fn default_keyword_weight() -> f32 {
    0.3
}

fn default_rerank_drop_threshold() -> f32 {
    0.2
}

fn default_rewrite_timeout() -> u64 {
    15
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            vector_weight: default_vector_weight(),
            keyword_weight: default_keyword_weight(),
            rerank: false,
            rerank_drop_threshold: default_rerank_drop_threshold(),
            rewrite_timeout: default_rewrite_timeout(),
        }
    }
}

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Token budget for assembled context
    #[serde(default = "default_context_max_tokens")]
    pub max_tokens: usize,

    /// Absolute minimum relevance score for inclusion
    #[serde(default)]
    pub min_relevance_score: f32,

    /// Fraction of the top score forming the adaptive floor
    #[serde(default = "default_adaptive_ratio")]
    pub adaptive_ratio: f32,
}

fn default_context_max_tokens() -> usize {
    3000
}

fn default_adaptive_ratio() -> f32 {
    0.4
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_context_max_tokens(),
            min_relevance_score: 0.0,
            adaptive_ratio: default_adaptive_ratio(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Bind port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let config = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<std::path::Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = match path.as_ref().extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string(self)?,
            _ => return Err(anyhow::anyhow!("Unsupported config file format")),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.llm.base_url.starts_with("http") {
            return Err(anyhow::anyhow!("Invalid LLM base URL: {}", self.llm.base_url));
        }

        if self.llm.chat_model.is_empty() {
            return Err(anyhow::anyhow!("Chat model name cannot be empty"));
        }

        if !self.embedding.base_url.starts_with("http") {
            return Err(anyhow::anyhow!(
                "Invalid embedding base URL: {}",
                self.embedding.base_url
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(anyhow::anyhow!(
                "Embedding dimension must be greater than 0"
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(anyhow::anyhow!("Embedding batch size must be greater than 0"));
        }

        if self.indexing.concurrency == 0 {
            return Err(anyhow::anyhow!("Indexing concurrency must be greater than 0"));
        }

        if self.indexing.max_attempts == 0 {
            return Err(anyhow::anyhow!("Job attempt budget must be greater than 0"));
        }

        if !self.indexing.page_delimiter.contains("{n}") {
            return Err(anyhow::anyhow!("Page delimiter must contain {{n}}"));
        }

        for (name, weight) in [
            ("vector", self.search.vector_weight),
            ("keyword", self.search.keyword_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(anyhow::anyhow!(
                    "{} weight must be between 0.0 and 1.0",
                    name
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.context.adaptive_ratio) {
            return Err(anyhow::anyhow!(
                "Adaptive ratio must be between 0.0 and 1.0"
            ));
        }

        Ok(())
    }
}
