//! Campaign query orchestration
//!
//! One query runs rewrite -> embed -> hybrid search -> optional rerank ->
//! context build -> grounded generation. Rewriter and reranker failures
//! fall back to the previous stage's output; everything else propagates.

use crate::answer::ResponseGenerator;
use crate::config::SearchConfig;
use crate::context::ContextBuilder;
use crate::embedding::EmbeddingClient;
use crate::error::{LoreError, Result};
use crate::llm::TokenUsage;
use crate::models::{ConfidenceLabel, ContextSource, ConversationMessage, DocumentType};
use crate::rerank::Reranker;
use crate::rewrite::QueryRewriter;
use crate::search::{HybridSearch, SearchFilters};
use crate::store::SqliteStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum accepted query length in characters
pub const MAX_QUERY_CHARS: usize = 2000;

/// Filters accepted by the query endpoint
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub document_types: Option<Vec<DocumentType>>,
    pub tags: Option<Vec<String>>,
    pub document_ids: Option<Vec<Uuid>>,
}

/// Outcome of a campaign query
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<ContextSource>,
    pub confidence: f32,
    pub confidence_label: ConfidenceLabel,
    pub is_unanswerable: bool,
    pub usage: Option<TokenUsage>,
}

impl QueryResult {
    /// The no-documents short-circuit: empty answer, low confidence
    fn empty() -> Self {
        Self {
            answer: String::new(),
            sources: Vec::new(),
            confidence: 0.1,
            confidence_label: ConfidenceLabel::Low,
            is_unanswerable: true,
            usage: None,
        }
    }
}

/// End-to-end query pipeline over one campaign's index
pub struct QueryEngine {
    store: Arc<SqliteStore>,
    search: Arc<HybridSearch>,
    embeddings: Arc<EmbeddingClient>,
    rewriter: QueryRewriter,
    reranker: Option<Reranker>,
    context_builder: Arc<ContextBuilder>,
    generator: ResponseGenerator,
}

impl QueryEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SqliteStore>,
        search: Arc<HybridSearch>,
        embeddings: Arc<EmbeddingClient>,
        rewriter: QueryRewriter,
        context_builder: Arc<ContextBuilder>,
        generator: ResponseGenerator,
        config: &SearchConfig,
        reranker: Option<Reranker>,
    ) -> Self {
        Self {
            store,
            search,
            embeddings,
            rewriter,
            reranker: if config.rerank { reranker } else { None },
            context_builder,
            generator,
        }
    }

    /// Answer a natural-language question against the campaign index
    pub async fn query(
        &self,
        campaign_id: Uuid,
        question: &str,
        filters: &QueryFilters,
        history: &[ConversationMessage],
        cancel: CancellationToken,
    ) -> Result<QueryResult> {
        let question = question.trim();
        if question.is_empty() {
            return Err(LoreError::InvalidQuery("Query must not be empty".to_string()));
        }
        if question.len() > MAX_QUERY_CHARS {
            return Err(LoreError::InvalidQuery(format!(
                "Query exceeds {} characters",
                MAX_QUERY_CHARS
            )));
        }

        // Resolve tag filters to a document id set; an empty intersection
        // means nothing can match and the LLM is never called
        let document_ids = match self.resolve_filters(campaign_id, filters).await? {
            Resolved::All => None,
            Resolved::Some(ids) => Some(ids),
            Resolved::None => {
                info!("Filter intersection is empty, returning empty answer");
                return Ok(QueryResult::empty());
            }
        };

        let standalone = self.rewriter.rewrite(question, history).await;
        debug!("Searching with query: {:?}", standalone);

        let query_embedding = self.embeddings.embed_one(&standalone, &cancel).await?;

        let search_filters = SearchFilters {
            document_ids,
            document_types: filters.document_types.clone(),
        };
        let mut results = self
            .search
            .search(
                &standalone,
                &query_embedding,
                campaign_id,
                &search_filters,
                None,
            )
            .await?;

        // Reranking is best-effort: malformed model output falls back to
        // the fused ordering
        if let Some(reranker) = &self.reranker {
            if !results.is_empty() {
                match reranker.rerank(question, results.clone()).await {
                    Ok(reranked) => results = reranked,
                    Err(e) => warn!("Rerank failed, keeping fused order: {}", e),
                }
            }
        }

        let context = self.context_builder.build(&results);
        let generated = self.generator.generate(question, &context, history).await?;

        Ok(QueryResult {
            confidence_label: ConfidenceLabel::from_score(generated.confidence),
            answer: generated.answer,
            sources: generated.sources,
            confidence: generated.confidence,
            is_unanswerable: generated.is_unanswerable,
            usage: generated.usage,
        })
    }

    async fn resolve_filters(
        &self,
        campaign_id: Uuid,
        filters: &QueryFilters,
    ) -> Result<Resolved> {
        let Some(tags) = filters.tags.as_ref().filter(|t| !t.is_empty()) else {
            return Ok(match &filters.document_ids {
                Some(ids) if ids.is_empty() => Resolved::None,
                Some(ids) => Resolved::Some(ids.clone()),
                None => Resolved::All,
            });
        };

        let tagged = self.store.document_ids_for_tags(campaign_id, tags).await?;
        if tagged.is_empty() {
            return Ok(Resolved::None);
        }

        match &filters.document_ids {
            Some(ids) => {
                let requested: HashSet<Uuid> = ids.iter().copied().collect();
                let intersection: Vec<Uuid> = tagged
                    .into_iter()
                    .filter(|id| requested.contains(id))
                    .collect();
                if intersection.is_empty() {
                    Ok(Resolved::None)
                } else {
                    Ok(Resolved::Some(intersection))
                }
            }
            None => Ok(Resolved::Some(tagged)),
        }
    }
}

enum Resolved {
    /// No id scoping
    All,
    /// Restrict to these documents
    Some(Vec<Uuid>),
    /// Nothing can match
    None,
}
