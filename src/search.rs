//! Hybrid retrieval: vector similarity fused with lexical scoring
//!
//! Both retrievals run over the campaign's chunk partition. Vector scores
//! are clamped cosine similarities; lexical scores are BM25 values
//! max-normalised into [0, 1]. Fusion is a weighted sum, deduplicated per
//! chunk.

use crate::config::SearchConfig;
use crate::error::Result;
use crate::models::{DocumentType, SearchResult};
use crate::store::SqliteStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;

/// Optional scoping applied before retrieval
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub document_ids: Option<Vec<Uuid>>,
    pub document_types: Option<Vec<DocumentType>>,
}

/// Hybrid search over a campaign's chunks
pub struct HybridSearch {
    store: Arc<SqliteStore>,
    config: SearchConfig,
}

impl HybridSearch {
    pub fn new(store: Arc<SqliteStore>, config: SearchConfig) -> Self {
        Self { store, config }
    }

    /// Run both retrievals and fuse the results
    pub async fn search(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        campaign_id: Uuid,
        filters: &SearchFilters,
        limit: Option<usize>,
    ) -> Result<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.config.limit);
        let candidate_cap = limit * 2;

        let candidates = self
            .store
            .fetch_search_candidates(
                campaign_id,
                filters.document_ids.as_deref(),
                filters.document_types.as_deref(),
            )
            .await?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Vector retrieval: clamped cosine similarity, top candidates
        let mut vector_hits: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .map(|(i, (chunk, _))| {
                let score = SqliteStore::cosine_similarity(&chunk.embedding, query_embedding)
                    .clamp(0.0, 1.0);
                (i, score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        vector_hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        vector_hits.truncate(candidate_cap);

        // Lexical retrieval: BM25, max-normalised
        let keyword_scores = bm25_scores(
            query_text,
            &candidates
                .iter()
                .map(|(chunk, _)| chunk.content.as_str())
                .collect::<Vec<_>>(),
        );
        let mut keyword_hits: Vec<(usize, f32)> = keyword_scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        keyword_hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        keyword_hits.truncate(candidate_cap);

        // Fuse by chunk id, keeping the max of each component
        let mut fused: HashMap<Uuid, (usize, f32, f32)> = HashMap::new();
        for (i, score) in &vector_hits {
            let id = candidates[*i].0.id;
            let entry = fused.entry(id).or_insert((*i, 0.0, 0.0));
            entry.1 = entry.1.max(*score);
        }
        for (i, score) in &keyword_hits {
            let id = candidates[*i].0.id;
            let entry = fused.entry(id).or_insert((*i, 0.0, 0.0));
            entry.2 = entry.2.max(*score);
        }

        let mut results: Vec<SearchResult> = fused
            .into_values()
            .map(|(i, vector_score, keyword_score)| {
                let (chunk, document) = &candidates[i];
                let score = (self.config.vector_weight * vector_score
                    + self.config.keyword_weight * keyword_score)
                    .clamp(0.0, 1.0);
                SearchResult {
                    chunk: chunk.clone(),
                    document: document.clone(),
                    score,
                    vector_score,
                    keyword_score,
                }
            })
            .collect();

        // Ties: higher vector score, then later chunk index
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.vector_score
                        .partial_cmp(&a.vector_score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(b.chunk.chunk_index.cmp(&a.chunk.chunk_index))
        });
        results.truncate(limit);

        debug!(
            "Hybrid search returned {} results for campaign {}",
            results.len(),
            campaign_id
        );
        Ok(results)
    }
}

/// BM25 scores for each document against the query, normalised to [0, 1]
pub fn bm25_scores(query: &str, documents: &[&str]) -> Vec<f32> {
    let query_terms = tokenize(query);
    if query_terms.is_empty() || documents.is_empty() {
        return vec![0.0; documents.len()];
    }

    let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d)).collect();
    let n = tokenized.len() as f32;
    let avg_len: f32 =
        tokenized.iter().map(|t| t.len() as f32).sum::<f32>() / n;
    let avg_len = avg_len.max(1.0);

    // Document frequency per query term
    let mut df: HashMap<&str, f32> = HashMap::new();
    for term in &query_terms {
        let count = tokenized
            .iter()
            .filter(|tokens| tokens.iter().any(|t| t == term))
            .count() as f32;
        df.insert(term.as_str(), count);
    }

    let mut scores: Vec<f32> = tokenized
        .iter()
        .map(|tokens| {
            let len = tokens.len() as f32;
            query_terms
                .iter()
                .map(|term| {
                    let tf = tokens.iter().filter(|t| *t == term).count() as f32;
                    if tf == 0.0 {
                        return 0.0;
                    }
                    let df = df[term.as_str()];
                    let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                    idf * (tf * (BM25_K1 + 1.0))
                        / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * len / avg_len))
                })
                .sum()
        })
        .collect();

    let max = scores.iter().cloned().fold(0.0f32, f32::max);
    if max > 0.0 {
        for score in &mut scores {
            *score /= max;
        }
    }

    scores
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(normalize_token)
        .collect()
}

/// Fold trivial plurals so "dragons" and "dragon's" meet in the middle
fn normalize_token(token: &str) -> String {
    if token.len() > 3 {
        if let Some(stripped) = token.strip_suffix('s') {
            return stripped.to_string();
        }
    }
    token.to_string()
}
