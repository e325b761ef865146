//! Query pipeline tests: retrieval, rewriting, reranking, confidence

mod common;

use common::{axis_vector, mount_embeddings, seed_ready_document, ScriptedProvider};
use lorekeeper::answer::ResponseGenerator;
use lorekeeper::config::{ContextConfig, EmbeddingConfig, SearchConfig};
use lorekeeper::context::ContextBuilder;
use lorekeeper::embedding::EmbeddingClient;
use lorekeeper::error::LoreError;
use lorekeeper::models::{ConfidenceLabel, ConversationMessage, DocumentType};
use lorekeeper::query::{QueryEngine, QueryFilters};
use lorekeeper::rerank::Reranker;
use lorekeeper::rewrite::QueryRewriter;
use lorekeeper::search::HybridSearch;
use lorekeeper::store::SqliteStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::MockServer;

const DIM: usize = 8;

async fn engine(
    store: Arc<SqliteStore>,
    provider: Arc<ScriptedProvider>,
    embed_url: &str,
    rerank: bool,
) -> QueryEngine {
    let config = SearchConfig {
        rerank,
        ..SearchConfig::default()
    };

    let embeddings = Arc::new(EmbeddingClient::new(EmbeddingConfig {
        base_url: embed_url.to_string(),
        model: "test-embed".to_string(),
        dimension: DIM,
        batch_size: 4,
        timeout: 5,
    }));

    let search = Arc::new(HybridSearch::new(Arc::clone(&store), config.clone()));
    let rewriter = QueryRewriter::new(provider.clone(), config.rewrite_timeout);
    let reranker = Reranker::new(provider.clone(), config.rerank_drop_threshold);
    let context_builder = Arc::new(ContextBuilder::new(ContextConfig::default()));
    let generator = ResponseGenerator::new(provider.clone());

    QueryEngine::new(
        store,
        search,
        embeddings,
        rewriter,
        context_builder,
        generator,
        &config,
        Some(reranker),
    )
}

async fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::connect("sqlite::memory:", DIM).await.unwrap())
}

#[tokio::test]
async fn strong_single_source_answer_is_high_confidence() {
    let server = MockServer::start().await;
    mount_embeddings(&server, axis_vector(DIM, 0)).await;
    let store = store().await;
    let campaign = Uuid::new_v4();

    seed_ready_document(
        &store,
        campaign,
        "manual.pdf",
        DocumentType::Rulebook,
        &[(
            "Dragons fear cold iron. Red dragons are vulnerable to frost.",
            axis_vector(DIM, 0),
        )],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        "Dragons fear cold iron, and red dragons are vulnerable to frost [1].",
    ]));
    let engine = engine(Arc::clone(&store), provider.clone(), &server.uri(), false).await;

    let result = engine
        .query(
            campaign,
            "What are the dragon's weaknesses?",
            &QueryFilters::default(),
            &[],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(result.answer.contains("cold iron"));
    assert!(result.answer.contains("[1]"));
    assert_eq!(result.confidence_label, ConfidenceLabel::High);
    assert_eq!(result.sources[0].document_name, "manual.pdf");
    assert!(!result.is_unanswerable);
}

#[tokio::test]
async fn follow_up_question_searches_with_the_rewrite() {
    let server = MockServer::start().await;
    // Query embeddings are orthogonal to the chunk: only the lexical leg
    // can find it, and only if the rewrite injects the name
    mount_embeddings(&server, axis_vector(DIM, 0)).await;
    let store = store().await;
    let campaign = Uuid::new_v4();

    seed_ready_document(
        &store,
        campaign,
        "barovia.md",
        DocumentType::Setting,
        &[(
            "Strahd is the vampire lord of Barovia.",
            axis_vector(DIM, 1),
        )],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        "Strahd vampire lord of Barovia history",
        "Strahd has ruled Barovia for centuries [1].",
    ]));
    let engine = engine(Arc::clone(&store), provider.clone(), &server.uri(), false).await;

    let history = vec![
        ConversationMessage::user("Who is Strahd?"),
        ConversationMessage::assistant("Strahd is the vampire lord of Barovia."),
    ];

    let result = engine
        .query(
            campaign,
            "tell me more",
            &QueryFilters::default(),
            &history,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // The chunk is only reachable through the rewritten query
    assert!(!result.sources.is_empty());
    assert_eq!(provider.call_count(), 2);

    let calls = provider.calls.lock().unwrap();
    let answer_prompt = &calls[1].last().unwrap().content;
    assert!(answer_prompt.contains("Strahd"));
}

#[tokio::test]
async fn empty_tag_intersection_short_circuits_without_llm() {
    let server = MockServer::start().await;
    mount_embeddings(&server, axis_vector(DIM, 0)).await;
    let store = store().await;
    let campaign = Uuid::new_v4();

    seed_ready_document(
        &store,
        campaign,
        "untagged.md",
        DocumentType::Notes,
        &[("Some notes.", axis_vector(DIM, 0))],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let engine = engine(Arc::clone(&store), provider.clone(), &server.uri(), false).await;

    let filters = QueryFilters {
        tags: Some(vec!["dragons".to_string()]),
        ..QueryFilters::default()
    };
    let result = engine
        .query(
            campaign,
            "anything about dragons?",
            &filters,
            &[],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(result.answer.is_empty());
    assert!(result.sources.is_empty());
    assert_eq!(result.confidence_label, ConfidenceLabel::Low);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn document_type_filter_scopes_every_source() {
    let server = MockServer::start().await;
    mount_embeddings(&server, axis_vector(DIM, 0)).await;
    let store = store().await;
    let campaign = Uuid::new_v4();

    seed_ready_document(
        &store,
        campaign,
        "core-rules.pdf",
        DocumentType::Rulebook,
        &[("Initiative is a d20 roll plus dexterity.", axis_vector(DIM, 0))],
    )
    .await;
    seed_ready_document(
        &store,
        campaign,
        "session-notes.md",
        DocumentType::Notes,
        &[("The party met the baron at dusk.", axis_vector(DIM, 0))],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        "Initiative is a d20 roll plus dexterity [1].",
    ]));
    let engine = engine(Arc::clone(&store), provider.clone(), &server.uri(), false).await;

    let filters = QueryFilters {
        document_types: Some(vec![DocumentType::Rulebook]),
        ..QueryFilters::default()
    };
    let result = engine
        .query(
            campaign,
            "How does initiative work?",
            &filters,
            &[],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!result.sources.is_empty());
    assert!(result
        .sources
        .iter()
        .all(|s| s.document_type == DocumentType::Rulebook));
}

#[tokio::test]
async fn rerank_drops_low_scoring_candidates() {
    let server = MockServer::start().await;
    mount_embeddings(&server, axis_vector(DIM, 0)).await;
    let store = store().await;
    let campaign = Uuid::new_v4();

    seed_ready_document(
        &store,
        campaign,
        "lore.md",
        DocumentType::Setting,
        &[
            ("The mountain pass closes in winter.", axis_vector(DIM, 0)),
            ("The river trade feeds the city.", axis_vector(DIM, 0)),
        ],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        // Rerank: keep one candidate, drop the other below 0.2
        r#"[{"index": 1, "score": 9}, {"index": 2, "score": 1}]"#,
        "The pass closes when the snows come [1].",
    ]));
    let engine = engine(Arc::clone(&store), provider.clone(), &server.uri(), true).await;

    let result = engine
        .query(
            campaign,
            "When does the pass close?",
            &QueryFilters::default(),
            &[],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(result.sources.len(), 1);
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn rerank_parse_failure_falls_back_to_fused_order() {
    let server = MockServer::start().await;
    mount_embeddings(&server, axis_vector(DIM, 0)).await;
    let store = store().await;
    let campaign = Uuid::new_v4();

    seed_ready_document(
        &store,
        campaign,
        "lore.md",
        DocumentType::Setting,
        &[
            ("The mountain pass closes in winter.", axis_vector(DIM, 0)),
            ("The river trade feeds the city.", axis_vector(DIM, 0)),
        ],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        "I would rate the first passage highly.",
        "The pass closes when the snows come [1].",
    ]));
    let engine = engine(Arc::clone(&store), provider.clone(), &server.uri(), true).await;

    let result = engine
        .query(
            campaign,
            "When does the pass close?",
            &QueryFilters::default(),
            &[],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    // Both fused candidates survive the failed rerank
    assert_eq!(result.sources.len(), 2);
}

#[tokio::test]
async fn invalid_queries_are_rejected() {
    let server = MockServer::start().await;
    mount_embeddings(&server, axis_vector(DIM, 0)).await;
    let store = store().await;
    let provider = Arc::new(ScriptedProvider::new(vec![]));
    let engine = engine(Arc::clone(&store), provider.clone(), &server.uri(), false).await;
    let campaign = Uuid::new_v4();

    let empty = engine
        .query(
            campaign,
            "   ",
            &QueryFilters::default(),
            &[],
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(empty, Err(LoreError::InvalidQuery(_))));

    let oversized = "x".repeat(2001);
    let too_long = engine
        .query(
            campaign,
            &oversized,
            &QueryFilters::default(),
            &[],
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(too_long, Err(LoreError::InvalidQuery(_))));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn unanswerable_response_scores_low() {
    let server = MockServer::start().await;
    mount_embeddings(&server, axis_vector(DIM, 0)).await;
    let store = store().await;
    let campaign = Uuid::new_v4();

    seed_ready_document(
        &store,
        campaign,
        "lore.md",
        DocumentType::Setting,
        &[("The baron collects taxes in autumn.", axis_vector(DIM, 0))],
    )
    .await;

    let provider = Arc::new(ScriptedProvider::new(vec![
        "I don't have enough information about the baron's family.",
    ]));
    let engine = engine(Arc::clone(&store), provider.clone(), &server.uri(), false).await;

    let result = engine
        .query(
            campaign,
            "Who are the baron's children?",
            &QueryFilters::default(),
            &[],
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(result.is_unanswerable);
    assert!((result.confidence - 0.15).abs() < f32::EPSILON);
    assert_eq!(result.confidence_label, ConfidenceLabel::Low);
}
