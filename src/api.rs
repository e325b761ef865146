//! REST API server for the knowledge service
//!
//! Provides HTTP endpoints for:
//! - Campaign queries with grounded, cited answers
//! - Document registration, inspection, and deletion
//! - Streamed hook/NPC generation (SSE) with aggregate fallback
//! - Health and OpenAPI documents

use crate::answer::ResponseGenerator;
use crate::config::AppConfig;
use crate::context::ContextBuilder;
use crate::embedding::EmbeddingClient;
use crate::error::{LoreError, Result};
use crate::generate::{
    GenerationEvent, GenerationKind, GenerationOutcome, GenerationParams, GenerationStreamer,
};
use crate::indexing::{IndexingWorker, JobQueue, ProgressTracker};
use crate::llm::{create_provider, LlmProvider};
use crate::models::{
    ConfidenceLabel, ContextSource, ConversationMessage, Document, DocumentStatus, DocumentType,
    IndexJob, JobProgress,
};
use crate::objects::{FsObjectStore, ObjectStore};
use crate::query::{QueryEngine, QueryFilters};
use crate::rerank::Reranker;
use crate::rewrite::QueryRewriter;
use crate::search::HybridSearch;
use crate::store::SqliteStore;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Document and chunk store
    pub store: Arc<SqliteStore>,
    /// Indexing queue handle
    pub queue: JobQueue,
    /// Latest per-document job progress
    pub progress: Arc<ProgressTracker>,
    /// Query pipeline
    pub engine: Arc<QueryEngine>,
    /// Hook/NPC generation
    pub streamer: Arc<GenerationStreamer>,
    /// LLM provider, for health checks
    pub provider: Arc<dyn LlmProvider>,
}

impl AppState {
    /// Wire the full service from configuration
    pub async fn new(config: AppConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| LoreError::Config(e.to_string()))?;

        let store = Arc::new(
            SqliteStore::connect(&config.storage.database_url, config.embedding.dimension).await?,
        );
        let objects: Arc<dyn ObjectStore> =
            Arc::new(FsObjectStore::new(&config.storage.objects_dir));
        let embeddings = Arc::new(EmbeddingClient::new(config.embedding.clone()));
        let provider = create_provider(&config.llm)?;

        let progress = Arc::new(ProgressTracker::new());
        let worker = Arc::new(IndexingWorker::new(
            Arc::clone(&store),
            objects,
            Arc::clone(&embeddings),
            config.indexing.clone(),
            Arc::clone(&progress) as Arc<dyn crate::indexing::ProgressSink>,
        ));
        let queue = JobQueue::start(worker, config.indexing.concurrency, config.indexing.max_attempts);

        let search = Arc::new(HybridSearch::new(Arc::clone(&store), config.search.clone()));
        let context_builder = Arc::new(ContextBuilder::new(config.context.clone()));

        let rewriter = QueryRewriter::new(Arc::clone(&provider), config.search.rewrite_timeout);
        let reranker = Reranker::new(Arc::clone(&provider), config.search.rerank_drop_threshold);
        let generator = ResponseGenerator::new(Arc::clone(&provider));

        let engine = Arc::new(QueryEngine::new(
            Arc::clone(&store),
            Arc::clone(&search),
            Arc::clone(&embeddings),
            rewriter,
            Arc::clone(&context_builder),
            generator,
            &config.search,
            Some(reranker),
        ));

        let streamer = Arc::new(GenerationStreamer::new(
            Arc::clone(&provider),
            search,
            embeddings,
            context_builder,
        ));

        Ok(Self {
            store,
            queue,
            progress,
            engine,
            streamer,
            provider,
        })
    }
}

// ============= Request / response types =============

/// Query request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// The natural-language question (1..2000 chars)
    #[schema(example = "What are the dragon's weaknesses?")]
    pub query: String,
    /// Optional retrieval filters
    #[serde(default)]
    pub filters: Option<QueryRequestFilters>,
    /// Optional conversation history for follow-up questions
    #[serde(default)]
    pub history: Option<Vec<ConversationMessage>>,
}

/// Retrieval filters accepted by the query endpoint
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequestFilters {
    #[serde(default)]
    pub document_types: Option<Vec<DocumentType>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub document_ids: Option<Vec<Uuid>>,
}

/// Query response
#[derive(Debug, Serialize, ToSchema)]
pub struct QueryResponse {
    /// The grounded answer with bracketed citations
    pub answer: String,
    /// Cited sources in citation order
    pub sources: Vec<ContextSource>,
    /// Three-level confidence label
    pub confidence: ConfidenceLabel,
}

/// Request to register an uploaded document for indexing
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDocumentRequest {
    /// Display name, e.g. the uploaded filename
    #[schema(example = "manual.pdf")]
    pub name: String,
    /// Document kind
    pub document_type: DocumentType,
    /// MIME type of the stored object
    #[schema(example = "application/pdf")]
    pub mime_type: String,
    /// Ordered tags
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Response for document registration
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDocumentResponse {
    pub document_id: Uuid,
    pub status: DocumentStatus,
    /// False when an indexing job for this document was already queued
    pub queued: bool,
}

/// Document details with indexing progress
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub name: String,
    pub document_type: DocumentType,
    pub mime_type: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    pub chunk_count: i64,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgressBody>,
}

/// Progress payload for a running indexing job
#[derive(Debug, Serialize, ToSchema)]
pub struct JobProgressBody {
    pub percentage: u8,
    pub message: String,
}

impl DocumentResponse {
    fn from_document(document: Document, progress: Option<JobProgress>) -> Self {
        Self {
            id: document.id,
            campaign_id: document.campaign_id,
            name: document.name,
            document_type: document.document_type,
            mime_type: document.mime_type,
            status: document.status,
            failure_message: document.failure_message,
            chunk_count: document.chunk_count,
            tags: document.tags,
            progress: progress.map(|p| JobProgressBody {
                percentage: p.percentage,
                message: p.message,
            }),
        }
    }
}

/// Request to regenerate one item of a previous generation
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegenerateRequest {
    /// Index of the item to replace in the client-visible list
    pub index: usize,
    #[serde(flatten)]
    pub params: GenerationParams,
}

/// Response carrying the regenerated item
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateResponse {
    pub index: usize,
    pub item: serde_json::Value,
    pub sources: Vec<ContextSource>,
}

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Health status
    #[schema(example = "ok")]
    pub status: String,
    /// API version
    pub version: String,
    /// Whether the LLM provider answered its health probe
    pub llm_available: bool,
}

/// Error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// User-visible error message
    pub error: String,
}

// ============= Error mapping =============

/// Error wrapper deciding the response status and public message
pub struct ApiError {
    inner: LoreError,
    public_message: Option<&'static str>,
}

impl ApiError {
    /// Mask internal failures behind a fixed public message
    fn masked(inner: LoreError, public_message: &'static str) -> Self {
        Self {
            inner,
            public_message: Some(public_message),
        }
    }
}

impl From<LoreError> for ApiError {
    fn from(inner: LoreError) -> Self {
        Self {
            inner,
            public_message: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.inner {
            LoreError::InvalidQuery(message) => (StatusCode::BAD_REQUEST, message.clone()),
            LoreError::NotFound(message) => {
                (StatusCode::NOT_FOUND, format!("Not found: {}", message))
            }
            other => {
                // Internal diagnostics go to the log, never to the client
                error!("Request failed ({}): {}", other.category(), other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    self.public_message.unwrap_or("Internal error").to_string(),
                )
            }
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// ============= OpenAPI =============

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        query_handler,
        register_document_handler,
        list_documents_handler,
        get_document_handler,
        delete_document_handler,
    ),
    components(
        schemas(
            QueryRequest,
            QueryRequestFilters,
            QueryResponse,
            RegisterDocumentRequest,
            RegisterDocumentResponse,
            DocumentResponse,
            JobProgressBody,
            RegenerateRequest,
            RegenerateResponse,
            HealthResponse,
            ErrorResponse,
            ContextSource,
            ConversationMessage,
            GenerationParams,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "query", description = "Campaign question answering"),
        (name = "documents", description = "Document registration and indexing"),
        (name = "generation", description = "Hook and NPC generation")
    ),
    info(
        title = "Lorekeeper API",
        version = "0.2.0",
        description = "Campaign knowledge service: document indexing, hybrid retrieval, \
                       grounded answers with citations, and streamed hook/NPC generation."
    )
)]
struct ApiDoc;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/campaigns/{id}/query", post(query_handler))
        .route(
            "/campaigns/{id}/documents",
            post(register_document_handler).get(list_documents_handler),
        )
        .route(
            "/campaigns/{id}/documents/{document_id}",
            get(get_document_handler).delete(delete_document_handler),
        )
        .route(
            "/campaigns/{id}/documents/{document_id}/cancel",
            delete(cancel_indexing_handler),
        )
        .route("/campaigns/{id}/generate/hooks", post(generate_hooks_handler))
        .route("/campaigns/{id}/generate/npcs", post(generate_npcs_handler))
        .route(
            "/campaigns/{id}/generate/hooks/regenerate",
            post(regenerate_hook_handler),
        )
        .route(
            "/campaigns/{id}/generate/npcs/regenerate",
            post(regenerate_npc_handler),
        )
        .route("/api-docs/openapi.json", get(openapi_spec_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// OpenAPI specification endpoint
async fn openapi_spec_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm_available = state.provider.health_check().await.unwrap_or(false);
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        llm_available,
    })
}

/// Answer a question against the campaign's indexed documents
#[utoipa::path(
    post,
    path = "/campaigns/{id}/query",
    tag = "query",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Grounded answer", body = QueryResponse),
        (status = 400, description = "Invalid query", body = ErrorResponse),
        (status = 500, description = "Downstream failure", body = ErrorResponse)
    )
)]
async fn query_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<QueryResponse>> {
    info!("Query for campaign {}", campaign_id);

    let filters = request
        .filters
        .map(|f| QueryFilters {
            document_types: f.document_types,
            tags: f.tags,
            document_ids: f.document_ids,
        })
        .unwrap_or_default();
    let history = request.history.unwrap_or_default();

    let result = state
        .engine
        .query(
            campaign_id,
            &request.query,
            &filters,
            &history,
            CancellationToken::new(),
        )
        .await
        .map_err(|e| match e {
            e @ (LoreError::InvalidQuery(_) | LoreError::NotFound(_)) => ApiError::from(e),
            other => ApiError::masked(other, "Failed to process query"),
        })?;

    Ok(Json(QueryResponse {
        answer: result.answer,
        sources: result.sources,
        confidence: result.confidence_label,
    }))
}

/// Register an uploaded document and enqueue its indexing job
#[utoipa::path(
    post,
    path = "/campaigns/{id}/documents",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = RegisterDocumentRequest,
    responses(
        (status = 202, description = "Document registered and queued", body = RegisterDocumentResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
async fn register_document_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<RegisterDocumentRequest>,
) -> ApiResult<(StatusCode, Json<RegisterDocumentResponse>)> {
    if request.name.trim().is_empty() {
        return Err(LoreError::InvalidQuery("Document name must not be empty".to_string()).into());
    }

    let document = Document::new(
        campaign_id,
        request.name,
        request.document_type,
        request.mime_type,
    )
    .with_tags(request.tags);

    state.store.insert_document(&document).await?;
    let queued = state
        .queue
        .enqueue(IndexJob::new(document.id, campaign_id))?;

    info!("Registered document {} for campaign {}", document.id, campaign_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(RegisterDocumentResponse {
            document_id: document.id,
            status: document.status,
            queued,
        }),
    ))
}

/// List the campaign's documents
#[utoipa::path(
    get,
    path = "/campaigns/{id}/documents",
    tag = "documents",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign documents", body = [DocumentResponse])
    )
)]
async fn list_documents_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<Vec<DocumentResponse>>> {
    let documents = state.store.list_documents(campaign_id).await?;
    let responses = documents
        .into_iter()
        .map(|d| {
            let progress = state.progress.latest(d.id);
            DocumentResponse::from_document(d, progress)
        })
        .collect();
    Ok(Json(responses))
}

/// Get one document with its indexing progress
#[utoipa::path(
    get,
    path = "/campaigns/{id}/documents/{document_id}",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Campaign ID"),
        ("document_id" = Uuid, Path, description = "Document ID")
    ),
    responses(
        (status = 200, description = "Document details", body = DocumentResponse),
        (status = 404, description = "Unknown document", body = ErrorResponse)
    )
)]
async fn get_document_handler(
    State(state): State<AppState>,
    Path((campaign_id, document_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<DocumentResponse>> {
    let document = load_campaign_document(&state, campaign_id, document_id).await?;
    let progress = state.progress.latest(document_id);
    Ok(Json(DocumentResponse::from_document(document, progress)))
}

/// Delete a document, cancelling any running indexing job
#[utoipa::path(
    delete,
    path = "/campaigns/{id}/documents/{document_id}",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Campaign ID"),
        ("document_id" = Uuid, Path, description = "Document ID")
    ),
    responses(
        (status = 204, description = "Document and chunks deleted"),
        (status = 404, description = "Unknown document", body = ErrorResponse)
    )
)]
async fn delete_document_handler(
    State(state): State<AppState>,
    Path((campaign_id, document_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    load_campaign_document(&state, campaign_id, document_id).await?;

    state.queue.cancel(document_id);
    state.store.delete_document(document_id).await?;

    info!("Deleted document {}", document_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Cancel a running indexing job
async fn cancel_indexing_handler(
    State(state): State<AppState>,
    Path((campaign_id, document_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<serde_json::Value>> {
    load_campaign_document(&state, campaign_id, document_id).await?;
    let cancelled = state.queue.cancel(document_id);
    Ok(Json(serde_json::json!({ "cancelled": cancelled })))
}

async fn load_campaign_document(
    state: &AppState,
    campaign_id: Uuid,
    document_id: Uuid,
) -> ApiResult<Document> {
    let document = state
        .store
        .get_document(document_id)
        .await?
        .filter(|d| d.campaign_id == campaign_id)
        .ok_or_else(|| LoreError::NotFound(format!("document {}", document_id)))?;
    Ok(document)
}

/// Generate adventure hooks (SSE or aggregate JSON by Accept header)
async fn generate_hooks_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    headers: HeaderMap,
    Json(params): Json<GenerationParams>,
) -> ApiResult<Response> {
    generate_response(state, campaign_id, GenerationKind::Hooks, params, &headers).await
}

/// Generate NPCs (SSE or aggregate JSON by Accept header)
async fn generate_npcs_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    headers: HeaderMap,
    Json(params): Json<GenerationParams>,
) -> ApiResult<Response> {
    generate_response(state, campaign_id, GenerationKind::Npcs, params, &headers).await
}

async fn generate_response(
    state: AppState,
    campaign_id: Uuid,
    kind: GenerationKind,
    params: GenerationParams,
    headers: &HeaderMap,
) -> ApiResult<Response> {
    let wants_sse = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false);

    let cancel = CancellationToken::new();

    if wants_sse {
        let events = state.streamer.stream(campaign_id, kind, params, cancel);
        return Ok(sse_response(events).into_response());
    }

    let outcome = state
        .streamer
        .generate(campaign_id, kind, params, cancel)
        .await
        .map_err(|e| ApiError::masked(e, "Generation failed"))?;
    Ok(Json(outcome).into_response())
}

fn sse_response(
    events: impl Stream<Item = GenerationEvent> + Send + 'static,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>> + Send + 'static> {
    let stream = events.map(|event| {
        let event = Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().data(format!("{{\"type\":\"error\",\"statusCode\":500,\"error\":\"serialization\",\"message\":\"{}\"}}", e)));
        Ok(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Regenerate a single hook for index-targeted replacement
async fn regenerate_hook_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<RegenerateRequest>,
) -> ApiResult<Json<RegenerateResponse>> {
    regenerate(state, campaign_id, GenerationKind::Hooks, request).await
}

/// Regenerate a single NPC for index-targeted replacement
async fn regenerate_npc_handler(
    State(state): State<AppState>,
    Path(campaign_id): Path<Uuid>,
    Json(request): Json<RegenerateRequest>,
) -> ApiResult<Json<RegenerateResponse>> {
    regenerate(state, campaign_id, GenerationKind::Npcs, request).await
}

async fn regenerate(
    state: AppState,
    campaign_id: Uuid,
    kind: GenerationKind,
    request: RegenerateRequest,
) -> ApiResult<Json<RegenerateResponse>> {
    let GenerationOutcome {
        mut items, sources, ..
    } = state
        .streamer
        .regenerate_item(campaign_id, kind, request.params, CancellationToken::new())
        .await
        .map_err(|e| ApiError::masked(e, "Generation failed"))?;

    let item = items.pop().ok_or_else(|| {
        ApiError::masked(
            LoreError::Generic(anyhow::anyhow!("model produced no item")),
            "Generation failed",
        )
    })?;

    Ok(Json(RegenerateResponse {
        index: request.index,
        item,
        sources,
    }))
}

/// Serve the API on the configured address
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let router = create_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);
    axum::serve(listener, router)
        .await
        .map_err(|e| LoreError::Generic(anyhow::anyhow!("server error: {}", e)))
}
