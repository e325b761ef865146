//! End-to-end indexing pipeline tests

mod common;

use common::mount_embeddings;
use lorekeeper::chunking::ChunkStrategy;
use lorekeeper::config::{EmbeddingConfig, IndexingConfig};
use lorekeeper::embedding::EmbeddingClient;
use lorekeeper::error::LoreError;
use lorekeeper::indexing::{IndexingWorker, JobQueue, ProgressSink, ProgressTracker};
use lorekeeper::models::{Document, DocumentStatus, DocumentType, IndexJob};
use lorekeeper::objects::{FsObjectStore, ObjectStore};
use lorekeeper::store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    store: Arc<SqliteStore>,
    objects: Arc<FsObjectStore>,
    worker: Arc<IndexingWorker>,
    tracker: Arc<ProgressTracker>,
    _server: MockServer,
    _dir: TempDir,
}

async fn harness(dimension: usize, batch_size: usize) -> Harness {
    let server = MockServer::start().await;
    mount_embeddings(&server, vec![0.5; dimension]).await;
    build_harness(server, dimension, batch_size).await
}

async fn build_harness(server: MockServer, dimension: usize, batch_size: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteStore::connect("sqlite::memory:", dimension).await.unwrap());
    let objects = Arc::new(FsObjectStore::new(dir.path()));

    let embeddings = Arc::new(EmbeddingClient::new(EmbeddingConfig {
        base_url: server.uri(),
        model: "test-embed".to_string(),
        dimension,
        batch_size,
        timeout: 5,
    }));

    let config = IndexingConfig {
        concurrency: 1,
        max_attempts: 2,
        target_tokens: 24,
        overlap_tokens: 4,
        min_chunk_tokens: 2,
        ..IndexingConfig::default()
    };

    let tracker = Arc::new(ProgressTracker::new());
    let worker = Arc::new(IndexingWorker::new(
        Arc::clone(&store),
        Arc::clone(&objects) as Arc<dyn ObjectStore>,
        embeddings,
        config,
        Arc::clone(&tracker) as Arc<dyn ProgressSink>,
    ));

    Harness {
        store,
        objects,
        worker,
        tracker,
        _server: server,
        _dir: dir,
    }
}

async fn register(
    harness: &Harness,
    name: &str,
    mime: &str,
    bytes: &[u8],
) -> (Document, IndexJob) {
    let campaign_id = Uuid::new_v4();
    let document = Document::new(campaign_id, name, DocumentType::Rulebook, mime);
    harness.store.insert_document(&document).await.unwrap();
    harness
        .objects
        .put(campaign_id, document.id, bytes)
        .await
        .unwrap();
    let job = IndexJob::new(document.id, campaign_id);
    (document, job)
}

/// Build a small text-layer PDF with one content stream per page
fn build_pdf(pages: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document as PdfDocument, Object, Stream};

    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[tokio::test]
async fn text_document_reaches_ready_with_consistent_chunks() {
    let harness = harness(8, 2).await;
    let content = "The dragon sleeps beneath the mountain. The knights keep their vigil. "
        .repeat(10);
    let (document, job) = register(&harness, "notes.txt", "text/plain", content.as_bytes()).await;

    harness
        .worker
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap();

    let ready = harness.store.get_document(document.id).await.unwrap().unwrap();
    assert_eq!(ready.status, DocumentStatus::Ready);
    assert!(ready.chunk_count >= 1);
    assert_eq!(
        ready.chunk_count,
        harness.store.count_chunks(document.id).await.unwrap()
    );

    let chunks = harness.store.chunks_for_document(document.id).await.unwrap();
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i as i64);
        assert_eq!(chunk.embedding.len(), 8);
        assert!(content.contains(&chunk.content));
    }

    let progress = harness.tracker.latest(document.id).unwrap();
    assert_eq!(progress.percentage, 100);
}

#[tokio::test]
async fn pdf_document_gets_page_numbers_and_full_dimension_vectors() {
    let harness = harness(768, 20).await;
    let page = "Dragons fear cold iron and silvered blades. ".repeat(10);
    let pdf = build_pdf(&[&page, &page, &page]);
    let (document, job) = register(&harness, "manual.pdf", "application/pdf", &pdf).await;

    harness
        .worker
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap();

    let ready = harness.store.get_document(document.id).await.unwrap().unwrap();
    assert_eq!(ready.status, DocumentStatus::Ready);
    assert_eq!(ready.metadata.get("page_count").map(String::as_str), Some("3"));
    assert_eq!(
        ready.metadata.get("has_extracted_text").map(String::as_str),
        Some("true")
    );

    let chunks = harness.store.chunks_for_document(document.id).await.unwrap();
    assert!(!chunks.is_empty());
    for chunk in &chunks {
        assert_eq!(chunk.embedding.len(), 768);
        assert!(matches!(chunk.page_number, Some(1..=3)));
    }
}

#[tokio::test]
async fn markdown_semantic_chunks_carry_sections() {
    let harness = harness(8, 4).await;
    let md = "# Dragons\nDragons fear cold iron above all else known to sages.\n\n\
              # Liches\nLiches hide phylacteries in deep vaults beneath ruins.\n";
    let (document, mut job) = register(&harness, "lore.md", "text/markdown", md.as_bytes()).await;
    job.strategy = Some(ChunkStrategy::Semantic);

    harness
        .worker
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap();

    let chunks = harness.store.chunks_for_document(document.id).await.unwrap();
    assert!(!chunks.is_empty());
    assert!(chunks.iter().any(|c| c.section.as_deref() == Some("Dragons")));
}

#[tokio::test]
async fn unsupported_mime_type_fails_terminally() {
    let harness = harness(8, 2).await;
    let (document, job) = register(&harness, "map.png", "image/png", b"not really a png").await;

    let error = harness
        .worker
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(!error.is_retryable());

    let failed = harness.store.get_document(document.id).await.unwrap().unwrap();
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert!(failed
        .failure_message
        .unwrap()
        .contains("Unsupported MIME type"));
    assert_eq!(harness.store.count_chunks(document.id).await.unwrap(), 0);
}

#[tokio::test]
async fn embedding_failure_is_retryable_and_cleans_up() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model overloaded"))
        .mount(&server)
        .await;
    let harness = build_harness(server, 8, 2).await;

    let (document, job) = register(
        &harness,
        "notes.txt",
        "text/plain",
        b"Enough text to produce at least one chunk of content here.",
    )
    .await;

    let error = harness
        .worker
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(error.is_retryable());

    let failed = harness.store.get_document(document.id).await.unwrap().unwrap();
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert_eq!(harness.store.count_chunks(document.id).await.unwrap(), 0);
}

#[tokio::test]
async fn cancellation_mid_embedding_fails_job_and_leaves_no_rows() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/embed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "embeddings": [vec![0.5f32; 8]] }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;
    // Batch size 1 over many chunks keeps the embed stage busy
    let harness = build_harness(server, 8, 1).await;

    let content = "A paragraph of campaign notes that keeps going and going. ".repeat(20);
    let (document, job) = register(&harness, "notes.txt", "text/plain", content.as_bytes()).await;

    let cancel = CancellationToken::new();
    let worker = Arc::clone(&harness.worker);
    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { worker.run_job(&job, &cancel).await }
    });

    // Let extraction and at least one embed batch pass, then cancel
    tokio::time::sleep(Duration::from_millis(450)).await;
    cancel.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(LoreError::Cancelled)));

    let failed = harness.store.get_document(document.id).await.unwrap().unwrap();
    assert_eq!(failed.status, DocumentStatus::Failed);
    assert_eq!(failed.failure_message.as_deref(), Some("Job cancelled"));
    assert_eq!(harness.store.count_chunks(document.id).await.unwrap(), 0);
}

#[tokio::test]
async fn rerunning_a_ready_document_is_idempotent() {
    let harness = harness(8, 2).await;
    let content = "Stable content chunks the same way every time it is processed. ".repeat(8);
    let (document, job) = register(&harness, "notes.txt", "text/plain", content.as_bytes()).await;

    harness
        .worker
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap();
    let first = harness.store.chunks_for_document(document.id).await.unwrap();

    harness
        .worker
        .run_job(&job, &CancellationToken::new())
        .await
        .unwrap();
    let second = harness.store.chunks_for_document(document.id).await.unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.chunk_index, b.chunk_index);
        assert_eq!(a.content, b.content);
    }
}

#[tokio::test]
async fn queue_deduplicates_by_document() {
    let harness = harness(8, 2).await;
    let (document, job) = register(&harness, "notes.txt", "text/plain", b"short note body").await;

    let queue = JobQueue::start(Arc::clone(&harness.worker), 1, 2);
    assert!(queue.enqueue(job.clone()).unwrap());
    assert!(!queue.enqueue(job).unwrap());

    // Wait for the single job to drain
    for _ in 0..50 {
        if !queue.is_active(document.id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!queue.is_active(document.id));

    let ready = harness.store.get_document(document.id).await.unwrap().unwrap();
    assert_eq!(ready.status, DocumentStatus::Ready);
}
