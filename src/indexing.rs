//! Background document indexing: queue, worker pool, and job stages
//!
//! Jobs travel a flume channel into a bounded pool of workers. Each job
//! runs extract -> chunk -> embed -> store -> finalise with reported
//! progress, cooperative cancellation, and cleanup-on-failure. Retries are
//! classified by the error taxonomy and restart from the first stage.

use crate::chunking::{
    self, ChunkInput, ChunkOptions, ChunkStrategy, FixedSizeOptions, MarkdownOptions,
};
use crate::config::IndexingConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{LoreError, Result};
use crate::models::{Chunk, DocumentStatus, IndexJob, JobProgress};
use crate::objects::ObjectStore;
use crate::processor;
use crate::store::SqliteStore;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Name of the indexing queue
pub const QUEUE_NAME: &str = "document-indexing";

/// Receives progress reports from running jobs
pub trait ProgressSink: Send + Sync {
    fn report(&self, document_id: Uuid, progress: JobProgress);
}

/// Keeps the latest progress per document, for the API surface
#[derive(Default)]
pub struct ProgressTracker {
    latest: Mutex<HashMap<Uuid, JobProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest reported progress for a document, if a job has run
    pub fn latest(&self, document_id: Uuid) -> Option<JobProgress> {
        self.latest
            .lock()
            .expect("progress lock poisoned")
            .get(&document_id)
            .cloned()
    }
}

impl ProgressSink for ProgressTracker {
    fn report(&self, document_id: Uuid, progress: JobProgress) {
        debug!(
            "Job {} progress {}%: {}",
            document_id, progress.percentage, progress.message
        );
        self.latest
            .lock()
            .expect("progress lock poisoned")
            .insert(document_id, progress);
    }
}

/// Executes indexing jobs against the store and external services
pub struct IndexingWorker {
    store: Arc<SqliteStore>,
    objects: Arc<dyn ObjectStore>,
    embeddings: Arc<EmbeddingClient>,
    config: IndexingConfig,
    progress: Arc<dyn ProgressSink>,
}

impl IndexingWorker {
    pub fn new(
        store: Arc<SqliteStore>,
        objects: Arc<dyn ObjectStore>,
        embeddings: Arc<EmbeddingClient>,
        config: IndexingConfig,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            store,
            objects,
            embeddings,
            config,
            progress,
        }
    }

    /// Run one job attempt, translating failure into document state
    ///
    /// On any stage error the document's chunks are deleted, the document
    /// is marked failed with the error message, a telemetry event is
    /// emitted, and the error is re-raised for the queue's retry
    /// accounting.
    pub async fn run_job(&self, job: &IndexJob, cancel: &CancellationToken) -> Result<()> {
        info!(
            "Indexing document {} (campaign {}, attempt {})",
            job.document_id, job.campaign_id, job.attempt
        );

        match self.execute(job, cancel).await {
            Ok(chunk_count) => {
                info!(
                    "Indexed document {} into {} chunks",
                    job.document_id, chunk_count
                );
                Ok(())
            }
            Err(e) => {
                warn!("Indexing failed for document {}: {}", job.document_id, e);
                self.cleanup_failed(job, &e).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, job: &IndexJob, cancel: &CancellationToken) -> Result<i64> {
        // Stage 1: validate
        let document = self
            .store
            .get_document(job.document_id)
            .await?
            .ok_or_else(|| LoreError::NotFound(format!("document {}", job.document_id)))?;

        self.check_cancelled(cancel)?;

        // Stage 2: mark processing
        self.store
            .update_document_status(job.document_id, DocumentStatus::Processing, None)
            .await?;

        self.check_cancelled(cancel)?;

        // Stage 3: extract (0 -> 20)
        self.report(job, 0, "Extracting text");
        let processed =
            processor::process_document(self.objects.as_ref(), &self.config, &document).await?;

        let mut metadata = processed.metadata.clone();
        metadata.insert(
            "has_extracted_text".to_string(),
            processed.has_extracted_text.to_string(),
        );
        self.store
            .merge_document_metadata(job.document_id, &metadata)
            .await?;
        self.report(job, 20, "Text extracted");

        self.check_cancelled(cancel)?;

        // Stage 4: chunk (20 -> 35)
        let input = ChunkInput {
            content: &processed.content,
            sections: &processed.sections,
            pages: &processed.pages,
        };
        let options = self.chunk_options(job, &document.mime_type);
        let outcome = chunking::chunk(&input, &options)?;
        self.report(
            job,
            35,
            format!("Split into {} chunks", outcome.chunks.len()),
        );

        self.check_cancelled(cancel)?;

        // Stage 5: embed (35 -> 85)
        let texts: Vec<String> = outcome.chunks.iter().map(|c| c.content.clone()).collect();
        let progress = &self.progress;
        let document_id = job.document_id;
        let vectors = self
            .embeddings
            .embed_all(&texts, cancel, |done, total| {
                let percentage = 35 + ((done * 50) / total.max(1)) as u8;
                progress.report(
                    document_id,
                    JobProgress::new(
                        percentage,
                        format!("Embedded batch {}/{}", done, total),
                    ),
                );
            })
            .await?;

        self.check_cancelled(cancel)?;

        // Stage 6: store (85 -> 95); delete first so retries are idempotent
        self.report(job, 85, "Storing chunks");
        self.store.delete_chunks_for_document(job.document_id).await?;

        let now = Utc::now();
        let rows: Vec<Chunk> = outcome
            .chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (draft, embedding))| Chunk {
                id: Uuid::new_v4(),
                document_id: job.document_id,
                campaign_id: job.campaign_id,
                content: draft.content.clone(),
                embedding,
                chunk_index: i as i64,
                token_count: draft.token_count as i64,
                page_number: draft.page_number,
                section: draft.section.clone(),
                created_at: now,
            })
            .collect();
        self.store.insert_chunks(&rows).await?;
        self.report(job, 95, "Chunks stored");

        self.check_cancelled(cancel)?;

        // Stage 7: finalise (95 -> 100)
        let chunk_count = rows.len() as i64;
        self.store.finalize_document(job.document_id, chunk_count).await?;
        self.report(job, 100, "Indexing complete");

        Ok(chunk_count)
    }

    fn chunk_options(&self, job: &IndexJob, mime_type: &str) -> ChunkOptions {
        let strategy = job.strategy.unwrap_or_else(|| {
            self.config
                .default_strategy
                .parse()
                .unwrap_or(ChunkStrategy::FixedSize)
        });

        match strategy {
            ChunkStrategy::FixedSize => ChunkOptions::FixedSize(FixedSizeOptions {
                target_tokens: self.config.target_tokens,
                overlap_tokens: self.config.overlap_tokens,
                min_chunk_tokens: self.config.min_chunk_tokens,
            }),
            ChunkStrategy::Semantic => ChunkOptions::for_strategy(ChunkStrategy::Semantic),
            ChunkStrategy::Markdown => {
                // Markdown cutting only helps markdown sources
                if mime_type.contains("markdown") {
                    ChunkOptions::Markdown(MarkdownOptions {
                        target_tokens: self.config.target_tokens,
                        overlap_tokens: self.config.overlap_tokens,
                        ..MarkdownOptions::default()
                    })
                } else {
                    ChunkOptions::FixedSize(FixedSizeOptions {
                        target_tokens: self.config.target_tokens,
                        overlap_tokens: self.config.overlap_tokens,
                        min_chunk_tokens: self.config.min_chunk_tokens,
                    })
                }
            }
        }
    }

    fn check_cancelled(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(LoreError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn report(&self, job: &IndexJob, percentage: u8, message: impl Into<String>) {
        self.progress
            .report(job.document_id, JobProgress::new(percentage, message));
    }

    async fn cleanup_failed(&self, job: &IndexJob, cause: &LoreError) {
        if let Err(e) = self.store.delete_chunks_for_document(job.document_id).await {
            error!("Cleanup failed to delete chunks for {}: {}", job.document_id, e);
        }

        let message = cause.to_string();
        if let Err(e) = self
            .store
            .update_document_status(job.document_id, DocumentStatus::Failed, Some(&message))
            .await
        {
            error!("Cleanup failed to mark document {} failed: {}", job.document_id, e);
        }

        error!(
            target: "telemetry",
            document_id = %job.document_id,
            campaign_id = %job.campaign_id,
            category = cause.category(),
            retryable = cause.is_retryable(),
            "document_indexing_failed"
        );
    }
}

/// Handle to the running indexing queue
#[derive(Clone)]
pub struct JobQueue {
    tx: flume::Sender<IndexJob>,
    active: Arc<Mutex<HashSet<Uuid>>>,
    cancellations: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl JobQueue {
    /// Spawn the worker pool and return the queue handle
    pub fn start(worker: Arc<IndexingWorker>, concurrency: usize, max_attempts: u32) -> Self {
        let (tx, rx) = flume::unbounded::<IndexJob>();
        let active = Arc::new(Mutex::new(HashSet::new()));
        let cancellations = Arc::new(Mutex::new(HashMap::new()));

        for worker_id in 0..concurrency.max(1) {
            let rx = rx.clone();
            let worker = Arc::clone(&worker);
            let active = Arc::clone(&active);
            let cancellations = Arc::clone(&cancellations);

            tokio::spawn(async move {
                debug!("{} worker {} started", QUEUE_NAME, worker_id);

                while let Ok(mut job) = rx.recv_async().await {
                    let token = cancellations
                        .lock()
                        .expect("cancellation lock poisoned")
                        .get(&job.document_id)
                        .cloned()
                        .unwrap_or_default();

                    loop {
                        match worker.run_job(&job, &token).await {
                            Ok(()) => break,
                            Err(e) if e.is_retryable() && job.attempt + 1 < max_attempts => {
                                job.attempt += 1;
                                warn!(
                                    "Retrying document {} (attempt {}/{})",
                                    job.document_id,
                                    job.attempt + 1,
                                    max_attempts
                                );
                            }
                            Err(e) => {
                                debug!(
                                    "Giving up on document {} ({})",
                                    job.document_id,
                                    e.category()
                                );
                                break;
                            }
                        }
                    }

                    active
                        .lock()
                        .expect("active lock poisoned")
                        .remove(&job.document_id);
                    cancellations
                        .lock()
                        .expect("cancellation lock poisoned")
                        .remove(&job.document_id);
                }
            });
        }

        Self {
            tx,
            active,
            cancellations,
        }
    }

    /// Enqueue a job; duplicate jobs for an in-flight document are dropped
    pub fn enqueue(&self, job: IndexJob) -> Result<bool> {
        {
            let mut active = self.active.lock().expect("active lock poisoned");
            if !active.insert(job.document_id) {
                debug!("Document {} already queued, deduplicating", job.document_id);
                return Ok(false);
            }
        }

        self.cancellations
            .lock()
            .expect("cancellation lock poisoned")
            .insert(job.document_id, CancellationToken::new());

        self.tx
            .send(job)
            .map_err(|e| LoreError::Generic(anyhow::anyhow!("queue closed: {}", e)))?;
        Ok(true)
    }

    /// Fire the cancellation signal for a document's running job
    pub fn cancel(&self, document_id: Uuid) -> bool {
        let cancellations = self.cancellations.lock().expect("cancellation lock poisoned");
        match cancellations.get(&document_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a document currently has a queued or running job
    pub fn is_active(&self, document_id: Uuid) -> bool {
        self.active
            .lock()
            .expect("active lock poisoned")
            .contains(&document_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker_keeps_latest() {
        let tracker = ProgressTracker::new();
        let id = Uuid::new_v4();

        tracker.report(id, JobProgress::new(20, "extracting"));
        tracker.report(id, JobProgress::new(55, "embedding"));

        let latest = tracker.latest(id).unwrap();
        assert_eq!(latest.percentage, 55);
        assert_eq!(latest.message, "embedding");
        assert!(tracker.latest(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_embed_progress_mapping() {
        // The 35 -> 85 range maps linearly over completed batches
        let map = |done: usize, total: usize| 35 + ((done * 50) / total.max(1)) as u8;
        assert_eq!(map(0, 5), 35);
        assert_eq!(map(1, 5), 45);
        assert_eq!(map(5, 5), 85);
        assert_eq!(map(0, 0), 35);
    }
}
