//! Document and chunk persistence over SQLite
//!
//! Embeddings are stored as little-endian `f32` blobs and scored in
//! application code, partitioned by campaign. Chunk writes are partitioned
//! by document; no cross-document locking is required.

use crate::error::{Result, SearchError};
use crate::models::{Chunk, Document, DocumentStatus, DocumentType};
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum rows per chunk insert statement batch
const INSERT_BATCH_SIZE: usize = 100;

/// SQLite-backed store for documents and their chunks
pub struct SqliteStore {
    pool: SqlitePool,
    dimension: usize,
}

impl SqliteStore {
    /// Connect and create the schema if needed
    pub async fn connect(database_url: &str, dimension: usize) -> Result<Self> {
        info!("Initializing SQLite store");

        // Ensure the directory for the database file exists
        if let Some(db_path) = database_url.strip_prefix("sqlite:") {
            let db_path = db_path.split('?').next().unwrap_or(db_path);
            if db_path != ":memory:" {
                if let Some(parent) = std::path::Path::new(db_path).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(|e| {
                            SearchError::StorageFailed(format!(
                                "Failed to create database directory: {}",
                                e
                            ))
                        })?;
                    }
                }
            }
        }

        // Add SQLite create mode if not present
        let database_url = if database_url.contains(":memory:") {
            database_url.to_string()
        } else if database_url.contains('?') {
            if !database_url.contains("mode=") {
                format!("{}&mode=rwc", database_url)
            } else {
                database_url.to_string()
            }
        } else {
            format!("{}?mode=rwc", database_url)
        };

        let pool = SqlitePool::connect(&database_url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL,
                name TEXT NOT NULL,
                document_type TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                status TEXT NOT NULL,
                failure_message TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                chunk_count INTEGER NOT NULL DEFAULT 0,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                campaign_id TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                chunk_index INTEGER NOT NULL,
                token_count INTEGER NOT NULL,
                page_number INTEGER,
                section TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (document_id, chunk_index)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunks_campaign_document \
             ON chunks(campaign_id, document_id)",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_documents_campaign ON documents(campaign_id)",
        )
        .execute(&pool)
        .await?;

        info!("SQLite store initialized");
        Ok(Self { pool, dimension })
    }

    /// Expected embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Serialize embedding for storage
    pub fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding
            .iter()
            .flat_map(|f| f.to_le_bytes().to_vec())
            .collect()
    }

    /// Deserialize embedding from storage
    pub fn deserialize_embedding(data: &[u8]) -> Vec<f32> {
        data.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Calculate cosine similarity between two vectors
    pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }

        dot_product / (norm_a * norm_b)
    }

    // ----- documents -----

    /// Insert a new document record
    pub async fn insert_document(&self, document: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents
                (id, campaign_id, name, document_type, mime_type, status,
                 failure_message, metadata, chunk_count, tags, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(document.id.to_string())
        .bind(document.campaign_id.to_string())
        .bind(&document.name)
        .bind(document.document_type.as_str())
        .bind(&document.mime_type)
        .bind(document.status.as_str())
        .bind(&document.failure_message)
        .bind(serde_json::to_string(&document.metadata)?)
        .bind(document.chunk_count)
        .bind(serde_json::to_string(&document.tags)?)
        .bind(document.created_at.to_rfc3339())
        .bind(document.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!("Inserted document {}", document.id);
        Ok(())
    }

    /// Load a document by id
    pub async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::row_to_document(&r)).transpose()
    }

    /// List a campaign's documents, newest first
    pub async fn list_documents(&self, campaign_id: Uuid) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE campaign_id = ?1 ORDER BY created_at DESC",
        )
        .bind(campaign_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_document).collect()
    }

    /// Update document status, clearing or setting the failure message
    pub async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        failure_message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET status = ?1, failure_message = ?2, updated_at = ?3 \
             WHERE id = ?4",
        )
        .bind(status.as_str())
        .bind(failure_message)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!("No document found with ID: {}", id);
        }
        Ok(())
    }

    /// Merge extracted metadata into the document record
    pub async fn merge_document_metadata(
        &self,
        id: Uuid,
        metadata: &HashMap<String, String>,
    ) -> Result<()> {
        let Some(document) = self.get_document(id).await? else {
            warn!("No document found with ID: {}", id);
            return Ok(());
        };

        let mut merged = document.metadata;
        merged.extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));

        sqlx::query("UPDATE documents SET metadata = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(serde_json::to_string(&merged)?)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Mark a document ready with its final chunk count
    pub async fn finalize_document(&self, id: Uuid, chunk_count: i64) -> Result<()> {
        let mut metadata = HashMap::new();
        metadata.insert("embeddings_generated".to_string(), "true".to_string());
        self.merge_document_metadata(id, &metadata).await?;

        sqlx::query(
            "UPDATE documents SET status = ?1, chunk_count = ?2, failure_message = NULL, \
             updated_at = ?3 WHERE id = ?4",
        )
        .bind(DocumentStatus::Ready.as_str())
        .bind(chunk_count)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Delete a document and cascade to its chunks
    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        self.delete_chunks_for_document(id).await?;

        let result = sqlx::query("DELETE FROM documents WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!("No document found with ID: {}", id);
        } else {
            debug!("Deleted document {}", id);
        }
        Ok(())
    }

    /// Resolve a tag filter to the campaign's matching document ids
    pub async fn document_ids_for_tags(
        &self,
        campaign_id: Uuid,
        tags: &[String],
    ) -> Result<Vec<Uuid>> {
        let documents = self.list_documents(campaign_id).await?;

        Ok(documents
            .into_iter()
            .filter(|d| d.tags.iter().any(|t| tags.contains(t)))
            .map(|d| d.id)
            .collect())
    }

    // ----- chunks -----

    /// Insert chunks in ascending `chunk_index` order, batched
    pub async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        for chunk in chunks {
            if chunk.embedding.len() != self.dimension {
                return Err(SearchError::InvalidDimension {
                    expected: self.dimension,
                    actual: chunk.embedding.len(),
                }
                .into());
            }
        }

        let mut ordered: Vec<&Chunk> = chunks.iter().collect();
        ordered.sort_by_key(|c| c.chunk_index);

        for batch in ordered.chunks(INSERT_BATCH_SIZE) {
            let mut tx = self.pool.begin().await?;

            for chunk in batch {
                sqlx::query(
                    r#"
                    INSERT INTO chunks
                        (id, document_id, campaign_id, content, embedding,
                         chunk_index, token_count, page_number, section, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                    "#,
                )
                .bind(chunk.id.to_string())
                .bind(chunk.document_id.to_string())
                .bind(chunk.campaign_id.to_string())
                .bind(&chunk.content)
                .bind(Self::serialize_embedding(&chunk.embedding))
                .bind(chunk.chunk_index)
                .bind(chunk.token_count)
                .bind(chunk.page_number)
                .bind(&chunk.section)
                .bind(chunk.created_at.to_rfc3339())
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
        }

        debug!("Inserted {} chunks", chunks.len());
        Ok(())
    }

    /// Delete all chunks of a document, returning the number removed
    pub async fn delete_chunks_for_document(&self, document_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?1")
            .bind(document_id.to_string())
            .execute(&self.pool)
            .await?;

        debug!(
            "Deleted {} chunks for document {}",
            result.rows_affected(),
            document_id
        );
        Ok(result.rows_affected())
    }

    /// Count the stored chunks of a document
    pub async fn count_chunks(&self, document_id: Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM chunks WHERE document_id = ?1")
            .bind(document_id.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    /// Load the chunks of a document in index order
    pub async fn chunks_for_document(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT * FROM chunks WHERE document_id = ?1 ORDER BY chunk_index ASC",
        )
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_chunk).collect()
    }

    /// Fetch a campaign's searchable chunks with their ready documents
    ///
    /// Optional id and type filters narrow the partition before scoring.
    pub async fn fetch_search_candidates(
        &self,
        campaign_id: Uuid,
        document_ids: Option<&[Uuid]>,
        document_types: Option<&[DocumentType]>,
    ) -> Result<Vec<(Chunk, Document)>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id as c_id, c.document_id, c.campaign_id, c.content, c.embedding,
                   c.chunk_index, c.token_count, c.page_number, c.section,
                   c.created_at as c_created_at,
                   d.id as d_id, d.campaign_id as d_campaign_id, d.name, d.document_type,
                   d.mime_type, d.status, d.failure_message, d.metadata, d.chunk_count,
                   d.tags, d.created_at as d_created_at, d.updated_at as d_updated_at
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE c.campaign_id = ?1 AND d.status = 'ready'
            "#,
        )
        .bind(campaign_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SearchError::SearchFailed(e.to_string()))?;

        let id_filter: Option<Vec<String>> =
            document_ids.map(|ids| ids.iter().map(|id| id.to_string()).collect());
        let type_filter: Option<Vec<&'static str>> =
            document_types.map(|ts| ts.iter().map(DocumentType::as_str).collect());

        let mut candidates = Vec::with_capacity(rows.len());

        for row in &rows {
            let doc_id: String = row.get("document_id");
            if let Some(ids) = &id_filter {
                if !ids.contains(&doc_id) {
                    continue;
                }
            }
            let doc_type: String = row.get("document_type");
            if let Some(types) = &type_filter {
                if !types.contains(&doc_type.as_str()) {
                    continue;
                }
            }

            candidates.push((Self::row_to_joined_chunk(row)?, Self::row_to_joined_document(row)?));
        }

        debug!(
            "Fetched {} search candidates for campaign {}",
            candidates.len(),
            campaign_id
        );
        Ok(candidates)
    }

    // ----- row mapping -----

    fn parse_uuid(raw: &str) -> Result<Uuid> {
        Uuid::parse_str(raw).map_err(|e| SearchError::StorageFailed(e.to_string()).into())
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
        Ok(DateTime::parse_from_rfc3339(raw)
            .map_err(|e| SearchError::StorageFailed(e.to_string()))?
            .with_timezone(&Utc))
    }

    fn parse_enum<T: std::str::FromStr<Err = String>>(raw: &str) -> Result<T> {
        raw.parse()
            .map_err(|e: String| SearchError::StorageFailed(e).into())
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
        let id: String = row.get("id");
        let campaign_id: String = row.get("campaign_id");
        let document_type: String = row.get("document_type");
        let status: String = row.get("status");
        let metadata: String = row.get("metadata");
        let tags: String = row.get("tags");
        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        Ok(Document {
            id: Self::parse_uuid(&id)?,
            campaign_id: Self::parse_uuid(&campaign_id)?,
            name: row.get("name"),
            document_type: Self::parse_enum(&document_type)?,
            mime_type: row.get("mime_type"),
            status: Self::parse_enum(&status)?,
            failure_message: row.get("failure_message"),
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            chunk_count: row.get("chunk_count"),
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            created_at: Self::parse_timestamp(&created_at)?,
            updated_at: Self::parse_timestamp(&updated_at)?,
        })
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
        let id: String = row.get("id");
        let document_id: String = row.get("document_id");
        let campaign_id: String = row.get("campaign_id");
        let embedding: Vec<u8> = row.get("embedding");
        let created_at: String = row.get("created_at");

        Ok(Chunk {
            id: Self::parse_uuid(&id)?,
            document_id: Self::parse_uuid(&document_id)?,
            campaign_id: Self::parse_uuid(&campaign_id)?,
            content: row.get("content"),
            embedding: Self::deserialize_embedding(&embedding),
            chunk_index: row.get("chunk_index"),
            token_count: row.get("token_count"),
            page_number: row.get("page_number"),
            section: row.get("section"),
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    fn row_to_joined_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
        let id: String = row.get("c_id");
        let document_id: String = row.get("document_id");
        let campaign_id: String = row.get("campaign_id");
        let embedding: Vec<u8> = row.get("embedding");
        let created_at: String = row.get("c_created_at");

        Ok(Chunk {
            id: Self::parse_uuid(&id)?,
            document_id: Self::parse_uuid(&document_id)?,
            campaign_id: Self::parse_uuid(&campaign_id)?,
            content: row.get("content"),
            embedding: Self::deserialize_embedding(&embedding),
            chunk_index: row.get("chunk_index"),
            token_count: row.get("token_count"),
            page_number: row.get("page_number"),
            section: row.get("section"),
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    fn row_to_joined_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document> {
        let id: String = row.get("d_id");
        let campaign_id: String = row.get("d_campaign_id");
        let document_type: String = row.get("document_type");
        let status: String = row.get("status");
        let metadata: String = row.get("metadata");
        let tags: String = row.get("tags");
        let created_at: String = row.get("d_created_at");
        let updated_at: String = row.get("d_updated_at");

        Ok(Document {
            id: Self::parse_uuid(&id)?,
            campaign_id: Self::parse_uuid(&campaign_id)?,
            name: row.get("name"),
            document_type: Self::parse_enum(&document_type)?,
            mime_type: row.get("mime_type"),
            status: Self::parse_enum(&status)?,
            failure_message: row.get("failure_message"),
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            chunk_count: row.get("chunk_count"),
            tags: serde_json::from_str(&tags).unwrap_or_default(),
            created_at: Self::parse_timestamp(&created_at)?,
            updated_at: Self::parse_timestamp(&updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 4).await.unwrap()
    }

    fn test_chunk(document: &Document, index: i64, content: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            document_id: document.id,
            campaign_id: document.campaign_id,
            content: content.to_string(),
            embedding: vec![0.1, 0.2, 0.3, 0.4],
            chunk_index: index,
            token_count: content.len().div_ceil(4) as i64,
            page_number: None,
            section: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let store = test_store().await;
        let doc = Document::new(
            Uuid::new_v4(),
            "manual.pdf",
            DocumentType::Rulebook,
            "application/pdf",
        );

        store.insert_document(&doc).await.unwrap();

        let loaded = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "manual.pdf");
        assert_eq!(loaded.status, DocumentStatus::Pending);

        store
            .update_document_status(doc.id, DocumentStatus::Processing, None)
            .await
            .unwrap();
        let processing = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(processing.status, DocumentStatus::Processing);

        store.finalize_document(doc.id, 3).await.unwrap();
        let ready = store.get_document(doc.id).await.unwrap().unwrap();
        assert_eq!(ready.status, DocumentStatus::Ready);
        assert_eq!(ready.chunk_count, 3);
        assert_eq!(
            ready.metadata.get("embeddings_generated").map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_chunk_insert_and_cascade_delete() {
        let store = test_store().await;
        let doc = Document::new(Uuid::new_v4(), "notes.md", DocumentType::Notes, "text/markdown");
        store.insert_document(&doc).await.unwrap();

        let chunks: Vec<Chunk> = (0..5)
            .map(|i| test_chunk(&doc, i, &format!("chunk {}", i)))
            .collect();
        store.insert_chunks(&chunks).await.unwrap();

        assert_eq!(store.count_chunks(doc.id).await.unwrap(), 5);

        let loaded = store.chunks_for_document(doc.id).await.unwrap();
        assert_eq!(loaded.len(), 5);
        for (i, chunk) in loaded.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i64);
            assert_eq!(chunk.embedding.len(), 4);
        }

        store.delete_document(doc.id).await.unwrap();
        assert_eq!(store.count_chunks(doc.id).await.unwrap(), 0);
        assert!(store.get_document(doc.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_chunk_index_rejected() {
        let store = test_store().await;
        let doc = Document::new(Uuid::new_v4(), "notes.md", DocumentType::Notes, "text/plain");
        store.insert_document(&doc).await.unwrap();

        store
            .insert_chunks(&[test_chunk(&doc, 0, "first")])
            .await
            .unwrap();
        let duplicate = store.insert_chunks(&[test_chunk(&doc, 0, "again")]).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = test_store().await;
        let doc = Document::new(Uuid::new_v4(), "notes.md", DocumentType::Notes, "text/plain");
        store.insert_document(&doc).await.unwrap();

        let mut chunk = test_chunk(&doc, 0, "bad");
        chunk.embedding = vec![0.1; 8];
        assert!(store.insert_chunks(&[chunk]).await.is_err());
    }

    #[tokio::test]
    async fn test_tag_resolution() {
        let store = test_store().await;
        let campaign = Uuid::new_v4();

        let tagged = Document::new(campaign, "a.md", DocumentType::Notes, "text/markdown")
            .with_tags(vec!["undead".to_string(), "villains".to_string()]);
        let untagged = Document::new(campaign, "b.md", DocumentType::Notes, "text/markdown");
        store.insert_document(&tagged).await.unwrap();
        store.insert_document(&untagged).await.unwrap();

        let hits = store
            .document_ids_for_tags(campaign, &["undead".to_string()])
            .await
            .unwrap();
        assert_eq!(hits, vec![tagged.id]);

        let none = store
            .document_ids_for_tags(campaign, &["dragons".to_string()])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_search_candidates_require_ready_documents() {
        let store = test_store().await;
        let campaign = Uuid::new_v4();
        let doc = Document::new(campaign, "a.md", DocumentType::Notes, "text/markdown");
        store.insert_document(&doc).await.unwrap();
        store
            .insert_chunks(&[test_chunk(&doc, 0, "pending content")])
            .await
            .unwrap();

        // Still pending: invisible to search
        let candidates = store
            .fetch_search_candidates(campaign, None, None)
            .await
            .unwrap();
        assert!(candidates.is_empty());

        store.finalize_document(doc.id, 1).await.unwrap();
        let candidates = store
            .fetch_search_candidates(campaign, None, None)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].1.name, "a.md");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert_eq!(SqliteStore::cosine_similarity(&a, &b), 1.0);
        assert_eq!(SqliteStore::cosine_similarity(&a, &c), 0.0);
    }

    #[test]
    fn test_embedding_serialization() {
        let embedding = vec![1.5, -2.3, 0.0, 42.1];
        let serialized = SqliteStore::serialize_embedding(&embedding);
        let deserialized = SqliteStore::deserialize_embedding(&serialized);

        assert_eq!(embedding.len(), deserialized.len());
        for (orig, deser) in embedding.iter().zip(deserialized.iter()) {
            assert!((orig - deser).abs() < f32::EPSILON);
        }
    }
}
