//! Text extraction from uploaded documents
//!
//! Both processors share one contract: bytes in, extracted content plus
//! structure (pages or sections) and free-form metadata out. Errors carry
//! the taxonomy tags the indexing worker uses for retry classification.

pub mod pdf;
pub mod text;

use crate::config::IndexingConfig;
use crate::error::{ProcessingError, Result};
use crate::models::Document;
use crate::objects::ObjectStore;
use std::collections::HashMap;
use tracing::debug;

/// Per-page content with character offsets into the concatenated text
#[derive(Debug, Clone, PartialEq)]
pub struct PageContent {
    pub page_number: i64,
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

/// A heading-delimited span of a markdown document
///
/// Line numbers are 0-based; `end_line` is inclusive. The synthetic
/// pre-heading section has level 0 and an empty heading.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub heading: String,
    pub level: u8,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Output of a document processor
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    /// Full extracted text
    pub content: String,
    /// Page spans, present for PDFs
    pub pages: Vec<PageContent>,
    /// Heading sections, present for markdown
    pub sections: Vec<Section>,
    /// Free-form metadata persisted onto the document record
    pub metadata: HashMap<String, String>,
    /// False when the PDF looks scanned (no usable text layer)
    pub has_extracted_text: bool,
}

impl ProcessedDocument {
    /// Resolve the page holding a character offset, if page spans exist
    ///
    /// Offsets between two spans (inside a page delimiter) resolve to the
    /// following page.
    pub fn page_for_offset(&self, offset: usize) -> Option<i64> {
        self.pages
            .iter()
            .find(|p| offset < p.end_offset)
            .map(|p| p.page_number)
    }
}

/// Download a document's bytes and dispatch to the processor for its MIME type
pub async fn process_document(
    objects: &dyn ObjectStore,
    config: &IndexingConfig,
    document: &Document,
) -> Result<ProcessedDocument> {
    let bytes = objects.get(document.campaign_id, document.id).await?;

    if bytes.is_empty() {
        return Err(ProcessingError::EmptyFile.into());
    }

    debug!(
        "Processing document {} ({}, {} bytes)",
        document.id,
        document.mime_type,
        bytes.len()
    );

    match document.mime_type.as_str() {
        "application/pdf" => pdf::process(
            &bytes,
            &config.page_delimiter,
            config.scanned_page_threshold,
        ),
        "text/markdown" | "text/x-markdown" => text::process(&bytes, true),
        "text/plain" => text::process(&bytes, false),
        other => Err(ProcessingError::UnsupportedMimeType(other.to_string()).into()),
    }
}
