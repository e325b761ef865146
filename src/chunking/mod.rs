//! Splitting extracted content into embedding-sized units
//!
//! Three strategies: plain fixed-size walking with natural-break backscan,
//! heading-driven semantic accumulation, and markdown-aware cutting that
//! keeps code fences and list runs intact.

pub mod fixed;
pub mod markdown;
pub mod semantic;

use crate::error::{ChunkingError, Result};
use crate::processor::{PageContent, Section};
use serde::{Deserialize, Serialize};

/// Estimate the token count of a text as `ceil(len / 4)`
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Chunking strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStrategy {
    #[serde(rename = "fixed-size")]
    FixedSize,
    #[serde(rename = "semantic")]
    Semantic,
    #[serde(rename = "markdown")]
    Markdown,
}

impl std::str::FromStr for ChunkStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fixed-size" => Ok(ChunkStrategy::FixedSize),
            "semantic" => Ok(ChunkStrategy::Semantic),
            "markdown" | "markdown-aware" => Ok(ChunkStrategy::Markdown),
            other => Err(format!("unknown chunking strategy: {}", other)),
        }
    }
}

/// Options for fixed-size chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedSizeOptions {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    pub min_chunk_tokens: usize,
}

impl Default for FixedSizeOptions {
    fn default() -> Self {
        Self {
            target_tokens: 128,
            overlap_tokens: 24,
            min_chunk_tokens: 20,
        }
    }
}

/// Options for semantic (heading-driven) chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticOptions {
    /// Sections above this fit into a single chunk
    pub max_tokens: usize,
    /// Accumulation threshold for undersized sections
    pub min_tokens: usize,
    /// Headings deeper than this merge into their parent section
    pub max_heading_level: u8,
}

impl Default for SemanticOptions {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            min_tokens: 64,
            max_heading_level: 3,
        }
    }
}

/// Options for markdown-aware chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkdownOptions {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    pub preserve_code_blocks: bool,
    pub preserve_lists: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            target_tokens: 128,
            overlap_tokens: 24,
            preserve_code_blocks: true,
            preserve_lists: true,
        }
    }
}

/// Strategy plus its options
#[derive(Debug, Clone)]
pub enum ChunkOptions {
    FixedSize(FixedSizeOptions),
    Semantic(SemanticOptions),
    Markdown(MarkdownOptions),
}

impl ChunkOptions {
    pub fn strategy(&self) -> ChunkStrategy {
        match self {
            ChunkOptions::FixedSize(_) => ChunkStrategy::FixedSize,
            ChunkOptions::Semantic(_) => ChunkStrategy::Semantic,
            ChunkOptions::Markdown(_) => ChunkStrategy::Markdown,
        }
    }

    /// Default options for a named strategy
    pub fn for_strategy(strategy: ChunkStrategy) -> Self {
        match strategy {
            ChunkStrategy::FixedSize => ChunkOptions::FixedSize(FixedSizeOptions::default()),
            ChunkStrategy::Semantic => ChunkOptions::Semantic(SemanticOptions::default()),
            ChunkStrategy::Markdown => ChunkOptions::Markdown(MarkdownOptions::default()),
        }
    }
}

/// Input to the chunker: content plus whatever structure extraction found
#[derive(Debug, Clone, Default)]
pub struct ChunkInput<'a> {
    pub content: &'a str,
    pub sections: &'a [Section],
    pub pages: &'a [PageContent],
}

impl<'a> ChunkInput<'a> {
    pub fn from_content(content: &'a str) -> Self {
        Self {
            content,
            sections: &[],
            pages: &[],
        }
    }
}

/// A chunk before embedding and persistence
#[derive(Debug, Clone, PartialEq)]
pub struct DraftChunk {
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub token_count: usize,
    pub section: Option<String>,
    pub page_number: Option<i64>,
}

/// Result of a chunking run
#[derive(Debug, Clone)]
pub struct ChunkingOutcome {
    pub chunks: Vec<DraftChunk>,
    pub strategy: ChunkStrategy,
    pub total_tokens: usize,
    pub average_chunk_tokens: usize,
}

/// Split content according to the selected strategy
pub fn chunk(input: &ChunkInput, options: &ChunkOptions) -> Result<ChunkingOutcome> {
    if input.content.trim().is_empty() {
        return Err(ChunkingError::EmptyContent.into());
    }

    let mut chunks = match options {
        ChunkOptions::FixedSize(opts) => fixed::chunk(input.content, opts)?,
        ChunkOptions::Semantic(opts) => semantic::chunk(input, opts)?,
        ChunkOptions::Markdown(opts) => markdown::chunk(input.content, opts)?,
    };

    // PDF inputs: resolve each chunk's page from the page offset ranges.
    // A chunk starting between two page spans (inside the delimiter)
    // belongs to the page that follows.
    if !input.pages.is_empty() {
        for chunk in &mut chunks {
            if chunk.page_number.is_none() {
                chunk.page_number = input
                    .pages
                    .iter()
                    .find(|p| chunk.start_offset < p.end_offset)
                    .map(|p| p.page_number);
            }
        }
    }

    let total_tokens: usize = chunks.iter().map(|c| c.token_count).sum();
    let average_chunk_tokens = if chunks.is_empty() {
        0
    } else {
        total_tokens / chunks.len()
    };

    Ok(ChunkingOutcome {
        chunks,
        strategy: options.strategy(),
        total_tokens,
        average_chunk_tokens,
    })
}
