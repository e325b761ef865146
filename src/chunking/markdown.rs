//! Markdown-aware chunking
//!
//! Cuts follow the fixed-size walk, but fenced code blocks and list runs
//! are treated as protected spans: a cut landing inside one either extends
//! the chunk to the span's end (when that stays within 1.5x the target) or
//! moves back to just before the span.

use super::{estimate_tokens, fixed, DraftChunk, MarkdownOptions};
use crate::error::{ChunkingError, Result};
use crate::processor::text::parse_atx_heading;
use regex::Regex;
use std::sync::LazyLock;

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+\.)\s").expect("valid list item regex"));

/// A byte range that must not be cut through
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProtectedSpan {
    pub start: usize,
    pub end: usize,
}

impl ProtectedSpan {
    fn contains_cut(&self, pos: usize) -> bool {
        pos > self.start && pos < self.end
    }
}

/// Chunk markdown content, keeping protected spans intact
pub fn chunk(content: &str, options: &MarkdownOptions) -> Result<Vec<DraftChunk>> {
    if options.target_tokens == 0 {
        return Err(ChunkingError::InvalidOptions("target_tokens must be > 0".to_string()).into());
    }
    if options.overlap_tokens >= options.target_tokens {
        return Err(ChunkingError::InvalidOptions(
            "overlap_tokens must be smaller than target_tokens".to_string(),
        )
        .into());
    }

    let target_chars = options.target_tokens * 4;
    let overlap_chars = options.overlap_tokens * 4;
    let window = (target_chars / 10).max(1);
    let max_extended = target_chars + target_chars / 2;

    let spans = protected_spans(content, options.preserve_code_blocks, options.preserve_lists);
    let len = content.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < len {
        if len - start <= target_chars {
            push_chunk(&mut chunks, content, start, len);
            break;
        }

        let mut cut = fixed::find_cut(content, start, start + target_chars, window);

        if let Some(span) = spans.iter().find(|s| s.contains_cut(cut)) {
            if span.end - start <= max_extended {
                cut = span.end.min(len);
            } else if span.start > start {
                cut = span.start;
            } else {
                // A single protected span larger than the extended budget
                // that opens the chunk: keep it whole anyway
                cut = span.end.min(len);
            }
        }

        push_chunk(&mut chunks, content, start, cut);

        let mut next = cut.saturating_sub(overlap_chars);
        while next > 0 && !content.is_char_boundary(next) {
            next -= 1;
        }
        // Never restart the overlap inside a protected span
        if let Some(span) = spans.iter().find(|s| s.contains_cut(next)) {
            next = span.end.min(cut);
        }
        if next <= start {
            next = cut;
        }
        start = next;
    }

    chunks.retain(|c| !c.content.trim().is_empty());
    Ok(chunks)
}

fn push_chunk(chunks: &mut Vec<DraftChunk>, content: &str, start: usize, end: usize) {
    let text = &content[start..end];
    chunks.push(DraftChunk {
        content: text.to_string(),
        start_offset: start,
        end_offset: end,
        token_count: estimate_tokens(text),
        section: first_heading(text),
        page_number: None,
    });
}

/// Promote the first heading inside a chunk to its section attribute
fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .find_map(parse_atx_heading)
        .map(|(_, heading)| heading)
        .filter(|h| !h.is_empty())
}

/// Locate fenced code blocks and contiguous list runs
pub fn protected_spans(
    content: &str,
    preserve_code_blocks: bool,
    preserve_lists: bool,
) -> Vec<ProtectedSpan> {
    let mut spans = Vec::new();

    let mut offset = 0usize;
    let mut fence_start: Option<usize> = None;
    let mut list_start: Option<usize> = None;
    let mut last_line_end = 0usize;

    for line in content.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let trimmed_line = line.trim_end_matches('\n');

        // Code fences take precedence; list detection pauses inside them
        if preserve_code_blocks && trimmed_line.trim_start().starts_with("```") {
            match fence_start.take() {
                Some(open) => {
                    spans.push(ProtectedSpan {
                        start: open,
                        end: offset,
                    });
                }
                None => {
                    if let Some(open) = list_start.take() {
                        spans.push(ProtectedSpan {
                            start: open,
                            end: last_line_end,
                        });
                    }
                    fence_start = Some(line_start);
                }
            }
            last_line_end = offset;
            continue;
        }

        if fence_start.is_none() && preserve_lists {
            if is_list_item(trimmed_line) {
                list_start.get_or_insert(line_start);
            } else if list_start.is_some() && is_list_continuation(trimmed_line) {
                // Indented continuation stays inside the run
            } else if let Some(open) = list_start.take() {
                spans.push(ProtectedSpan {
                    start: open,
                    end: last_line_end,
                });
            }
        }

        last_line_end = offset;
    }

    // Unclosed fence or trailing list run extends to the end
    if let Some(open) = fence_start {
        spans.push(ProtectedSpan {
            start: open,
            end: content.len(),
        });
    }
    if let Some(open) = list_start {
        spans.push(ProtectedSpan {
            start: open,
            end: content.len(),
        });
    }

    spans.sort_by_key(|s| s.start);
    spans
}

/// `-`, `*`, `+`, or `1.`-style bullet at line start
fn is_list_item(line: &str) -> bool {
    LIST_ITEM_RE.is_match(line)
}

/// Non-empty indented line continuing the current list item
fn is_list_continuation(line: &str) -> bool {
    !line.trim().is_empty() && line.starts_with(|c: char| c == ' ' || c == '\t')
}
