//! Fixed-size chunking with natural-break backscan

use super::{estimate_tokens, DraftChunk, FixedSizeOptions};
use crate::error::{ChunkingError, Result};

/// Walk the content emitting ~target-sized chunks with overlap
///
/// At each cut the walker seeks backward within 10% of the target for the
/// best natural break: double newline, then newline, then a sentence
/// terminator followed by whitespace, then a plain space. A tail shorter
/// than `min_chunk_tokens` merges into the previous chunk.
pub fn chunk(content: &str, options: &FixedSizeOptions) -> Result<Vec<DraftChunk>> {
    validate(options)?;

    let target_chars = options.target_tokens * 4;
    let overlap_chars = options.overlap_tokens * 4;
    let min_chars = options.min_chunk_tokens * 4;
    let window = (target_chars / 10).max(1);

    let len = content.len();
    let mut chunks: Vec<DraftChunk> = Vec::new();
    let mut start = 0usize;

    while start < len {
        let remaining = len - start;

        if remaining <= target_chars {
            // Final piece: merge into the previous chunk if it is a stub
            if remaining < min_chars && !chunks.is_empty() {
                let last = chunks.last_mut().expect("chunks not empty");
                last.end_offset = len;
                last.content = content[last.start_offset..len].to_string();
                last.token_count = estimate_tokens(&last.content);
            } else {
                push_chunk(&mut chunks, content, start, len);
            }
            break;
        }

        let end = find_cut(content, start, start + target_chars, window);
        push_chunk(&mut chunks, content, start, end);

        let mut next = end.saturating_sub(overlap_chars);
        while next > 0 && !content.is_char_boundary(next) {
            next -= 1;
        }
        // Overlap must never stall the walk
        if next <= start {
            next = end;
        }
        start = next;
    }

    chunks.retain(|c| !c.content.trim().is_empty());
    Ok(chunks)
}

/// Pick the cut position for a chunk ending near `ideal_end`
///
/// Searches `[ideal_end - window, ideal_end]` for breaks in priority order
/// and returns the rightmost hit of the best class, falling back to a hard
/// cut on a char boundary.
pub fn find_cut(content: &str, start: usize, ideal_end: usize, window: usize) -> usize {
    let mut ideal_end = ideal_end.min(content.len());
    while ideal_end > start && !content.is_char_boundary(ideal_end) {
        ideal_end -= 1;
    }

    let mut win_start = ideal_end.saturating_sub(window).max(start);
    while win_start < ideal_end && !content.is_char_boundary(win_start) {
        win_start += 1;
    }
    let slice = &content[win_start..ideal_end];

    // Double newline: cut after the blank line
    if let Some(pos) = slice.rfind("\n\n") {
        return win_start + pos + 2;
    }

    // Single newline: cut after it
    if let Some(pos) = slice.rfind('\n') {
        return win_start + pos + 1;
    }

    // Sentence terminator followed by whitespace
    if let Some(pos) = rfind_sentence_end(slice) {
        return win_start + pos + 1;
    }

    // Word boundary
    if let Some(pos) = slice.rfind(' ') {
        return win_start + pos + 1;
    }

    ideal_end
}

/// Rightmost `.`/`!`/`?` whose successor is a space or newline
fn rfind_sentence_end(slice: &str) -> Option<usize> {
    let bytes = slice.as_bytes();
    let mut best = None;
    for (i, &b) in bytes.iter().enumerate() {
        if matches!(b, b'.' | b'!' | b'?') {
            match bytes.get(i + 1) {
                Some(b' ') | Some(b'\n') => best = Some(i),
                _ => {}
            }
        }
    }
    best
}

fn push_chunk(chunks: &mut Vec<DraftChunk>, content: &str, start: usize, end: usize) {
    let text = &content[start..end];
    chunks.push(DraftChunk {
        content: text.to_string(),
        start_offset: start,
        end_offset: end,
        token_count: estimate_tokens(text),
        section: None,
        page_number: None,
    });
}

fn validate(options: &FixedSizeOptions) -> Result<()> {
    if options.target_tokens == 0 {
        return Err(ChunkingError::InvalidOptions("target_tokens must be > 0".to_string()).into());
    }
    if options.overlap_tokens >= options.target_tokens {
        return Err(ChunkingError::InvalidOptions(
            "overlap_tokens must be smaller than target_tokens".to_string(),
        )
        .into());
    }
    Ok(())
}
