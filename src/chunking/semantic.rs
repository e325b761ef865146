//! Heading-driven semantic chunking

use super::{estimate_tokens, fixed, ChunkInput, DraftChunk, FixedSizeOptions, SemanticOptions};
use crate::error::Result;
use crate::processor::Section;

/// A section flattened to the configured heading depth
struct Unit {
    heading: Option<String>,
    content: String,
    start_offset: usize,
    end_offset: usize,
}

/// Chunk by sections: whole sections when they fit, accumulation of small
/// ones, fixed-size splitting of oversized ones
///
/// Falls back to fixed-size chunking when the input has no sections.
pub fn chunk(input: &ChunkInput, options: &SemanticOptions) -> Result<Vec<DraftChunk>> {
    if input.sections.is_empty() {
        return fixed::chunk(input.content, &FixedSizeOptions::default());
    }

    let units = flatten_sections(input.content, input.sections, options.max_heading_level);
    let split_options = oversize_split_options(options);

    let mut chunks: Vec<DraftChunk> = Vec::new();
    let mut pending: Option<Unit> = None;

    for unit in units {
        let tokens = estimate_tokens(&unit.content);

        if tokens > options.max_tokens {
            // Oversized: flush whatever small sections were accumulating,
            // then split this one on its own
            if let Some(p) = pending.take() {
                chunks.push(unit_chunk(&p));
            }
            for piece in fixed::chunk(&unit.content, &split_options)? {
                chunks.push(DraftChunk {
                    start_offset: unit.start_offset + piece.start_offset,
                    end_offset: unit.start_offset + piece.end_offset,
                    section: unit.heading.clone(),
                    ..piece
                });
            }
        } else if tokens >= options.min_tokens {
            if let Some(p) = pending.take() {
                chunks.push(unit_chunk(&p));
            }
            chunks.push(unit_chunk(&unit));
        } else {
            // Undersized: accumulate until the threshold is reached
            let merged = match pending.take() {
                Some(mut p) => {
                    p.content.push_str("\n\n");
                    if let Some(h) = &unit.heading {
                        p.content.push_str(h);
                        p.content.push('\n');
                    }
                    p.content.push_str(&unit.content);
                    p.end_offset = unit.end_offset;
                    p
                }
                None => unit,
            };

            if estimate_tokens(&merged.content) >= options.min_tokens {
                chunks.push(unit_chunk(&merged));
            } else {
                pending = Some(merged);
            }
        }
    }

    if let Some(p) = pending {
        chunks.push(unit_chunk(&p));
    }

    chunks.retain(|c| !c.content.trim().is_empty());
    Ok(chunks)
}

fn unit_chunk(unit: &Unit) -> DraftChunk {
    DraftChunk {
        content: unit.content.clone(),
        start_offset: unit.start_offset,
        end_offset: unit.end_offset,
        token_count: estimate_tokens(&unit.content),
        section: unit.heading.clone(),
        page_number: None,
    }
}

/// Split options for oversized sections, bounded by the semantic maximum
fn oversize_split_options(options: &SemanticOptions) -> FixedSizeOptions {
    let defaults = FixedSizeOptions::default();
    FixedSizeOptions {
        target_tokens: options.max_tokens,
        overlap_tokens: defaults.overlap_tokens.min(options.max_tokens / 4),
        min_chunk_tokens: defaults.min_chunk_tokens,
    }
}

/// Collapse sections deeper than `max_heading_level` into their parent
fn flatten_sections(content: &str, sections: &[Section], max_heading_level: u8) -> Vec<Unit> {
    let line_starts = line_start_offsets(content);
    let offset_of_line = |line: usize| *line_starts.get(line).unwrap_or(&content.len());
    let end_of_line = |line: usize| {
        line_starts
            .get(line + 1)
            .map(|&next| next.saturating_sub(1))
            .unwrap_or(content.len())
    };

    let mut units: Vec<Unit> = Vec::new();

    for section in sections {
        // Heading sections start their body one line below the heading
        let body_line = if section.level == 0 {
            section.start_line
        } else {
            section.start_line + 1
        };
        let start_offset = offset_of_line(body_line.min(section.end_line));
        let end_offset = end_of_line(section.end_line);

        if section.level <= max_heading_level {
            let heading = (!section.heading.is_empty()).then(|| section.heading.clone());
            units.push(Unit {
                heading,
                content: section.content.clone(),
                start_offset,
                end_offset,
            });
        } else if let Some(parent) = units.last_mut() {
            parent.content.push_str("\n\n");
            parent.content.push_str(&section.heading);
            parent.content.push('\n');
            parent.content.push_str(&section.content);
            parent.end_offset = end_offset;
        } else {
            units.push(Unit {
                heading: (!section.heading.is_empty()).then(|| section.heading.clone()),
                content: section.content.clone(),
                start_offset,
                end_offset,
            });
        }
    }

    units
}

/// Byte offset of each line start
fn line_start_offsets(content: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in content.bytes().enumerate() {
        if b == b'\n' && i + 1 < content.len() {
            starts.push(i + 1);
        }
    }
    starts
}
