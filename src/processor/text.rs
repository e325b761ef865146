//! Plain text and markdown extraction

use super::{ProcessedDocument, Section};
use crate::error::{ProcessingError, Result};
use std::collections::HashMap;

/// Decode UTF-8 text, normalise line endings, and (for markdown) detect
/// ATX heading sections
pub fn process(bytes: &[u8], markdown: bool) -> Result<ProcessedDocument> {
    let raw = std::str::from_utf8(bytes)
        .map_err(|e| ProcessingError::ParseError(format!("Invalid UTF-8: {}", e)))?;

    let content = raw.replace("\r\n", "\n").replace('\r', "\n");

    if content.trim().is_empty() {
        return Err(ProcessingError::EmptyFile.into());
    }

    let sections = if markdown {
        detect_sections(&content)
    } else {
        Vec::new()
    };

    let mut metadata = HashMap::new();
    metadata.insert("char_count".to_string(), content.len().to_string());
    if markdown {
        metadata.insert("section_count".to_string(), sections.len().to_string());
    }

    Ok(ProcessedDocument {
        content,
        pages: Vec::new(),
        sections,
        metadata,
        has_extracted_text: true,
    })
}

/// Split markdown into ordered heading sections
///
/// ATX headings of levels 1-6 open a section; content before the first
/// heading lands in a synthetic level-0 section with an empty heading.
pub fn detect_sections(content: &str) -> Vec<Section> {
    let lines: Vec<&str> = content.lines().collect();
    let mut sections = Vec::new();

    let mut current_heading = String::new();
    let mut current_level: u8 = 0;
    let mut section_start = 0usize;
    let mut body = String::new();
    let mut has_open_section = false;

    let close_section = |sections: &mut Vec<Section>,
                         heading: &str,
                         level: u8,
                         body: &str,
                         start: usize,
                         end: usize| {
        let content = body.trim_end_matches('\n').to_string();
        // The synthetic pre-heading section only exists if it has content
        if level == 0 && content.trim().is_empty() {
            return;
        }
        sections.push(Section {
            heading: heading.to_string(),
            level,
            content,
            start_line: start,
            end_line: end,
        });
    };

    for (line_no, line) in lines.iter().enumerate() {
        if let Some((level, heading)) = parse_atx_heading(line) {
            if has_open_section || !body.trim().is_empty() {
                close_section(
                    &mut sections,
                    &current_heading,
                    current_level,
                    &body,
                    section_start,
                    line_no.saturating_sub(1),
                );
            }
            current_heading = heading;
            current_level = level;
            section_start = line_no;
            body.clear();
            has_open_section = true;
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }

    if has_open_section || !body.trim().is_empty() {
        close_section(
            &mut sections,
            &current_heading,
            current_level,
            &body,
            section_start,
            lines.len().saturating_sub(1),
        );
    }

    sections
}

/// Parse a line as an ATX heading: 1-6 `#` characters followed by a space
pub(crate) fn parse_atx_heading(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();

    if !(1..=6).contains(&hashes) {
        return None;
    }

    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') && !rest.is_empty() {
        return None;
    }

    Some((hashes as u8, rest.trim().trim_end_matches('#').trim().to_string()))
}
