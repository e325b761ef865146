//! PDF text extraction

use super::{PageContent, ProcessedDocument};
use crate::error::{ProcessingError, Result};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Extract per-page text, document info, and the scanned-PDF heuristic
pub fn process(
    bytes: &[u8],
    page_delimiter: &str,
    scanned_threshold: usize,
) -> Result<ProcessedDocument> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ProcessingError::InvalidPdf(e.to_string()))?;

    if doc.is_encrypted() {
        return Err(ProcessingError::EncryptedPdf.into());
    }

    let page_map = doc.get_pages();
    if page_map.is_empty() {
        return Err(ProcessingError::InvalidPdf("PDF has no pages".to_string()).into());
    }

    let mut content = String::new();
    let mut pages = Vec::with_capacity(page_map.len());
    let mut extracted_chars = 0usize;

    for (&page_number, _) in &page_map {
        let page_text = match doc.extract_text(&[page_number]) {
            Ok(text) => normalize_page_text(&text),
            Err(e) => {
                // A single unreadable page does not sink the document
                warn!("Failed to extract text from page {}: {}", page_number, e);
                String::new()
            }
        };

        if page_number > 1 {
            content.push_str(&page_delimiter.replace("{n}", &page_number.to_string()));
        }

        let start_offset = content.len();
        content.push_str(&page_text);
        let end_offset = content.len();
        extracted_chars += page_text.len();

        pages.push(PageContent {
            page_number: i64::from(page_number),
            content: page_text,
            start_offset,
            end_offset,
        });
    }

    let avg_chars_per_page = extracted_chars / page_map.len();
    let has_extracted_text = avg_chars_per_page >= scanned_threshold;
    if !has_extracted_text {
        debug!(
            "PDF looks scanned: {} avg chars/page (threshold {})",
            avg_chars_per_page, scanned_threshold
        );
    }

    let mut metadata = extract_info(&doc);
    metadata.insert("page_count".to_string(), page_map.len().to_string());

    Ok(ProcessedDocument {
        content,
        pages,
        sections: Vec::new(),
        metadata,
        has_extracted_text,
    })
}

fn normalize_page_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Read the PDF info dictionary (title, author, dates)
fn extract_info(doc: &lopdf::Document) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    let Ok(info_obj) = doc.trailer.get(b"Info") else {
        return metadata;
    };

    let info = match info_obj {
        lopdf::Object::Reference(id) => match doc.get_object(*id).and_then(|o| o.as_dict()) {
            Ok(dict) => dict,
            Err(_) => return metadata,
        },
        lopdf::Object::Dictionary(dict) => dict,
        _ => return metadata,
    };

    for (key, field) in [
        (b"Title".as_slice(), "title"),
        (b"Author".as_slice(), "author"),
        (b"Subject".as_slice(), "subject"),
        (b"Producer".as_slice(), "producer"),
    ] {
        if let Some(value) = info.get(key).ok().and_then(decode_pdf_string) {
            if !value.is_empty() {
                metadata.insert(field.to_string(), value);
            }
        }
    }

    for (key, field) in [
        (b"CreationDate".as_slice(), "created"),
        (b"ModDate".as_slice(), "modified"),
    ] {
        if let Some(raw) = info.get(key).ok().and_then(decode_pdf_string) {
            if let Some(date) = parse_pdf_date(&raw) {
                metadata.insert(field.to_string(), date);
            }
        }
    }

    metadata
}

fn decode_pdf_string(obj: &lopdf::Object) -> Option<String> {
    match obj {
        lopdf::Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).trim().to_string()),
        _ => None,
    }
}

/// Parse the PDF date format `D:YYYYMMDDHHmmSS...` into an ISO-8601 string
///
/// Trailing timezone and apostrophe noise is ignored; a date-only prefix is
/// accepted with the time parts defaulting to zero.
pub fn parse_pdf_date(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim_start_matches("D:")
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();

    if digits.len() < 8 {
        return None;
    }

    let year: i32 = digits.get(0..4)?.parse().ok()?;
    let month: u32 = digits.get(4..6)?.parse().ok()?;
    let day: u32 = digits.get(6..8)?.parse().ok()?;
    let hour: u32 = digits.get(8..10).and_then(|s| s.parse().ok()).unwrap_or(0);
    let minute: u32 = digits.get(10..12).and_then(|s| s.parse().ok()).unwrap_or(0);
    let second: u32 = digits.get(12..14).and_then(|s| s.parse().ok()).unwrap_or(0);

    let date = chrono::NaiveDate::from_ymd_opt(year, month, day)?;
    let time = chrono::NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(chrono::NaiveDateTime::new(date, time).format("%Y-%m-%dT%H:%M:%S").to_string())
}
