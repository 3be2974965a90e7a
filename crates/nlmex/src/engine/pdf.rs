use lopdf::{Dictionary, Document, Object};

use crate::engine::nlm::{DocumentMetadata, NlmWriter};
use crate::engine::ExtractionEngine;
use crate::error::ExtractionError;
use crate::sanitize::redact_filename;
use crate::task::ExtractionResult;

/// How far into the content the `%PDF-` header may appear.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Built-in engine reading PDF document info and page text with `lopdf`.
#[derive(Debug, Default, Clone)]
pub struct PdfMetadataEngine;

impl PdfMetadataEngine {
    pub fn new() -> Self {
        Self
    }
}

impl ExtractionEngine for PdfMetadataEngine {
    fn extract(&self, content: &[u8], filename: &str) -> Result<ExtractionResult, ExtractionError> {
        let _span = tracing::info_span!(
            "engine.pdf",
            filename = %redact_filename(filename),
            size = content.len()
        )
        .entered();

        if !looks_like_pdf(content) {
            let extension = filename
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            return Err(ExtractionError::UnsupportedFormat(if extension.is_empty() {
                "no PDF header found".to_string()
            } else {
                extension
            }));
        }

        let doc = Document::load_mem(content)
            .map_err(|e| ExtractionError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

        let meta = read_metadata(&doc);
        tracing::debug!(
            pages = meta.page_count,
            has_title = meta.title.is_some(),
            "PDF metadata read"
        );

        let xml_document = NlmWriter::render(&meta)?;
        let html_view = NlmWriter::render_html(&meta);

        Ok(ExtractionResult {
            xml_document,
            html_view,
            metadata: meta.to_field_map(),
        })
    }
}

fn looks_like_pdf(content: &[u8]) -> bool {
    let window = &content[..content.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

fn read_metadata(doc: &Document) -> DocumentMetadata {
    let pages = doc.get_pages();
    let mut paragraphs = Vec::new();
    let mut full_text = String::new();

    for (page_num, _) in pages.iter() {
        if let Ok(page_text) = doc.extract_text(&[*page_num]) {
            full_text.push_str(&page_text);
            full_text.push('\n');

            let collapsed = collapse_whitespace(&page_text);
            if !collapsed.is_empty() {
                paragraphs.push(collapsed);
            }
        }
    }

    let info = info_dictionary(doc);

    let title = info_field(info, b"Title").or_else(|| first_line(&full_text));
    let authors = info_field(info, b"Author")
        .map(|a| split_list(&a, &[';', ',']))
        .unwrap_or_default();
    let keywords = info_field(info, b"Keywords")
        .map(|k| split_list(&k, &[';', ',']))
        .unwrap_or_default();

    DocumentMetadata {
        title,
        authors,
        abstract_text: find_abstract(&full_text),
        keywords,
        subject: info_field(info, b"Subject"),
        page_count: pages.len(),
        paragraphs,
    }
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn info_field(info: Option<&Dictionary>, key: &[u8]) -> Option<String> {
    match info?.get(key).ok()? {
        Object::String(bytes, _) => {
            let decoded = decode_pdf_string(bytes);
            let trimmed = decoded.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

/// PDF text strings are UTF-16BE with a BOM, or a single-byte encoding.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        return char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn split_list(value: &str, separators: &[char]) -> Vec<String> {
    value
        .split(separators)
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Remainder of `line` when it opens with the word "Abstract".
///
/// "Abstraction", "Abstracts" and the like are not headings.
fn abstract_heading(line: &str) -> Option<&str> {
    let head = line.get(..8)?;
    if !head.eq_ignore_ascii_case("abstract") {
        return None;
    }
    let rest = &line[8..];
    match rest.chars().next() {
        Some(c) if c.is_alphanumeric() => None,
        _ => Some(rest),
    }
}

/// Text following an "Abstract" heading, up to the next blank line.
fn find_abstract(text: &str) -> Option<String> {
    let mut lines = text.lines();
    let first = loop {
        let line = lines.next()?.trim();
        if let Some(rest) = abstract_heading(line) {
            break rest.trim_start_matches([':', '.', '-', ' ']).to_string();
        }
    };

    let mut parts = vec![first];
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        parts.push(line.to_string());
    }

    let joined = collapse_whitespace(&parts.join(" "));
    (!joined.is_empty()).then_some(joined)
}
