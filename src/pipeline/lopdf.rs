//! Secondary engine: page text via the pure-Rust `lopdf` parser.
//!
//! Always available (no native library), so it doubles as the only engine
//! when libpdfium cannot be bound.

use super::engine::{normalize_pdf_date, Engine, PageExtractor, PageOutcomes, PageText};
use crate::error::EngineError;
use crate::output::DocumentMetadata;
use ::lopdf::{Dictionary, Document, Object};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct LopdfExtractor {
    password: Option<String>,
}

impl LopdfExtractor {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }

    fn load(&self, data: &[u8]) -> Result<Document, EngineError> {
        let mut doc = Document::load_mem(data).map_err(|e| EngineError::Open {
            engine: Engine::Lopdf,
            detail: e.to_string(),
        })?;

        if doc.is_encrypted() {
            let password = self.password.as_deref().unwrap_or("");
            doc.decrypt(password).map_err(|e| {
                debug!("lopdf decrypt failed: {}", e);
                EngineError::Encrypted {
                    engine: Engine::Lopdf,
                }
            })?;
        }
        Ok(doc)
    }
}

impl PageExtractor for LopdfExtractor {
    fn engine(&self) -> Engine {
        Engine::Lopdf
    }

    fn page_count(&self, data: &[u8]) -> Result<usize, EngineError> {
        Ok(self.load(data)?.get_pages().len())
    }

    fn extract_pages(&self, data: &[u8], indices: &[usize]) -> Result<PageOutcomes, EngineError> {
        let doc = self.load(data)?;
        let pages = doc.get_pages();

        Ok(indices
            .iter()
            .map(|&idx| {
                let number = idx as u32 + 1;
                let page_err = |detail: String| EngineError::Page {
                    engine: Engine::Lopdf,
                    page: idx + 1,
                    detail,
                };
                let page_id = *pages
                    .get(&number)
                    .ok_or_else(|| page_err(format!("out of range (total={})", pages.len())))?;

                let has_content = doc
                    .get_page_content(page_id)
                    .map(|c| c.iter().any(|b| !b.is_ascii_whitespace()))
                    .unwrap_or(false);
                let text = doc
                    .extract_text(&[number])
                    .map_err(|e| page_err(e.to_string()))?;
                debug!("lopdf page {}: {} chars", number, text.len());

                Ok(PageText { text, has_content })
            })
            .collect())
    }

    fn metadata(&self, data: &[u8]) -> Result<DocumentMetadata, EngineError> {
        let doc = self.load(data)?;
        let Some(info) = info_dictionary(&doc) else {
            debug!("No Info dictionary");
            return Ok(DocumentMetadata::default());
        };

        let get_string = |key: &[u8]| -> Option<String> {
            match info.get(key).ok()? {
                Object::String(bytes, _) => {
                    let s = decode_text_string(bytes);
                    let s = s.trim();
                    (!s.is_empty()).then(|| s.to_string())
                }
                _ => None,
            }
        };

        Ok(DocumentMetadata {
            title: get_string(b"Title"),
            author: get_string(b"Author"),
            creation_date: get_string(b"CreationDate").map(|d| normalize_pdf_date(&d)),
            producer: get_string(b"Producer"),
        })
    }
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, else UTF-8, else Latin-1.
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}
