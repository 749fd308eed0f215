//! The extraction-engine capability shared by every backend.
//!
//! Two engines exist, one per [`Engine`] variant:
//!
//! | Engine | Role | Backend |
//! |--------|------|---------|
//! | [`Engine::Pdfium`] | primary | pdfium via `pdfium-render` ([`super::pdfium`]) |
//! | [`Engine::Lopdf`]  | secondary | pure-Rust `lopdf` ([`super::lopdf`]) |
//!
//! Both implement [`PageExtractor`]. The trait is object-safe so tests and
//! embedders can inject their own backends through
//! [`crate::config::ProcessingConfigBuilder::primary`] /
//! [`crate::config::ProcessingConfigBuilder::secondary`].
//!
//! Every method is blocking; callers run them inside `spawn_blocking`.

use crate::config::ProcessingConfig;
use crate::error::EngineError;
use crate::output::DocumentMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The two interchangeable extraction backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Pdfium,
    Lopdf,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Engine::Pdfium => "pdfium",
            Engine::Lopdf => "lopdf",
        })
    }
}

/// Which engine produced a page's text, as recorded on a
/// [`crate::output::PageRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineTag {
    Pdfium,
    Lopdf,
    /// No engine produced usable text.
    Failed,
}

impl From<Engine> for EngineTag {
    fn from(engine: Engine) -> Self {
        match engine {
            Engine::Pdfium => EngineTag::Pdfium,
            Engine::Lopdf => EngineTag::Lopdf,
        }
    }
}

impl fmt::Display for EngineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EngineTag::Pdfium => "pdfium",
            EngineTag::Lopdf => "lopdf",
            EngineTag::Failed => "failed",
        })
    }
}

/// Raw text of one page as an engine saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub text: String,
    /// Whether the page carries any drawable content. An empty `text` on a
    /// page with content is suspicious and triggers fallback under `auto`.
    pub has_content: bool,
}

impl PageText {
    /// `true` when the text is empty although the page has content.
    pub fn is_suspect(&self) -> bool {
        self.has_content && self.text.trim().is_empty()
    }
}

/// Per-page outcome list returned by [`PageExtractor::extract_pages`], in the
/// order of the requested indices.
pub type PageOutcomes = Vec<Result<PageText, EngineError>>;

/// One extraction backend.
///
/// Implementations open the document from raw bytes on each call. The outer
/// `Err` of [`PageExtractor::extract_pages`] means the container itself could
/// not be opened; per-page problems go in the inner results.
pub trait PageExtractor: Send + Sync {
    /// Which engine this is; recorded on every page it produces.
    fn engine(&self) -> Engine;

    /// Open the document and count its pages.
    fn page_count(&self, data: &[u8]) -> Result<usize, EngineError>;

    /// Extract the given 0-indexed pages from one open document.
    fn extract_pages(&self, data: &[u8], pages: &[usize]) -> Result<PageOutcomes, EngineError>;

    /// Read the document-information dictionary.
    fn metadata(&self, data: &[u8]) -> Result<DocumentMetadata, EngineError>;
}

/// Resolve the primary and secondary engines from config, falling back to
/// the built-in pdfium / lopdf extractors.
pub fn resolve_engines(
    config: &ProcessingConfig,
) -> (Arc<dyn PageExtractor>, Arc<dyn PageExtractor>) {
    let primary = config.primary.clone().unwrap_or_else(|| {
        Arc::new(super::pdfium::PdfiumExtractor::new(
            config.pdfium_library_path.clone(),
            config.password.clone(),
        ))
    });
    let secondary = config.secondary.clone().unwrap_or_else(|| {
        Arc::new(super::lopdf::LopdfExtractor::new(config.password.clone()))
    });
    (primary, secondary)
}

// ── PDF date parsing ─────────────────────────────────────────────────────

/// Normalise a PDF date string (`D:YYYYMMDDHHmmSSOHH'mm'`) to RFC 3339.
///
/// Any suffix may be omitted per the PDF spec; missing parts default to the
/// start of the period and UTC. Returns the input unchanged when it cannot be
/// parsed, so no information is lost.
pub fn normalize_pdf_date(raw: &str) -> String {
    parse_pdf_date(raw)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| raw.trim().to_string())
}

fn parse_pdf_date(raw: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    use chrono::{FixedOffset, NaiveDate, TimeZone};

    let s = raw.trim();
    let s = s.strip_prefix("D:").unwrap_or(s);
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return None;
    }
    let field = |from: usize, len: usize, default: u32| -> Option<u32> {
        match digits.get(from..from + len) {
            Some(part) => part.parse().ok(),
            None => Some(default),
        }
    };
    let year: i32 = digits.get(0..4)?.parse().ok()?;
    let month = field(4, 2, 1)?;
    let day = field(6, 2, 1)?;
    let hour = field(8, 2, 0)?;
    let minute = field(10, 2, 0)?;
    let second = field(12, 2, 0)?;

    let rest = &s[digits.len()..];
    let offset_secs = match rest.chars().next() {
        Some(sign @ ('+' | '-')) => {
            let tz: String = rest[1..].chars().filter(|c| c.is_ascii_digit()).collect();
            let hh: i32 = tz.get(0..2).and_then(|v| v.parse().ok()).unwrap_or(0);
            let mm: i32 = tz.get(2..4).and_then(|v| v.parse().ok()).unwrap_or(0);
            let secs = hh * 3600 + mm * 60;
            if sign == '-' {
                -secs
            } else {
                secs
            }
        }
        _ => 0,
    };

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    FixedOffset::east_opt(offset_secs)?
        .from_local_datetime(&naive)
        .single()
}
