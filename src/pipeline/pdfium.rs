//! Primary engine: page text via pdfium.
//!
//! ## Binding
//!
//! `pdfium-render` loads libpdfium at runtime. The library is resolved from,
//! in order: the configured path, `PDFIUM_LIB_PATH`, then the system library
//! search path. A missing library surfaces as [`EngineError::Unavailable`],
//! which under `auto` simply routes every page to the secondary engine.
//!
//! ## Serialised access
//!
//! pdfium keeps process-global state; initialising and tearing it down from
//! several threads at once is unsound. Every call takes [`PDFIUM_LOCK`] for
//! the lifetime of its `Pdfium` instance, so concurrent batch workers queue
//! here while the lopdf fallback stays fully parallel.

use super::engine::{Engine, PageExtractor, PageOutcomes, PageText};
use crate::error::EngineError;
use crate::output::DocumentMetadata;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

static PDFIUM_LOCK: Mutex<()> = Mutex::new(());

/// Text extractor backed by libpdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_path: Option<PathBuf>,
    password: Option<String>,
}

impl PdfiumExtractor {
    pub fn new(library_path: Option<PathBuf>, password: Option<String>) -> Self {
        Self {
            library_path,
            password,
        }
    }

    fn bind(&self) -> Result<Pdfium, EngineError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => Pdfium::bind_to_library(library_file(&path)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| EngineError::Unavailable {
            engine: Engine::Pdfium,
            detail: e.to_string(),
        })?;

        Ok(Pdfium::new(bindings))
    }

    /// Run `f` against an opened document while holding the global lock.
    fn with_document<T>(
        &self,
        data: &[u8],
        f: impl FnOnce(&PdfDocument<'_>) -> T,
    ) -> Result<T, EngineError> {
        let _guard = PDFIUM_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(data, self.password.as_deref())
            .map_err(open_error)?;
        Ok(f(&document))
    }
}

/// Accept either the library file itself or the directory holding it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

fn open_error(e: PdfiumError) -> EngineError {
    let detail = format!("{e:?}");
    if detail.contains("Password") || detail.contains("password") {
        EngineError::Encrypted {
            engine: Engine::Pdfium,
        }
    } else {
        EngineError::Open {
            engine: Engine::Pdfium,
            detail,
        }
    }
}

impl PageExtractor for PdfiumExtractor {
    fn engine(&self) -> Engine {
        Engine::Pdfium
    }

    fn page_count(&self, data: &[u8]) -> Result<usize, EngineError> {
        self.with_document(data, |doc| doc.pages().len() as usize)
    }

    fn extract_pages(&self, data: &[u8], indices: &[usize]) -> Result<PageOutcomes, EngineError> {
        self.with_document(data, |doc| {
            let pages = doc.pages();
            let total = pages.len() as usize;

            indices
                .iter()
                .map(|&idx| {
                    let page_err = |detail: String| EngineError::Page {
                        engine: Engine::Pdfium,
                        page: idx + 1,
                        detail,
                    };
                    if idx >= total {
                        warn!("Page {} out of range (total={})", idx + 1, total);
                        return Err(page_err(format!("out of range (total={total})")));
                    }

                    let page = pages.get(idx as u16).map_err(|e| page_err(format!("{e:?}")))?;
                    let text = page
                        .text()
                        .map_err(|e| page_err(format!("{e:?}")))?
                        .all();
                    let has_content = !page.objects().is_empty();
                    debug!("pdfium page {}: {} chars", idx + 1, text.len());

                    Ok(PageText { text, has_content })
                })
                .collect()
        })
    }

    fn metadata(&self, data: &[u8]) -> Result<DocumentMetadata, EngineError> {
        self.with_document(data, |doc| {
            let metadata = doc.metadata();
            let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
                metadata.get(tag).and_then(|t| {
                    let v = t.value().trim().to_string();
                    if v.is_empty() {
                        None
                    } else {
                        Some(v)
                    }
                })
            };

            DocumentMetadata {
                title: get_meta(PdfDocumentMetadataTagType::Title),
                author: get_meta(PdfDocumentMetadataTagType::Author),
                creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate)
                    .map(|d| super::engine::normalize_pdf_date(&d)),
                producer: get_meta(PdfDocumentMetadataTagType::Producer),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_unavailable() {
        let extractor = PdfiumExtractor::new(
            Some(PathBuf::from("/nonexistent/libpdfium-missing.so")),
            None,
        );
        let err = extractor.page_count(b"%PDF-1.4").unwrap_err();
        assert!(
            matches!(err, EngineError::Unavailable { engine: Engine::Pdfium, .. }),
            "got: {err:?}"
        );
        assert!(err.is_document_level());
    }

    #[test]
    fn password_errors_map_to_encrypted() {
        let err = open_error(PdfiumError::PdfiumLibraryInternalError(
            PdfiumInternalError::PasswordError,
        ));
        assert_eq!(
            err,
            EngineError::Encrypted {
                engine: Engine::Pdfium
            }
        );
    }
}
