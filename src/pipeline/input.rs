//! Input handling: the in-memory document and submission validation.
//!
//! Documents travel as `Bytes` so a batch worker, the blocking engine call
//! and the fallback retry all share one buffer without copying. Validation is
//! shallow on purpose: a payload with a `.pdf` name that turns out to be
//! corrupt is an unreadable document (a per-file failure inside a batch), not
//! a rejected submission.

use crate::config::ProcessingConfig;
use crate::error::ExtractError;
use bytes::Bytes;
use std::path::Path;
use tracing::debug;

/// One submitted document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub bytes: Bytes,
}

impl Document {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local file. The document's filename is the path's final
    /// component.
    pub async fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ExtractError::Validation(format!("cannot read '{}': {e}", path.display()))
        })?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        debug!("Read {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(filename, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Whether `filename` carries a `.pdf` extension (case-insensitive).
pub fn has_pdf_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Reject a document before any task is created.
pub fn validate_document(doc: &Document, config: &ProcessingConfig) -> Result<(), ExtractError> {
    if doc.filename.trim().is_empty() {
        return Err(ExtractError::Validation("missing filename".into()));
    }
    if !has_pdf_extension(&doc.filename) {
        return Err(ExtractError::Validation(format!(
            "'{}' is not a PDF file",
            doc.filename
        )));
    }
    if doc.is_empty() {
        return Err(ExtractError::Validation(format!(
            "'{}' is empty",
            doc.filename
        )));
    }
    if doc.len() > config.max_file_size {
        return Err(ExtractError::Validation(format!(
            "'{}' is {} bytes; the limit is {} bytes",
            doc.filename,
            doc.len(),
            config.max_file_size
        )));
    }
    Ok(())
}

/// Validate a batch as a whole and every document in it.
pub fn validate_batch(docs: &[Document], config: &ProcessingConfig) -> Result<(), ExtractError> {
    if docs.is_empty() {
        return Err(ExtractError::Validation("no files submitted".into()));
    }
    if docs.len() > config.max_batch_files {
        return Err(ExtractError::Validation(format!(
            "{} files submitted; the limit is {}",
            docs.len(),
            config.max_batch_files
        )));
    }
    docs.iter().try_for_each(|d| validate_document(d, config))
}
