//! Result types produced by the extraction pipeline.
//!
//! Everything here is plain data: built locally by one worker, then published
//! once (to the task registry, the formatter, or the caller).

use crate::config::OutputFormat;
use crate::error::{ExtractError, PageWarning};
use crate::pipeline::engine::EngineTag;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Document-level metadata.
///
/// Absent fields stay `None`; nothing is inferred from the page text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    /// RFC 3339 when the PDF date could be parsed, verbatim otherwise.
    pub creation_date: Option<String>,
    pub producer: Option<String>,
}

/// One extracted page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// 1-indexed page number, unique within its [`ExtractionResult`].
    pub page: usize,
    /// Cleaned text; empty for blank or failed pages.
    pub text: String,
    /// Engine that produced `text`, or [`EngineTag::Failed`].
    pub engine: EngineTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<PageWarning>,
}

impl PageRecord {
    pub fn is_failed(&self) -> bool {
        self.engine == EngineTag::Failed
    }
}

/// The per-document outcome of the chunked processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub filename: String,
    /// Ascending by page number.
    pub pages: Vec<PageRecord>,
    /// `None` when metadata was not requested (or `text_only` is set).
    pub metadata: Option<DocumentMetadata>,
    pub warnings: Vec<String>,
    /// `false` when every page failed.
    pub success: bool,
}

impl ExtractionResult {
    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    pub fn failed_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.is_failed()).count()
    }

    /// Turn an all-pages-failed result into [`ExtractError::AllPagesFailed`].
    pub fn into_checked(self) -> Result<Self, ExtractError> {
        if self.success {
            return Ok(self);
        }
        let first_error = self
            .pages
            .iter()
            .find_map(|p| p.warning.as_ref())
            .map(|w| w.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        Err(ExtractError::AllPagesFailed {
            filename: self.filename,
            total: self.pages.len(),
            first_error,
        })
    }
}

/// Outcome for one file of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Extracted(ExtractionResult),
    /// `reason` is the short user-facing message; `detail` keeps the full
    /// diagnostic for logs and is never serialised.
    Failed {
        reason: String,
        #[serde(skip)]
        detail: String,
    },
}

impl FileOutcome {
    pub fn failed(err: &ExtractError) -> Self {
        FileOutcome::Failed {
            reason: err.user_message(),
            detail: err.to_string(),
        }
    }
}

/// One entry of a [`BatchResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub filename: String,
    pub outcome: FileOutcome,
}

/// Per-file outcomes in submission order.
///
/// Entries are written exactly once, so `len()` always equals the number of
/// submitted files, even when filenames repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
}

impl BatchResult {
    /// Wrap a single document's result.
    pub fn single(result: ExtractionResult) -> Self {
        Self {
            entries: vec![BatchEntry {
                filename: result.filename.clone(),
                outcome: FileOutcome::Extracted(result),
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry with the given filename.
    pub fn get(&self, filename: &str) -> Option<&FileOutcome> {
        self.entries
            .iter()
            .find(|e| e.filename == filename)
            .map(|e| &e.outcome)
    }

    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, FileOutcome::Extracted(_)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

/// The serialised output handed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArtifact {
    pub format: OutputFormat,
    /// Suggested download name, e.g. `report.csv`.
    pub filename: String,
    pub bytes: Bytes,
}

impl OutputArtifact {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }

    /// Write the artifact atomically (temp file in the target directory,
    /// then rename) so readers never observe a partial file.
    pub fn write_to(&self, path: &Path) -> Result<(), ExtractError> {
        use std::io::Write;

        let write_err = |source: std::io::Error| ExtractError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&self.bytes).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

/// Suggested artifact name: `<stem>.<ext>`.
pub(crate) fn artifact_filename(source: &str, format: OutputFormat) -> String {
    let stem = Path::new(source)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output");
    format!("{stem}.{}", format.extension())
}
