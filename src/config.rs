//! Configuration types for PDF-to-records extraction.
//!
//! Two structs split the knobs by lifetime:
//!
//! * [`ProcessingConfig`]: engine-level settings fixed when the
//!   [`crate::service::ExtractionService`] is built: chunk size, worker
//!   count, size limits, engine bindings, retention. Built via
//!   [`ProcessingConfigBuilder`].
//! * [`ExtractionOptions`]: per-submission choices a client sends with each
//!   document: output format, extraction method, metadata flags. These are
//!   `serde`-friendly so a transport layer can deserialise them directly.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::ExtractError;
use crate::pipeline::engine::PageExtractor;
use crate::pipeline::postprocess::CleanOptions;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Engine-level configuration for the extraction service.
///
/// Built via [`ProcessingConfig::builder()`] or using
/// [`ProcessingConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdf2table::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .chunk_size(10)
///     .workers(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_size, 10);
/// ```
#[derive(Clone)]
pub struct ProcessingConfig {
    /// Pages per chunk. Default: 20.
    ///
    /// Pages inside a chunk are extracted by one blocking call against a
    /// single open document, so the chunk size bounds how much decoded page
    /// content is alive at once. Progress and cancellation are observed
    /// between chunks, so smaller chunks also make both more responsive.
    pub chunk_size: usize,

    /// Documents processed concurrently by a batch. Default: 2.
    ///
    /// Parallelism is across documents only; pages of one document are
    /// always processed sequentially by the worker that owns it.
    pub workers: usize,

    /// Largest accepted document in bytes. Default: 100 MiB.
    pub max_file_size: usize,

    /// Largest accepted batch. Default: 50 files.
    pub max_batch_files: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit path to libpdfium (file or directory). When `None` the
    /// `PDFIUM_LIB_PATH` environment variable is consulted, then the system
    /// library search path.
    pub pdfium_library_path: Option<PathBuf>,

    /// Text-cleaning rules applied to every page.
    pub clean: CleanOptions,

    /// Drop the task and its artifact after the first successful download.
    /// Default: false.
    pub discard_after_download: bool,

    /// Age after which [`crate::service::ExtractionService::purge_expired`]
    /// discards tasks and artifacts. Default: 3600 s.
    pub retention_secs: u64,

    /// Delay used by [`crate::service::ExtractionService::schedule_removal`].
    /// Default: 300 s.
    pub deletion_delay_secs: u64,

    /// Pre-constructed primary engine. Takes precedence over the built-in
    /// pdfium extractor.
    pub primary: Option<Arc<dyn PageExtractor>>,

    /// Pre-constructed secondary engine. Takes precedence over the built-in
    /// lopdf extractor.
    pub secondary: Option<Arc<dyn PageExtractor>>,

    /// Observer notified of per-document progress (in addition to the task
    /// registry).
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            workers: 2,
            max_file_size: 100 * 1024 * 1024,
            max_batch_files: 50,
            password: None,
            pdfium_library_path: None,
            clean: CleanOptions::default(),
            discard_after_download: false,
            retention_secs: 3600,
            deletion_delay_secs: 300,
            primary: None,
            secondary: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("chunk_size", &self.chunk_size)
            .field("workers", &self.workers)
            .field("max_file_size", &self.max_file_size)
            .field("max_batch_files", &self.max_batch_files)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("clean", &self.clean)
            .field("discard_after_download", &self.discard_after_download)
            .field("retention_secs", &self.retention_secs)
            .field("deletion_delay_secs", &self.deletion_delay_secs)
            .field("primary", &self.primary.as_ref().map(|e| e.engine()))
            .field("secondary", &self.secondary.as_ref().map(|e| e.engine()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages.clamp(1, 500);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn max_batch_files(mut self, n: usize) -> Self {
        self.config.max_batch_files = n;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn clean(mut self, options: CleanOptions) -> Self {
        self.config.clean = options;
        self
    }

    pub fn discard_after_download(mut self, v: bool) -> Self {
        self.config.discard_after_download = v;
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention_secs = secs;
        self
    }

    pub fn deletion_delay_secs(mut self, secs: u64) -> Self {
        self.config.deletion_delay_secs = secs;
        self
    }

    pub fn primary(mut self, engine: Arc<dyn PageExtractor>) -> Self {
        self.config.primary = Some(engine);
        self
    }

    pub fn secondary(mut self, engine: Arc<dyn PageExtractor>) -> Self {
        self.config.secondary = Some(engine);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, ExtractError> {
        let c = &self.config;
        if c.chunk_size == 0 {
            return Err(ExtractError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if c.workers == 0 {
            return Err(ExtractError::InvalidConfig("Workers must be ≥ 1".into()));
        }
        if c.max_file_size == 0 {
            return Err(ExtractError::InvalidConfig(
                "Maximum file size must be > 0".into(),
            ));
        }
        if c.max_batch_files == 0 {
            return Err(ExtractError::InvalidConfig(
                "Maximum batch size must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Per-submission options ───────────────────────────────────────────────

/// Options sent with each submission.
///
/// Every field has a default, so `{}` deserialises to
/// `csv / auto / include_metadata / !text_only`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionOptions {
    pub output_format: OutputFormat,
    pub extraction_method: ExtractionMethod,
    pub include_metadata: bool,
    pub text_only: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            extraction_method: ExtractionMethod::default(),
            include_metadata: true,
            text_only: false,
        }
    }
}

impl ExtractionOptions {
    /// Whether metadata is read and emitted. `text_only` wins over
    /// `include_metadata`.
    pub fn wants_metadata(&self) -> bool {
        self.include_metadata && !self.text_only
    }
}

/// Serialised artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Row-oriented: one row per page. (default)
    #[default]
    Csv,
    /// Hierarchical: one record per file with nested pages.
    Json,
    /// Columnar: typed columns, null-filled metadata.
    Parquet,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Parquet => "parquet",
        }
    }

    /// Media type served with the artifact.
    pub fn media_type(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "text/csv",
            OutputFormat::Json => "application/json",
            OutputFormat::Parquet => "application/octet-stream",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "parquet" => Ok(OutputFormat::Parquet),
            other => Err(ExtractError::Validation(format!(
                "unknown output format '{other}' (expected csv, json or parquet)"
            ))),
        }
    }
}

/// Which engine(s) may be used for a submission.
///
/// The wire names `pymupdf` / `pypdf` are accepted for compatibility with
/// existing clients and select the primary / secondary engine respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    /// Primary engine with per-page fallback to the secondary. (default)
    #[default]
    Auto,
    /// Primary engine only.
    #[serde(alias = "pymupdf", alias = "primary")]
    Pdfium,
    /// Secondary engine only.
    #[serde(alias = "pypdf", alias = "secondary")]
    Lopdf,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExtractionMethod::Auto => "auto",
            ExtractionMethod::Pdfium => "pdfium",
            ExtractionMethod::Lopdf => "lopdf",
        })
    }
}

impl FromStr for ExtractionMethod {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ExtractionMethod::Auto),
            "pdfium" | "pymupdf" | "primary" => Ok(ExtractionMethod::Pdfium),
            "lopdf" | "pypdf" | "secondary" => Ok(ExtractionMethod::Lopdf),
            other => Err(ExtractError::Validation(format!(
                "unknown extraction method '{other}' (expected auto, pymupdf or pypdf)"
            ))),
        }
    }
}
