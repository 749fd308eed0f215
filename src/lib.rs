//! # edgequake-pdf2table
//!
//! Extract text from PDF documents into CSV, JSON or Parquet records through
//! an asynchronous task engine.
//!
//! ## Why this crate?
//!
//! Turning a pile of PDFs into rows is easy until one page has a broken
//! content stream, one file in fifty is truncated, or a 2 000-page report
//! needs a progress bar. This crate runs two interchangeable engines (pdfium
//! first, pure-Rust lopdf as per-page fallback), isolates failures per page
//! and per file, bounds memory by processing pages in chunks, and exposes the
//! whole thing as a submit / poll / download task model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! submit(bytes, options)
//!  │
//!  ├─ 1. Validate  .pdf name, non-empty, size / batch limits   (no task on error)
//!  ├─ 2. Queue     TaskRegistry: queued → processing
//!  ├─ 3. Batch     ≤ W documents in flight, per-file failure boundary
//!  ├─ 4. Chunk     pages in chunks of N on the blocking pool; progress per chunk
//!  ├─ 5. Extract   pdfium → lopdf fallback per page
//!  ├─ 6. Clean     whitespace / control-character normalisation
//!  ├─ 7. Format    CSV | JSON | Parquet
//!  └─ 8. Publish   artifact stored; task → completed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf2table::{ExtractionOptions, ExtractionService, OutputFormat, ProcessingConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = ExtractionService::new(ProcessingConfig::default());
//!     let options = ExtractionOptions {
//!         output_format: OutputFormat::Parquet,
//!         ..Default::default()
//!     };
//!     let id = service.submit("report.pdf", std::fs::read("report.pdf")?, options)?;
//!     service.wait(id, Duration::from_millis(200)).await?;
//!     let artifact = service.result(id)?;
//!     artifact.write_to(std::path::Path::new(&artifact.filename))?;
//!     Ok(())
//! }
//! ```
//!
//! For one-shot use without the task registry see [`convert()`] and
//! [`extract_stream`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2table` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf2table = { version = "0.1", default-features = false }
//! ```
//!
//! ## Engines
//!
//! | Method | Engine | Needs |
//! |--------|--------|-------|
//! | `auto` (default) | pdfium, lopdf per failed page | libpdfium optional |
//! | `pdfium` / `pymupdf` | pdfium only | libpdfium (`PDFIUM_LIB_PATH` or system) |
//! | `lopdf` / `pypdf` | lopdf only | nothing |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod service;
pub mod stream;
pub mod task;

#[cfg(test)]
mod test_support;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionMethod, ExtractionOptions, OutputFormat, ProcessingConfig, ProcessingConfigBuilder,
};
pub use convert::{convert, convert_sync, convert_to_file, extract_document, extract_from_bytes, inspect};
pub use error::{EngineError, ExtractError, PageWarning};
pub use format::OutputFormatter;
pub use output::{
    BatchEntry, BatchResult, DocumentMetadata, ExtractionResult, FileOutcome, OutputArtifact,
    PageRecord,
};
pub use pipeline::engine::{Engine, EngineTag, PageExtractor, PageOutcomes, PageText};
pub use pipeline::input::Document;
pub use pipeline::postprocess::CleanOptions;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::{ExtractionService, StatusView};
pub use stream::{extract_stream, PageStream};
pub use task::{ArtifactRef, RegistryStats, Task, TaskId, TaskRegistry, TaskStatus};
