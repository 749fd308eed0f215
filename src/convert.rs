//! Eager (whole-document) entry points.
//!
//! ## Why eager vs. the task service?
//!
//! [`crate::service::ExtractionService`] is the asynchronous job model:
//! submit, poll, download. The functions here skip the registry entirely and
//! simply await the pipeline, which is what scripts and tests usually want.
//! Use [`crate::stream::extract_stream`] to receive pages as chunks finish.

use crate::config::{ExtractionMethod, ExtractionOptions, ProcessingConfig};
use crate::error::ExtractError;
use crate::format::OutputFormatter;
use crate::output::{artifact_filename, BatchResult, DocumentMetadata, ExtractionResult, OutputArtifact};
use crate::pipeline::chunked::ChunkedDocumentProcessor;
use crate::pipeline::input::{validate_document, Document};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Extract every page of a PDF file.
///
/// # Returns
/// `Ok(ExtractionResult)` as long as at least one page produced a record;
/// degraded pages carry a [`crate::error::PageWarning`].
///
/// # Errors
/// - [`ExtractError::Validation`]: unreadable path, not a `.pdf`, too large
/// - [`ExtractError::UnreadableDocument`]: no allowed engine can open it
/// - [`ExtractError::AllPagesFailed`]: every page failed
pub async fn extract_document(
    path: impl AsRef<Path>,
    config: &ProcessingConfig,
    options: &ExtractionOptions,
) -> Result<ExtractionResult, ExtractError> {
    let doc = Document::from_path(path.as_ref()).await?;
    extract_from_bytes(doc.filename, doc.bytes, config, options).await
}

/// Extract every page of an in-memory PDF.
pub async fn extract_from_bytes(
    filename: impl Into<String>,
    bytes: impl Into<Bytes>,
    config: &ProcessingConfig,
    options: &ExtractionOptions,
) -> Result<ExtractionResult, ExtractError> {
    let start = Instant::now();
    let doc = Document::new(filename, bytes);
    validate_document(&doc, config)?;

    let processor = ChunkedDocumentProcessor::from_config(config);
    let progress: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));

    let result = processor
        .process(&doc, options, progress.as_ref())
        .await?
        .into_checked()?;

    info!(
        "{}: {}/{} pages in {}ms",
        result.filename,
        result.total_pages() - result.failed_pages(),
        result.total_pages(),
        start.elapsed().as_millis()
    );
    Ok(result)
}

/// Extract a PDF file and serialise it in `options.output_format`.
pub async fn convert(
    path: impl AsRef<Path>,
    config: &ProcessingConfig,
    options: &ExtractionOptions,
) -> Result<OutputArtifact, ExtractError> {
    let result = extract_document(path, config, options).await?;
    let name = artifact_filename(&result.filename, options.output_format);
    let formatter = OutputFormatter::new(options.output_format, options.wants_metadata());
    let batch = BatchResult::single(result);

    tokio::task::spawn_blocking(move || formatter.artifact(&batch, name))
        .await
        .map_err(|e| ExtractError::Internal(format!("Formatter task panicked: {e}")))?
}

/// Convert a PDF and write the artifact to `output_path`.
///
/// Uses an atomic write (temp file + rename) so no partial file is ever
/// visible at `output_path`.
pub async fn convert_to_file(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ProcessingConfig,
    options: &ExtractionOptions,
) -> Result<OutputArtifact, ExtractError> {
    let artifact = convert(path, config, options).await?;
    let output_path = output_path.as_ref().to_path_buf();

    // Cloning only bumps the `Bytes` refcount.
    let writer = artifact.clone();
    tokio::task::spawn_blocking(move || writer.write_to(&output_path))
        .await
        .map_err(|e| ExtractError::Internal(format!("Writer task panicked: {e}")))??;

    Ok(artifact)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally; do not call it from inside
/// one.
pub fn convert_sync(
    path: impl AsRef<Path>,
    config: &ProcessingConfig,
    options: &ExtractionOptions,
) -> Result<OutputArtifact, ExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExtractError::Internal(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(path, config, options))
}

/// Read document metadata without extracting any page text.
pub async fn inspect(
    path: impl AsRef<Path>,
    config: &ProcessingConfig,
) -> Result<DocumentMetadata, ExtractError> {
    let doc = Document::from_path(path.as_ref()).await?;
    validate_document(&doc, config)?;

    let processor = ChunkedDocumentProcessor::from_config(config);
    let plan = processor.open(&doc, ExtractionMethod::Auto).await?;
    processor.metadata(&doc, &plan).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::pipeline::lopdf::LopdfExtractor;
    use crate::test_support::build_pdf;

    fn config() -> ProcessingConfig {
        let engine = Arc::new(LopdfExtractor::default());
        ProcessingConfig::builder()
            .primary(engine.clone())
            .secondary(engine)
            .build()
            .unwrap()
    }

    fn write_pdf(dir: &Path, name: &str, pages: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, build_pdf(pages, Some(&[("Title", "Quarterly")]))).unwrap();
        path
    }

    #[tokio::test]
    async fn test_extract_document_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "q3.pdf", &["Revenue", "Costs"]);

        let result = extract_document(&path, &config(), &ExtractionOptions::default())
            .await
            .unwrap();
        assert_eq!(result.filename, "q3.pdf");
        assert_eq!(result.pages.len(), 2);
        assert_eq!(result.pages[1].text, "Costs");
        assert_eq!(
            result.metadata.and_then(|m| m.title).as_deref(),
            Some("Quarterly")
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_validation_error() {
        let err = extract_document("/nonexistent/x.pdf", &config(), &ExtractionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Validation(_)));
    }

    #[tokio::test]
    async fn test_convert_to_file_writes_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "q3.pdf", &["a", "b", "c"]);
        let out = dir.path().join("out/q3.parquet");
        let options = ExtractionOptions {
            output_format: OutputFormat::Parquet,
            ..Default::default()
        };

        let artifact = convert_to_file(&path, &out, &config(), &options)
            .await
            .unwrap();
        assert_eq!(artifact.filename, "q3.parquet");
        let written = std::fs::read(&out).unwrap();
        assert_eq!(written.len(), artifact.size());
        assert_eq!(&written[..4], b"PAR1");
    }

    #[tokio::test]
    async fn test_inspect_reads_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "q3.pdf", &["x"]);
        let meta = inspect(&path, &config()).await.unwrap();
        assert_eq!(meta.title.as_deref(), Some("Quarterly"));
        assert_eq!(meta.author, None);
    }

    #[test]
    fn test_convert_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pdf(dir.path(), "s.pdf", &["sync"]);
        let artifact = convert_sync(&path, &config(), &ExtractionOptions::default()).unwrap();
        let csv = String::from_utf8(artifact.bytes.to_vec()).unwrap();
        assert!(csv.starts_with("filename,page,text,title,author,creation_date,producer"));
        assert!(csv.contains("s.pdf,1,sync,Quarterly,,,"));
    }
}
