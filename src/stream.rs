//! Streaming extraction: emit pages as their chunk completes.
//!
//! ## Why stream?
//!
//! A 2 000-page report takes a while even without OCR. [`extract_stream`]
//! yields each [`PageRecord`] as soon as its chunk is extracted and cleaned,
//! so callers can write rows incrementally instead of holding the whole
//! document. Pages always arrive in ascending order.
//!
//! The producer runs on its own task and feeds a channel bounded at one
//! chunk: if the consumer stops reading, extraction pauses at the next chunk;
//! if the stream is dropped, the producer stops at the next send.

use crate::config::{ExtractionOptions, ProcessingConfig};
use crate::error::ExtractError;
use crate::output::PageRecord;
use crate::pipeline::chunked::ChunkedDocumentProcessor;
use crate::pipeline::input::{validate_document, Document};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, info};

/// A boxed stream of page records.
pub type PageStream = Pin<Box<dyn Stream<Item = Result<PageRecord, ExtractError>> + Send>>;

/// Extract a document, streaming pages in page order.
///
/// # Returns
/// - `Ok(PageStream)` once the document has been opened. Each item is a
///   page (possibly degraded, see [`PageRecord::warning`]); an `Err` item
///   ends the stream.
/// - `Err(ExtractError)` when the submission is invalid or no allowed engine
///   can open the document.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdf2table::{extract_stream, Document, ExtractionOptions, ProcessingConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let doc = Document::new("report.pdf", std::fs::read("report.pdf")?);
/// let config = ProcessingConfig::default();
/// let mut pages = extract_stream(doc, &config, &ExtractionOptions::default()).await?;
/// while let Some(page) = pages.next().await {
///     let page = page?;
///     println!("{}: {} chars", page.page, page.text.len());
/// }
/// # Ok(())
/// # }
/// ```
pub async fn extract_stream(
    doc: Document,
    config: &ProcessingConfig,
    options: &ExtractionOptions,
) -> Result<PageStream, ExtractError> {
    validate_document(&doc, config)?;
    let processor = ChunkedDocumentProcessor::from_config(config);
    let plan = processor.open(&doc, options.extraction_method).await?;
    info!(
        "Streaming {} ({} pages, {} per chunk)",
        doc.filename,
        plan.total_pages,
        processor.chunk_size()
    );

    let (tx, rx) = mpsc::channel(processor.chunk_size());
    tokio::spawn(async move {
        for range in processor.chunks(plan.total_pages) {
            let chunk = match processor.extract_chunk(&doc, range, &plan).await {
                Ok(chunk) => chunk,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            for record in chunk {
                if tx.send(Ok(record)).await.is_err() {
                    debug!("{}: stream dropped, stopping", doc.filename);
                    return;
                }
            }
        }
    });

    Ok(Box::pin(ReceiverStream::new(rx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionMethod;
    use crate::pipeline::lopdf::LopdfExtractor;
    use crate::test_support::build_pdf;
    use futures::StreamExt;
    use std::sync::Arc;

    fn config() -> ProcessingConfig {
        let engine = Arc::new(LopdfExtractor::default());
        ProcessingConfig::builder()
            .primary(engine.clone())
            .secondary(engine)
            .chunk_size(2)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_pages_arrive_in_order() {
        let doc = Document::new("s.pdf", build_pdf(&["a", "b", "c", "d", "e"], None));
        let options = ExtractionOptions {
            extraction_method: ExtractionMethod::Lopdf,
            ..Default::default()
        };
        let pages: Vec<PageRecord> = extract_stream(doc, &config(), &options)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(pages.iter().map(|p| p.page).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(pages[4].text, "e");
    }

    #[tokio::test]
    async fn test_unreadable_fails_before_streaming() {
        let doc = Document::new("bad.pdf", &b"%PDF-broken"[..]);
        let err = extract_stream(doc, &config(), &ExtractionOptions::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ExtractError::UnreadableDocument { .. }));
    }

    #[tokio::test]
    async fn test_dropping_stream_early_is_fine() {
        let doc = Document::new("s.pdf", build_pdf(&["a", "b", "c", "d"], None));
        let mut stream = extract_stream(doc, &config(), &ExtractionOptions::default())
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.page, 1);
        drop(stream);
    }
}
