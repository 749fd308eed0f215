//! Drive the fallback strategy and the cleaner over one document in bounded
//! chunks.
//!
//! ## Why chunks?
//!
//! Each chunk is one blocking call that opens the document, extracts up to
//! `chunk_size` pages and drops everything again. That bounds how much decoded
//! page content is alive at once, gives the task registry a progress tick per
//! chunk, and gives cancellation a natural checkpoint. Pages inside a document
//! are always processed sequentially; parallelism lives one level up, in
//! [`super::batch`].

use super::fallback::{ExtractionPlan, FallbackStrategy};
use super::input::Document;
use super::postprocess::{clean_text, CleanOptions};
use crate::config::{ExtractionMethod, ExtractionOptions, ProcessingConfig};
use crate::error::ExtractError;
use crate::output::{DocumentMetadata, ExtractionResult, PageRecord};
use crate::progress::ExtractionProgressCallback;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Extracts one document chunk by chunk.
#[derive(Debug, Clone)]
pub struct ChunkedDocumentProcessor {
    strategy: Arc<FallbackStrategy>,
    chunk_size: usize,
    clean: CleanOptions,
}

impl ChunkedDocumentProcessor {
    pub fn new(strategy: Arc<FallbackStrategy>, chunk_size: usize, clean: CleanOptions) -> Self {
        Self {
            strategy,
            chunk_size: chunk_size.max(1),
            clean,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(
            Arc::new(FallbackStrategy::from_config(config)),
            config.chunk_size,
            config.clean,
        )
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Page ranges (0-indexed, half-open) covering `total_pages`.
    pub fn chunks(&self, total_pages: usize) -> impl Iterator<Item = Range<usize>> {
        let size = self.chunk_size;
        (0..total_pages)
            .step_by(size)
            .map(move |start| start..(start + size).min(total_pages))
    }

    /// Open the document and resolve its page count.
    pub async fn open(
        &self,
        doc: &Document,
        method: ExtractionMethod,
    ) -> Result<ExtractionPlan, ExtractError> {
        let strategy = Arc::clone(&self.strategy);
        let bytes = doc.bytes.clone();
        let filename = doc.filename.clone();

        tokio::task::spawn_blocking(move || strategy.open(&bytes, method, &filename))
            .await
            .map_err(|e| ExtractError::Internal(format!("Open task panicked: {e}")))?
    }

    /// Extract and clean one chunk of pages.
    pub async fn extract_chunk(
        &self,
        doc: &Document,
        pages: Range<usize>,
        plan: &ExtractionPlan,
    ) -> Result<Vec<PageRecord>, ExtractError> {
        let strategy = Arc::clone(&self.strategy);
        let bytes = doc.bytes.clone();
        let plan = plan.clone();
        let clean = self.clean;

        tokio::task::spawn_blocking(move || {
            strategy
                .extract_chunk(&bytes, pages, &plan)
                .into_iter()
                .map(|p| PageRecord {
                    page: p.page,
                    text: clean_text(&p.text, &clean),
                    engine: p.engine,
                    warning: p.warning,
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ExtractError::Internal(format!("Extraction task panicked: {e}")))
    }

    /// Read document metadata with the plan's engines.
    pub async fn metadata(
        &self,
        doc: &Document,
        plan: &ExtractionPlan,
    ) -> Result<DocumentMetadata, ExtractError> {
        let strategy = Arc::clone(&self.strategy);
        let bytes = doc.bytes.clone();
        let plan = plan.clone();

        tokio::task::spawn_blocking(move || strategy.metadata(&bytes, &plan))
            .await
            .map_err(|e| ExtractError::Internal(format!("Metadata task panicked: {e}")))?
            .map_err(|e| ExtractError::UnreadableDocument {
                filename: doc.filename.clone(),
                detail: e.to_string(),
            })
    }

    /// Process a whole document.
    ///
    /// Returns `Ok` even when every page failed (`success == false`); the
    /// caller decides whether that is fatal. `progress.should_stop()` is
    /// polled before every chunk and once before metadata.
    pub async fn process(
        &self,
        doc: &Document,
        options: &ExtractionOptions,
        progress: &dyn ExtractionProgressCallback,
    ) -> Result<ExtractionResult, ExtractError> {
        let plan = self.open(doc, options.extraction_method).await?;
        let total = plan.total_pages;
        info!(
            "{}: {} pages, {} per chunk, method={}",
            doc.filename, total, self.chunk_size, options.extraction_method
        );
        progress.on_document_start(&doc.filename, total);

        let mut pages: Vec<PageRecord> = Vec::with_capacity(total);
        let mut warnings: Vec<String> = Vec::new();

        for range in self.chunks(total) {
            if progress.should_stop() {
                info!("{}: stopped before page {}", doc.filename, range.start + 1);
                return Err(ExtractError::Cancelled);
            }

            let chunk = self.extract_chunk(doc, range, &plan).await?;
            for record in &chunk {
                if let Some(w) = &record.warning {
                    let msg = w.to_string();
                    progress.on_page_warning(&doc.filename, record.page, &msg);
                    warnings.push(msg);
                }
            }
            pages.extend(chunk);
            debug!("{}: {}/{} pages", doc.filename, pages.len(), total);
            progress.on_chunk_complete(&doc.filename, pages.len(), total);
        }

        if progress.should_stop() {
            return Err(ExtractError::Cancelled);
        }

        let metadata = if options.wants_metadata() {
            match self.metadata(doc, &plan).await {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!("{}: metadata unavailable: {}", doc.filename, e);
                    warnings.push(format!("Metadata unavailable: {e}"));
                    Some(DocumentMetadata::default())
                }
            }
        } else {
            None
        };

        let failed = pages.iter().filter(|p| p.is_failed()).count();
        let extracted = pages.len() - failed;
        progress.on_document_complete(&doc.filename, total, extracted);
        info!(
            "{}: extracted {}/{} pages ({} warnings)",
            doc.filename,
            extracted,
            total,
            warnings.len()
        );

        Ok(ExtractionResult {
            filename: doc.filename.clone(),
            pages,
            metadata,
            warnings,
            success: extracted > 0,
        })
    }
}
