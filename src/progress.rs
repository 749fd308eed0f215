//! Progress-callback trait for per-document extraction events.
//!
//! The [`crate::pipeline::chunked::ChunkedDocumentProcessor`] reports to an
//! [`ExtractionProgressCallback`] after every chunk. The task registry is one
//! such observer (it turns chunk events into `advance` calls); callers can
//! inject their own via
//! [`crate::config::ProcessingConfigBuilder::progress_callback`] to drive a
//! progress bar or a metrics sink.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a broadcast channel, a WebSocket, or a terminal progress
//! bar without the library knowing how the host application communicates.
//! The trait is `Send + Sync` because a batch runs several documents at once.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2table::{ExtractionProgressCallback, ProcessingConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ChunkCounter {
//!     chunks: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for ChunkCounter {
//!     fn on_chunk_complete(&self, filename: &str, processed: usize, total: usize) {
//!         self.chunks.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{filename}: {processed}/{total}");
//!     }
//! }
//!
//! let config = ProcessingConfig::builder()
//!     .progress_callback(Arc::new(ChunkCounter { chunks: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the chunked processor as it works through a document.
///
/// All methods have default no-op implementations so implementors only
/// override what they care about.
///
/// # Thread safety
///
/// In a batch, several documents are processed concurrently and the same
/// callback may be invoked from different blocking-pool threads. Protect
/// shared mutable state with `Mutex` or atomics.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once the page count is known, before the first chunk.
    fn on_document_start(&self, filename: &str, total_pages: usize) {
        let _ = (filename, total_pages);
    }

    /// Called after every chunk with the running page count.
    fn on_chunk_complete(&self, filename: &str, processed_pages: usize, total_pages: usize) {
        let _ = (filename, processed_pages, total_pages);
    }

    /// Called for every page that needed the fallback engine or failed.
    fn on_page_warning(&self, filename: &str, page: usize, warning: &str) {
        let _ = (filename, page, warning);
    }

    /// Called once after the last chunk.
    ///
    /// `extracted_pages` counts pages for which some engine produced a record
    /// (possibly empty for blank pages) rather than a failure.
    fn on_document_complete(&self, filename: &str, total_pages: usize, extracted_pages: usize) {
        let _ = (filename, total_pages, extracted_pages);
    }

    /// Called by the batch coordinator each time a file finishes, whatever
    /// its outcome.
    fn on_batch_progress(&self, completed_files: usize, total_files: usize) {
        let _ = (completed_files, total_files);
    }

    /// Polled at every chunk boundary. Returning `true` stops the document
    /// with [`crate::error::ExtractError::Cancelled`].
    fn should_stop(&self) -> bool {
        false
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ProcessingConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

/// Fans one event out to two observers; stops when either asks to.
pub(crate) struct Tee {
    pub first: ProgressCallback,
    pub second: Option<ProgressCallback>,
}

impl ExtractionProgressCallback for Tee {
    fn on_document_start(&self, filename: &str, total_pages: usize) {
        self.first.on_document_start(filename, total_pages);
        if let Some(cb) = &self.second {
            cb.on_document_start(filename, total_pages);
        }
    }

    fn on_chunk_complete(&self, filename: &str, processed_pages: usize, total_pages: usize) {
        self.first
            .on_chunk_complete(filename, processed_pages, total_pages);
        if let Some(cb) = &self.second {
            cb.on_chunk_complete(filename, processed_pages, total_pages);
        }
    }

    fn on_page_warning(&self, filename: &str, page: usize, warning: &str) {
        self.first.on_page_warning(filename, page, warning);
        if let Some(cb) = &self.second {
            cb.on_page_warning(filename, page, warning);
        }
    }

    fn on_document_complete(&self, filename: &str, total_pages: usize, extracted_pages: usize) {
        self.first
            .on_document_complete(filename, total_pages, extracted_pages);
        if let Some(cb) = &self.second {
            cb.on_document_complete(filename, total_pages, extracted_pages);
        }
    }

    fn on_batch_progress(&self, completed_files: usize, total_files: usize) {
        self.first.on_batch_progress(completed_files, total_files);
        if let Some(cb) = &self.second {
            cb.on_batch_progress(completed_files, total_files);
        }
    }

    fn should_stop(&self) -> bool {
        self.first.should_stop() || self.second.as_ref().is_some_and(|cb| cb.should_stop())
    }
}
