//! Bounded worker pool over many documents.
//!
//! The pool is a semaphore with `workers` permits. It is shared with the
//! service, so single-document tasks and batch files draw from the same
//! budget and at most `workers` documents are extracted at once process-wide.
//!
//! Every batch file holds a permit inside its own `tokio::spawn`ed task, so a
//! panic in one file's extraction surfaces as a `JoinError` for that file
//! only. Outcomes land in a slot indexed by submission position, which keeps
//! the result in submission order however the workers finish.

use super::chunked::ChunkedDocumentProcessor;
use super::input::Document;
use crate::config::ExtractionOptions;
use crate::error::ExtractError;
use crate::output::{BatchEntry, BatchResult, FileOutcome};
use crate::progress::{ExtractionProgressCallback, ProgressCallback};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

/// Runs the chunked processor over a batch with per-file failure isolation.
#[derive(Debug, Clone)]
pub struct ParallelBatchCoordinator {
    processor: Arc<ChunkedDocumentProcessor>,
    workers: usize,
    pool: Arc<Semaphore>,
}

/// Per-document view of the batch observer: cancellation and page warnings
/// pass through, page-level progress does not (the batch reports per file).
struct FileScope(ProgressCallback);

impl ExtractionProgressCallback for FileScope {
    fn on_page_warning(&self, filename: &str, page: usize, warning: &str) {
        self.0.on_page_warning(filename, page, warning);
    }

    fn should_stop(&self) -> bool {
        self.0.should_stop()
    }
}

impl ParallelBatchCoordinator {
    pub fn new(processor: Arc<ChunkedDocumentProcessor>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            processor,
            workers,
            pool: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Wait for a worker slot. The document may be extracted while the
    /// returned permit is alive.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ExtractError> {
        Arc::clone(&self.pool)
            .acquire_owned()
            .await
            .map_err(|e| ExtractError::Internal(format!("worker pool closed: {e}")))
    }

    /// Process every document; one entry per input, in input order.
    ///
    /// Individual failures (unreadable file, every page failed, worker
    /// panic) become [`FileOutcome::Failed`] entries. The only error is
    /// [`ExtractError::Cancelled`], when the observer asks to stop.
    pub async fn run(
        &self,
        docs: Vec<Document>,
        options: &ExtractionOptions,
        progress: ProgressCallback,
    ) -> Result<BatchResult, ExtractError> {
        let total = docs.len();
        info!("Batch of {} files, {} workers", total, self.workers);

        let mut slots: Vec<Option<BatchEntry>> = vec![None; total];
        let mut completed = 0usize;

        let mut outcomes = stream::iter(docs.into_iter().enumerate().map(|(index, doc)| {
            let processor = Arc::clone(&self.processor);
            let options = options.clone();
            let scope = FileScope(Arc::clone(&progress));
            async move {
                let filename = doc.filename.clone();
                let permit = match self.acquire().await {
                    Ok(permit) => permit,
                    Err(e) => return (index, filename, Err(e)),
                };
                if scope.should_stop() {
                    return (index, filename, Err(ExtractError::Cancelled));
                }
                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    processor
                        .process(&doc, &options, &scope)
                        .await
                        .and_then(|r| r.into_checked())
                });
                let outcome = match handle.await {
                    Ok(result) => result,
                    Err(join_err) => Err(ExtractError::Internal(format!(
                        "worker for '{filename}' panicked: {join_err}"
                    ))),
                };
                (index, filename, outcome)
            }
        }))
        .buffer_unordered(self.workers);

        while let Some((index, filename, outcome)) = outcomes.next().await {
            let outcome = match outcome {
                Ok(result) => FileOutcome::Extracted(result),
                Err(e) => {
                    if matches!(e, ExtractError::Cancelled) {
                        debug!("{}: skipped", filename);
                    } else {
                        error!("{}: {}", filename, e);
                    }
                    FileOutcome::failed(&e)
                }
            };
            slots[index] = Some(BatchEntry { filename, outcome });
            completed += 1;
            progress.on_batch_progress(completed, total);
        }

        if progress.should_stop() {
            warn!("Batch stopped after {}/{} files", completed, total);
            return Err(ExtractError::Cancelled);
        }

        let entries: Vec<BatchEntry> = slots.into_iter().flatten().collect();
        if entries.len() != total {
            return Err(ExtractError::Internal(format!(
                "batch produced {} entries for {} files",
                entries.len(),
                total
            )));
        }

        let result = BatchResult { entries };
        info!(
            "Batch complete: {}/{} files succeeded",
            result.succeeded(),
            total
        );
        Ok(result)
    }
}

/// Percentage of files completed, rounded down.
pub fn batch_percent(completed_files: usize, total_files: usize) -> u8 {
    if total_files == 0 {
        return 100;
    }
    ((completed_files.min(total_files) * 100) / total_files) as u8
}
