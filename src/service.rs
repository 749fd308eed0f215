//! The boundary operations: submit, status, result, cancel.
//!
//! [`ExtractionService`] owns the task registry, the artifact store and the
//! pipeline. `submit*` validates synchronously (an invalid submission never
//! creates a task), registers a `queued` task and spawns the work on the
//! tokio runtime; everything after that is observed through snapshot reads.
//! A task stays `queued` until a slot of the shared worker pool
//! (`ProcessingConfig::workers`) is free.
//!
//! ```text
//! submit ──▶ validate ──▶ registry.create ──▶ tokio::spawn ─┐
//!                                                          │
//!   ┌──────────────────────────────────────────────────────┘
//!   ▼
//! begin ─▶ process / batch ─▶ format (spawn_blocking) ─▶ store artifact ─▶ complete
//!              │ per chunk / per file
//!              └─▶ registry.advance
//! ```

use crate::config::{ExtractionOptions, OutputFormat, ProcessingConfig};
use crate::error::ExtractError;
use crate::format::OutputFormatter;
use crate::output::{artifact_filename, BatchResult, OutputArtifact};
use crate::pipeline::batch::{batch_percent, ParallelBatchCoordinator};
use crate::pipeline::chunked::ChunkedDocumentProcessor;
use crate::pipeline::input::{validate_batch, validate_document, Document};
use crate::progress::{ExtractionProgressCallback, ProgressCallback, Tee};
use crate::task::{ArtifactRef, RegistryStats, Task, TaskId, TaskRegistry, TaskStatus};
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a client sees when polling a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
}

impl From<&Task> for StatusView {
    fn from(task: &Task) -> Self {
        Self {
            status: task.status,
            progress: task.progress,
            message: task.message.clone(),
        }
    }
}

enum Job {
    Single(Document),
    Batch(Vec<Document>),
}

/// Asynchronous extraction service.
///
/// Cheap to clone; clones share the same registry and artifact store.
/// `submit*` must be called from within a tokio runtime.
#[derive(Clone)]
pub struct ExtractionService {
    config: Arc<ProcessingConfig>,
    registry: Arc<TaskRegistry>,
    artifacts: Arc<DashMap<TaskId, Arc<OutputArtifact>>>,
    processor: Arc<ChunkedDocumentProcessor>,
    coordinator: ParallelBatchCoordinator,
}

impl std::fmt::Debug for ExtractionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionService")
            .field("config", &self.config)
            .field("tasks", &self.registry.len())
            .field("artifacts", &self.artifacts.len())
            .finish()
    }
}

impl ExtractionService {
    pub fn new(config: ProcessingConfig) -> Self {
        let processor = Arc::new(ChunkedDocumentProcessor::from_config(&config));
        let coordinator = ParallelBatchCoordinator::new(Arc::clone(&processor), config.workers);
        Self {
            config: Arc::new(config),
            registry: Arc::new(TaskRegistry::new()),
            artifacts: Arc::new(DashMap::new()),
            processor,
            coordinator,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    // ── Submission ───────────────────────────────────────────────────────

    /// Submit one document.
    pub fn submit(
        &self,
        filename: impl Into<String>,
        bytes: impl Into<Bytes>,
        options: ExtractionOptions,
    ) -> Result<TaskId, ExtractError> {
        self.submit_document(Document::new(filename, bytes), options)
    }

    pub fn submit_document(
        &self,
        doc: Document,
        options: ExtractionOptions,
    ) -> Result<TaskId, ExtractError> {
        validate_document(&doc, &self.config)?;
        let id = self.registry.create(options.clone(), 1);
        self.spawn(id, Job::Single(doc), options);
        Ok(id)
    }

    /// Submit several documents as one task with a single combined artifact.
    pub fn submit_batch(
        &self,
        docs: Vec<Document>,
        options: ExtractionOptions,
    ) -> Result<TaskId, ExtractError> {
        validate_batch(&docs, &self.config)?;
        let id = self.registry.create(options.clone(), docs.len());
        self.spawn(id, Job::Batch(docs), options);
        Ok(id)
    }

    fn spawn(&self, id: TaskId, job: Job, options: ExtractionOptions) {
        let service = self.clone();
        tokio::spawn(async move { service.run(id, job, options).await });
    }

    async fn run(self, id: TaskId, job: Job, options: ExtractionOptions) {
        // A single document holds one worker slot for its whole run; batch
        // files take their own slots inside the coordinator.
        let _permit = match &job {
            Job::Single(_) => match self.coordinator.acquire().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    if let Err(rejected) = self.registry.fail(id, &e) {
                        debug!("Task {}: could not record failure: {}", id, rejected);
                    }
                    return;
                }
            },
            Job::Batch(_) => None,
        };

        if let Err(e) = self.registry.begin(id) {
            // Cancelled or removed before a worker picked it up.
            debug!("Task {} not started: {}", id, e);
            return;
        }

        let files = match &job {
            Job::Single(_) => 1,
            Job::Batch(docs) => docs.len(),
        };
        let progress: ProgressCallback = Arc::new(Tee {
            first: Arc::new(TaskProgress {
                registry: Arc::clone(&self.registry),
                id,
                files,
            }),
            second: self.config.progress_callback.clone(),
        });

        match self.execute(id, job, &options, progress).await {
            Ok(artifact) => self.publish(id, artifact),
            Err(ExtractError::Cancelled) => {
                if let Err(e) = self.registry.cancel(id) {
                    debug!("Task {}: {}", id, e);
                }
            }
            Err(e) => {
                if let Err(rejected) = self.registry.fail(id, &e) {
                    debug!("Task {}: could not record failure: {}", id, rejected);
                }
            }
        }
    }

    async fn execute(
        &self,
        id: TaskId,
        job: Job,
        options: &ExtractionOptions,
        progress: ProgressCallback,
    ) -> Result<OutputArtifact, ExtractError> {
        let format = options.output_format;
        let (batch, name) = match job {
            Job::Single(doc) => {
                let result = self
                    .processor
                    .process(&doc, options, progress.as_ref())
                    .await?
                    .into_checked()?;
                let name = artifact_filename(&doc.filename, format);
                (BatchResult::single(result), name)
            }
            Job::Batch(docs) => {
                let batch = self.coordinator.run(docs, options, progress).await?;
                if batch.succeeded() == 0 {
                    return Err(ExtractError::AllFilesFailed { total: batch.len() });
                }
                (batch, batch_artifact_name(format))
            }
        };

        if self.registry.is_cancelled(id) {
            return Err(ExtractError::Cancelled);
        }

        let formatter = OutputFormatter::new(format, options.wants_metadata());
        tokio::task::spawn_blocking(move || formatter.artifact(&batch, name))
            .await
            .map_err(|e| ExtractError::Internal(format!("Formatter task panicked: {e}")))?
    }

    /// Store the artifact, then complete. If the task was cancelled in
    /// between, the artifact is dropped again.
    fn publish(&self, id: TaskId, artifact: OutputArtifact) {
        let reference = ArtifactRef {
            format: artifact.format,
            filename: artifact.filename.clone(),
            size: artifact.size(),
        };
        self.artifacts.insert(id, Arc::new(artifact));
        if let Err(e) = self.registry.complete(id, reference) {
            debug!("Task {}: discarding artifact: {}", id, e);
            self.artifacts.remove(&id);
        }
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn status(&self, id: TaskId) -> Result<StatusView, ExtractError> {
        self.registry.get(id).map(|t| StatusView::from(&t))
    }

    /// Fetch the artifact of a completed task.
    ///
    /// With `discard_after_download` the task and its artifact are dropped
    /// once this returns `Ok`.
    pub fn result(&self, id: TaskId) -> Result<Arc<OutputArtifact>, ExtractError> {
        let task = self.registry.get(id)?;
        match task.status {
            TaskStatus::Completed => {
                let artifact = self
                    .artifacts
                    .get(&id)
                    .map(|a| Arc::clone(a.value()))
                    .ok_or(ExtractError::TaskNotFound(id))?;
                if self.config.discard_after_download {
                    self.remove(id);
                }
                Ok(artifact)
            }
            TaskStatus::Failed => Err(ExtractError::TaskFailed {
                id,
                message: task.message,
            }),
            TaskStatus::Cancelled => Err(ExtractError::TaskCancelled(id)),
            status => Err(ExtractError::NotReady { id, status }),
        }
    }

    /// Request cancellation. Always acknowledged, including for unknown or
    /// already finished tasks.
    pub fn cancel(&self, id: TaskId) {
        match self.registry.cancel(id) {
            Ok(()) => {}
            Err(ExtractError::TaskNotFound(_)) => debug!("cancel: task {} unknown", id),
            Err(e) => debug!("cancel: {}", e),
        }
    }

    /// Poll until the task reaches a terminal state.
    pub async fn wait(&self, id: TaskId, poll_interval: Duration) -> Result<Task, ExtractError> {
        loop {
            let task = self.registry.get(id)?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }

    // ── Retention ────────────────────────────────────────────────────────

    /// Drop a task and its artifact now. Idempotent.
    pub fn remove(&self, id: TaskId) {
        self.registry.remove(id);
        self.artifacts.remove(&id);
    }

    /// Mark the task for deletion and remove it after
    /// `deletion_delay_secs`.
    pub fn schedule_removal(&self, id: TaskId) -> Result<(), ExtractError> {
        self.registry.mark_for_deletion(id)?;
        let delay = Duration::from_secs(self.config.deletion_delay_secs);
        info!("Task {} scheduled for deletion in {:?}", id, delay);

        let service = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service.remove(id);
        });
        Ok(())
    }

    /// Drop every task (and artifact) older than `retention_secs`. Returns
    /// how many tasks were removed.
    pub fn purge_expired(&self) -> usize {
        let max_age = Duration::from_secs(self.config.retention_secs);
        let purged = self.registry.purge_older_than(max_age);
        for id in &purged {
            self.artifacts.remove(id);
        }
        purged.len()
    }
}

fn batch_artifact_name(format: OutputFormat) -> String {
    format!("batch.{}", format.extension())
}

/// Turns pipeline progress events into registry updates for one task.
struct TaskProgress {
    registry: Arc<TaskRegistry>,
    id: TaskId,
    files: usize,
}

impl ExtractionProgressCallback for TaskProgress {
    fn on_chunk_complete(&self, _filename: &str, processed: usize, total: usize) {
        if total == 0 {
            return;
        }
        self.registry.advance(
            self.id,
            processed * 100 / total,
            format!("Processing page {processed} of {total}"),
        );
    }

    fn on_page_warning(&self, filename: &str, page: usize, warning: &str) {
        warn!("Task {} ({}, page {}): {}", self.id, filename, page, warning);
    }

    fn on_batch_progress(&self, completed: usize, total: usize) {
        self.registry.advance(
            self.id,
            batch_percent(completed, total) as usize,
            format!("Processed {completed} of {} files", self.files.max(total)),
        );
    }

    fn should_stop(&self) -> bool {
        self.registry.status(self.id) != Some(TaskStatus::Processing)
    }
}
