//! Task lifecycle state machine and the concurrent registry that holds it.
//!
//! ```text
//!            begin              complete
//!  queued ─────────▶ processing ─────────▶ completed
//!    │                  │  │
//!    │ cancel    cancel │  │ fail
//!    ▼                  ▼  ▼
//!  cancelled ◀──────────┘  failed        (fail is also allowed from queued)
//! ```
//!
//! Transitions only move forward. The registry is a sharded map
//! (`DashMap`); each mutation holds the shard lock for its key, so updates
//! to one task are linearised while different tasks never contend. Readers
//! get cloned snapshots.

use crate::config::{ExtractionOptions, OutputFormat};
use crate::error::ExtractError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Opaque task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(TaskId)
            .map_err(|e| ExtractError::Validation(format!("invalid task id '{s}': {e}")))
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        })
    }
}

/// Reference to the stored artifact of a completed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub format: OutputFormat,
    pub filename: String,
    pub size: usize,
}

/// Snapshot of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    /// 0–100, non-decreasing while the task runs.
    pub progress: u8,
    /// Short human-readable message.
    pub message: String,
    /// Set only when `status == completed`.
    pub result: Option<ArtifactRef>,
    /// Internal failure detail, set only when `status == failed`. Never
    /// surfaced through the status view.
    pub error_detail: Option<String>,
    pub options: ExtractionOptions,
    /// Number of submitted files (1 for a single document).
    pub file_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub scheduled_for_deletion: bool,
}

/// Task counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RegistryStats {
    pub fn total(&self) -> usize {
        self.queued + self.processing + self.completed + self.failed + self.cancelled
    }
}

/// Concurrent id → task store.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh task in `queued` with progress 0.
    pub fn create(&self, options: ExtractionOptions, file_count: usize) -> TaskId {
        let id = TaskId::new();
        let now = Utc::now();
        self.tasks.insert(
            id,
            Task {
                id,
                status: TaskStatus::Queued,
                progress: 0,
                message: "Queued".to_string(),
                result: None,
                error_detail: None,
                options,
                file_count,
                created_at: now,
                updated_at: now,
                scheduled_for_deletion: false,
            },
        );
        info!("Task {} created ({} file(s))", id, file_count);
        id
    }

    /// `queued → processing`.
    pub fn begin(&self, id: TaskId) -> Result<(), ExtractError> {
        self.transition(id, TaskStatus::Processing, |task| {
            if task.status != TaskStatus::Queued {
                return Err(task.status);
            }
            task.message = "Processing started".to_string();
            Ok(())
        })?;
        info!("Task {} started", id);
        Ok(())
    }

    /// Record progress. A no-op for unknown or terminal tasks; otherwise the
    /// value is clamped to 100 and never moves backwards.
    pub fn advance(&self, id: TaskId, progress: usize, message: impl Into<String>) {
        let Some(mut task) = self.tasks.get_mut(&id) else {
            debug!("advance on unknown task {} ignored", id);
            return;
        };
        if task.status.is_terminal() {
            debug!("advance on {} task {} ignored", task.status, id);
            return;
        }
        let clamped = progress.min(100) as u8;
        task.progress = task.progress.max(clamped);
        task.message = message.into();
        task.updated_at = Utc::now();
    }

    /// `processing → completed`. Idempotent on an already completed task.
    pub fn complete(&self, id: TaskId, artifact: ArtifactRef) -> Result<(), ExtractError> {
        let mut already = false;
        self.transition(id, TaskStatus::Completed, |task| match task.status {
            TaskStatus::Completed => {
                already = true;
                Ok(())
            }
            TaskStatus::Processing => {
                task.progress = 100;
                task.message = "Processing completed".to_string();
                task.result = Some(artifact);
                Ok(())
            }
            other => Err(other),
        })?;
        if !already {
            info!("Task {} completed", id);
        }
        Ok(())
    }

    /// Any non-terminal state → `failed`. The task's message becomes the
    /// short user-facing text and the full error is kept as internal detail.
    pub fn fail(&self, id: TaskId, err: &ExtractError) -> Result<(), ExtractError> {
        self.transition(id, TaskStatus::Failed, |task| {
            if task.status.is_terminal() {
                return Err(task.status);
            }
            task.message = err.user_message();
            task.error_detail = Some(err.to_string());
            Ok(())
        })?;
        error!("Task {} failed: {}", id, err);
        Ok(())
    }

    /// Any non-terminal state → `cancelled`. Idempotent on a cancelled task.
    pub fn cancel(&self, id: TaskId) -> Result<(), ExtractError> {
        self.transition(id, TaskStatus::Cancelled, |task| match task.status {
            TaskStatus::Cancelled => Ok(()),
            s if s.is_terminal() => Err(s),
            _ => {
                task.message = "Processing cancelled".to_string();
                Ok(())
            }
        })?;
        info!("Task {} cancelled", id);
        Ok(())
    }

    /// Snapshot of a task.
    pub fn get(&self, id: TaskId) -> Result<Task, ExtractError> {
        self.tasks
            .get(&id)
            .map(|t| t.clone())
            .ok_or(ExtractError::TaskNotFound(id))
    }

    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.tasks.get(&id).map(|t| t.status)
    }

    pub fn is_cancelled(&self, id: TaskId) -> bool {
        self.status(id) == Some(TaskStatus::Cancelled)
    }

    /// Drop a task. Idempotent.
    pub fn remove(&self, id: TaskId) -> Option<Task> {
        let removed = self.tasks.remove(&id).map(|(_, t)| t);
        if removed.is_some() {
            debug!("Task {} removed", id);
        }
        removed
    }

    /// Flag a task as pending deletion.
    pub fn mark_for_deletion(&self, id: TaskId) -> Result<(), ExtractError> {
        let mut task = self
            .tasks
            .get_mut(&id)
            .ok_or(ExtractError::TaskNotFound(id))?;
        task.scheduled_for_deletion = true;
        task.updated_at = Utc::now();
        Ok(())
    }

    /// Remove every finished task whose last update is older than `max_age`;
    /// returns the removed ids. Queued and processing tasks are kept.
    pub fn purge_older_than(&self, max_age: Duration) -> Vec<TaskId> {
        let Ok(age) = chrono::Duration::from_std(max_age) else {
            return Vec::new();
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
            return Vec::new();
        };

        let mut purged = Vec::new();
        self.tasks.retain(|id, task| {
            let stale = task.status.is_terminal() && task.updated_at < cutoff;
            if stale {
                purged.push(*id);
            }
            !stale
        });
        if !purged.is_empty() {
            info!("Purged {} expired task(s)", purged.len());
        }
        purged
    }

    /// Pretend the task was last updated `by` ago.
    #[cfg(test)]
    pub(crate) fn backdate(&self, id: TaskId, by: Duration) {
        if let Some(mut task) = self.tasks.get_mut(&id) {
            task.updated_at -= chrono::Duration::from_std(by).unwrap();
        }
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for task in self.tasks.iter() {
            match task.status {
                TaskStatus::Queued => stats.queued += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Apply `check` under the key's lock; on `Ok` set `to` and bump
    /// `updated_at`, on `Err(from)` report the rejected transition.
    fn transition(
        &self,
        id: TaskId,
        to: TaskStatus,
        check: impl FnOnce(&mut Task) -> Result<(), TaskStatus>,
    ) -> Result<(), ExtractError> {
        let mut task = self
            .tasks
            .get_mut(&id)
            .ok_or(ExtractError::TaskNotFound(id))?;
        match check(&mut task) {
            Ok(()) => {
                task.status = to;
                task.updated_at = Utc::now();
                Ok(())
            }
            Err(from) => {
                debug!("Task {}: rejected transition {} → {}", id, from, to);
                Err(ExtractError::InvalidTransition { id, from, to })
            }
        }
    }
}
