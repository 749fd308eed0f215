//! Error types for the edgequake-pdf2table library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`ExtractError`]: **Fatal** for a call or a task: the submission is
//!   invalid, the document cannot be opened, every page failed, or the
//!   artifact could not be serialised. A task that hits one of these ends in
//!   the `failed` state.
//!
//! * [`PageWarning`]: **Non-fatal**: one engine failed on one page but a
//!   record was still produced (recovered by the other engine, or left empty).
//!   Stored on [`crate::output::PageRecord::warning`] so callers can audit
//!   degraded pages without losing the document.
//!
//! * [`EngineError`]: the value a [`crate::pipeline::engine::PageExtractor`]
//!   returns instead of panicking. The fallback strategy turns these into
//!   warnings or, when nothing can be opened, into
//!   [`ExtractError::UnreadableDocument`].

use crate::pipeline::engine::Engine;
use crate::task::{TaskId, TaskStatus};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf2table library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Submission errors ─────────────────────────────────────────────────
    /// Malformed or oversized input; the task is never created.
    #[error("Invalid submission: {0}")]
    Validation(String),

    // ── Document errors ───────────────────────────────────────────────────
    /// The container cannot be opened at all (corrupt header, unsupported
    /// encryption, zero pages).
    #[error("Document '{filename}' is unreadable: {detail}")]
    UnreadableDocument { filename: String, detail: String },

    /// Every page failed under every allowed engine.
    #[error("All {total} pages of '{filename}' failed.\nFirst error: {first_error}")]
    AllPagesFailed {
        filename: String,
        total: usize,
        first_error: String,
    },

    /// Every file of a batch failed.
    #[error("All {total} files in the batch failed")]
    AllFilesFailed { total: usize },

    /// Processing stopped at a chunk or file boundary because the task was
    /// cancelled.
    #[error("Processing cancelled")]
    Cancelled,

    // ── Output errors ─────────────────────────────────────────────────────
    /// The formatter could not encode the result.
    #[error("Failed to serialise {format} output: {detail}")]
    Serialization { format: String, detail: String },

    /// Could not create or write the output artifact file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Task errors ───────────────────────────────────────────────────────
    /// No task with this id exists (never created, or already removed).
    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    /// The task exists but has not completed yet.
    #[error("Task {id} is not ready (status: {status})")]
    NotReady { id: TaskId, status: TaskStatus },

    /// The task ended in `failed`; `message` is the short user-facing text.
    #[error("Task {id} failed: {message}")]
    TaskFailed { id: TaskId, message: String },

    /// The task was cancelled; no artifact exists for it.
    #[error("Task {0} was cancelled")]
    TaskCancelled(TaskId),

    /// A lifecycle transition that the state machine forbids.
    #[error("Task {id}: invalid transition {from} → {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (a worker panicked, a blocking task was
    /// aborted, …).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Short message suitable for the task's user-visible `message` field.
    ///
    /// The full `Display` text may carry engine diagnostics; that detail is
    /// retained separately on the task and never shown through `status`.
    pub fn user_message(&self) -> String {
        match self {
            ExtractError::Validation(msg) => format!("Invalid submission: {msg}"),
            ExtractError::UnreadableDocument { .. } => {
                "Processing failed: the PDF could not be opened".to_string()
            }
            ExtractError::AllPagesFailed { .. } => {
                "Processing failed: no text could be extracted from any page".to_string()
            }
            ExtractError::AllFilesFailed { .. } => {
                "Processing failed: every file in the batch failed".to_string()
            }
            ExtractError::Cancelled => "Processing cancelled".to_string(),
            ExtractError::Serialization { format, .. } => {
                format!("Processing failed: could not produce {format} output")
            }
            ExtractError::OutputWriteFailed { .. } => {
                "Processing failed: could not write output".to_string()
            }
            _ => "Processing failed: internal error".to_string(),
        }
    }
}

/// Failure reported by a single extraction engine.
///
/// Engines never panic or propagate library-specific error types; they map
/// everything into one of these variants at the extractor boundary so the
/// fallback policy operates on data.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum EngineError {
    /// The engine's native library could not be loaded.
    #[error("{engine} is unavailable: {detail}")]
    Unavailable { engine: Engine, detail: String },

    /// The engine could not parse the document container.
    #[error("{engine} could not open the document: {detail}")]
    Open { engine: Engine, detail: String },

    /// The document is encrypted and cannot be decrypted with the configured
    /// password (or none was supplied).
    #[error("{engine}: document is encrypted")]
    Encrypted { engine: Engine },

    /// The document opened but a single page could not be decoded.
    #[error("{engine} failed on page {page}: {detail}")]
    Page {
        engine: Engine,
        page: usize,
        detail: String,
    },
}

impl EngineError {
    /// `true` when the failure concerns the whole container rather than one page.
    pub fn is_document_level(&self) -> bool {
        !matches!(self, EngineError::Page { .. })
    }
}

/// A non-fatal problem on a single page.
///
/// Stored alongside [`crate::output::PageRecord`]. The task still completes
/// unless every page of the document carries [`PageWarning::AllEnginesFailed`]
/// or [`PageWarning::EngineFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageWarning {
    /// The primary engine failed (or returned nothing for a page with
    /// content) and the secondary engine produced the text.
    #[error("Page {page}: {failed} failed ({detail}); text recovered with {recovered_by}")]
    Recovered {
        page: usize,
        failed: Engine,
        recovered_by: Engine,
        detail: String,
    },

    /// An explicitly selected engine failed; no fallback was attempted.
    #[error("Page {page}: {engine} failed: {detail}; empty text")]
    EngineFailed {
        page: usize,
        engine: Engine,
        detail: String,
    },

    /// Both engines failed; the page is kept with empty text.
    #[error("Page {page}: both engines failed; empty text ({detail})")]
    AllEnginesFailed { page: usize, detail: String },
}

impl PageWarning {
    /// `true` when no engine produced usable text for the page.
    pub fn is_failure(&self) -> bool {
        !matches!(self, PageWarning::Recovered { .. })
    }
}
