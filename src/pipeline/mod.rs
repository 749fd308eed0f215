//! Pipeline stages for PDF-to-records extraction.
//!
//! Each submodule implements one step. Keeping stages separate makes each
//! independently testable and lets the engines be swapped without touching
//! the stages above them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ chunked ──▶ fallback ──▶ pdfium | lopdf ──▶ postprocess
//! (bytes)   (chunks)    (auto policy)  (engines)         (cleanup)
//!    ▲
//! batch (W documents in flight)
//! ```
//!
//! 1. [`input`]:     in-memory documents and submission validation
//! 2. [`batch`]:     bounded worker pool with per-file failure isolation
//! 3. [`chunked`]:   page chunks on the blocking pool; progress and
//!    cancellation between chunks
//! 4. [`fallback`]:  primary / secondary engine policy per page
//! 5. [`engine`], [`pdfium`], [`lopdf`]: the extraction backends
//! 6. [`postprocess`]: deterministic text-cleanup rules

pub mod batch;
pub mod chunked;
pub mod engine;
pub mod fallback;
pub mod input;
pub mod lopdf;
pub mod pdfium;
pub mod postprocess;
