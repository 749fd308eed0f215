//! Per-page engine selection.
//!
//! Under [`ExtractionMethod::Auto`] every page is first tried with the
//! primary engine. A page is retried with the secondary engine when the
//! primary returned an error for it, or returned empty text although the
//! page reports drawable content. The page record carries the engine that
//! produced its text; when neither engine did, it is tagged
//! [`EngineTag::Failed`] with empty text. An explicitly selected engine is
//! used alone and never falls back.
//!
//! Nothing here aborts a document. The only fatal outcome is
//! [`ExtractError::UnreadableDocument`] from [`FallbackStrategy::open`], when
//! no allowed engine can open the container.

use super::engine::{resolve_engines, EngineTag, PageExtractor, PageOutcomes, PageText};
use crate::config::{ExtractionMethod, ProcessingConfig};
use crate::error::{EngineError, ExtractError, PageWarning};
use crate::output::DocumentMetadata;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

/// Raw (uncleaned) outcome for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageExtraction {
    /// 1-indexed.
    pub page: usize,
    pub text: String,
    pub engine: EngineTag,
    pub warning: Option<PageWarning>,
}

/// What [`FallbackStrategy::open`] learned about a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionPlan {
    pub method: ExtractionMethod,
    pub total_pages: usize,
    /// Set under `auto` when the primary engine could not open the document;
    /// every page then goes straight to the secondary engine.
    primary_error: Option<EngineError>,
}

impl ExtractionPlan {
    /// Plan for a caller that already knows the method and does not want an
    /// up-front open.
    pub fn unprobed(method: ExtractionMethod) -> Self {
        Self {
            method,
            total_pages: 0,
            primary_error: None,
        }
    }
}

/// Primary + secondary engines and the auto policy.
#[derive(Clone)]
pub struct FallbackStrategy {
    primary: Arc<dyn PageExtractor>,
    secondary: Arc<dyn PageExtractor>,
}

impl std::fmt::Debug for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackStrategy")
            .field("primary", &self.primary.engine())
            .field("secondary", &self.secondary.engine())
            .finish()
    }
}

impl FallbackStrategy {
    pub fn new(primary: Arc<dyn PageExtractor>, secondary: Arc<dyn PageExtractor>) -> Self {
        Self { primary, secondary }
    }

    /// Injected engines from config, else the built-in pdfium / lopdf pair.
    pub fn from_config(config: &ProcessingConfig) -> Self {
        let (primary, secondary) = resolve_engines(config);
        Self::new(primary, secondary)
    }

    /// Open the document with the allowed engines and count its pages.
    ///
    /// A document with zero pages is unreadable.
    pub fn open(
        &self,
        data: &[u8],
        method: ExtractionMethod,
        filename: &str,
    ) -> Result<ExtractionPlan, ExtractError> {
        let unreadable = |detail: String| ExtractError::UnreadableDocument {
            filename: filename.to_string(),
            detail,
        };

        let total_pages = match method {
            ExtractionMethod::Pdfium => self
                .primary
                .page_count(data)
                .map_err(|e| unreadable(e.to_string()))?,
            ExtractionMethod::Lopdf => self
                .secondary
                .page_count(data)
                .map_err(|e| unreadable(e.to_string()))?,
            ExtractionMethod::Auto => match self.primary.page_count(data) {
                Ok(n) => n,
                Err(primary_err) => {
                    warn!(
                        "{}: {}; falling back to {} for every page",
                        filename,
                        primary_err,
                        self.secondary.engine()
                    );
                    let n = self
                        .secondary
                        .page_count(data)
                        .map_err(|e| unreadable(format!("{primary_err}; {e}")))?;
                    if n == 0 {
                        return Err(unreadable("document has no pages".into()));
                    }
                    return Ok(ExtractionPlan {
                        method,
                        total_pages: n,
                        primary_error: Some(primary_err),
                    });
                }
            },
        };

        if total_pages == 0 {
            return Err(unreadable("document has no pages".into()));
        }
        Ok(ExtractionPlan {
            method,
            total_pages,
            primary_error: None,
        })
    }

    /// Extract a contiguous range of 0-indexed pages from one open document
    /// per engine.
    pub fn extract_chunk(
        &self,
        data: &[u8],
        pages: Range<usize>,
        plan: &ExtractionPlan,
    ) -> Vec<PageExtraction> {
        let indices: Vec<usize> = pages.collect();
        match plan.method {
            ExtractionMethod::Pdfium => explicit(self.primary.as_ref(), data, &indices),
            ExtractionMethod::Lopdf => explicit(self.secondary.as_ref(), data, &indices),
            ExtractionMethod::Auto => self.auto(data, &indices, plan.primary_error.as_ref()),
        }
    }

    /// Extract a single 0-indexed page.
    pub fn extract_page(
        &self,
        data: &[u8],
        page_index: usize,
        method: ExtractionMethod,
    ) -> PageExtraction {
        let plan = ExtractionPlan::unprobed(method);
        self.extract_chunk(data, page_index..page_index + 1, &plan)
            .pop()
            .unwrap_or_else(|| PageExtraction {
                page: page_index + 1,
                text: String::new(),
                engine: EngineTag::Failed,
                warning: Some(PageWarning::AllEnginesFailed {
                    page: page_index + 1,
                    detail: "no result".into(),
                }),
            })
    }

    /// Read document metadata; under `auto` the secondary engine is used
    /// when the primary fails.
    pub fn metadata(
        &self,
        data: &[u8],
        plan: &ExtractionPlan,
    ) -> Result<DocumentMetadata, EngineError> {
        match plan.method {
            ExtractionMethod::Pdfium => self.primary.metadata(data),
            ExtractionMethod::Lopdf => self.secondary.metadata(data),
            ExtractionMethod::Auto => {
                if plan.primary_error.is_none() {
                    match self.primary.metadata(data) {
                        Ok(meta) => return Ok(meta),
                        Err(e) => debug!("Primary metadata failed: {}", e),
                    }
                }
                self.secondary.metadata(data)
            }
        }
    }

    fn auto(
        &self,
        data: &[u8],
        indices: &[usize],
        primary_error: Option<&EngineError>,
    ) -> Vec<PageExtraction> {
        let primary = self.primary.engine();
        let secondary = self.secondary.engine();

        let first: PageOutcomes = match primary_error {
            Some(e) => indices.iter().map(|_| Err(e.clone())).collect(),
            None => page_outcomes(self.primary.as_ref(), data, indices),
        };

        let mut out: Vec<Option<PageExtraction>> = vec![None; indices.len()];
        let mut retry: Vec<(usize, String)> = Vec::new();

        for (slot, (&idx, outcome)) in indices.iter().zip(first).enumerate() {
            match outcome {
                Ok(pt) if !pt.is_suspect() => {
                    out[slot] = Some(PageExtraction {
                        page: idx + 1,
                        text: pt.text,
                        engine: primary.into(),
                        warning: None,
                    });
                }
                Ok(_) => retry.push((slot, "empty text on a page with content".into())),
                Err(e) => retry.push((slot, e.to_string())),
            }
        }

        if !retry.is_empty() {
            let retry_indices: Vec<usize> = retry.iter().map(|(slot, _)| indices[*slot]).collect();
            debug!(
                "Retrying {} page(s) with {}: {:?}",
                retry_indices.len(),
                secondary,
                retry_indices.iter().map(|i| i + 1).collect::<Vec<_>>()
            );
            let second = page_outcomes(self.secondary.as_ref(), data, &retry_indices);

            for ((slot, first_detail), outcome) in retry.into_iter().zip(second) {
                let page = indices[slot] + 1;
                out[slot] = Some(match outcome {
                    Ok(pt) if !pt.is_suspect() => {
                        warn!(
                            "Page {}: {} failed ({}); recovered with {}",
                            page, primary, first_detail, secondary
                        );
                        PageExtraction {
                            page,
                            text: pt.text,
                            engine: secondary.into(),
                            warning: Some(PageWarning::Recovered {
                                page,
                                failed: primary,
                                recovered_by: secondary,
                                detail: first_detail,
                            }),
                        }
                    }
                    Ok(PageText { .. }) => failed(
                        page,
                        format!("{first_detail}; {secondary}: empty text on a page with content"),
                    ),
                    Err(e) => failed(page, format!("{first_detail}; {e}")),
                });
            }
        }

        out.into_iter()
            .zip(indices)
            .map(|(page, &idx)| {
                page.unwrap_or_else(|| failed(idx + 1, "engine returned no outcome".into()))
            })
            .collect()
    }
}

/// One outcome per requested index. A whole-call error is repeated for every
/// page; a short answer is padded with per-page errors and extras dropped.
fn page_outcomes(engine: &dyn PageExtractor, data: &[u8], indices: &[usize]) -> PageOutcomes {
    let name = engine.engine();
    let mut results = engine
        .extract_pages(data, indices)
        .unwrap_or_else(|e| indices.iter().map(|_| Err(e.clone())).collect());
    if results.len() != indices.len() {
        warn!(
            "{} returned {} outcome(s) for {} page(s)",
            name,
            results.len(),
            indices.len()
        );
    }
    results.truncate(indices.len());
    for &idx in &indices[results.len()..] {
        results.push(Err(EngineError::Page {
            engine: name,
            page: idx + 1,
            detail: "engine returned no outcome".into(),
        }));
    }
    results
}

fn failed(page: usize, detail: String) -> PageExtraction {
    warn!("Page {}: both engines failed ({})", page, detail);
    PageExtraction {
        page,
        text: String::new(),
        engine: EngineTag::Failed,
        warning: Some(PageWarning::AllEnginesFailed { page, detail }),
    }
}

fn explicit(engine: &dyn PageExtractor, data: &[u8], indices: &[usize]) -> Vec<PageExtraction> {
    let name = engine.engine();
    let outcomes = page_outcomes(engine, data, indices);

    indices
        .iter()
        .zip(outcomes)
        .map(|(&idx, outcome)| {
            let page = idx + 1;
            match outcome {
                Ok(pt) => PageExtraction {
                    page,
                    text: pt.text,
                    engine: name.into(),
                    warning: None,
                },
                Err(e) => {
                    warn!("Page {}: {}", page, e);
                    PageExtraction {
                        page,
                        text: String::new(),
                        engine: EngineTag::Failed,
                        warning: Some(PageWarning::EngineFailed {
                            page,
                            engine: name,
                            detail: e.to_string(),
                        }),
                    }
                }
            }
        })
        .collect()
}
