//! Shared helpers for integration tests: an in-memory PDF builder and a
//! scripted engine that needs no native library.

#![allow(dead_code)]

use edgequake_pdf2table::{
    DocumentMetadata, Engine, EngineError, PageExtractor, PageOutcomes, PageText,
    ProcessingConfig,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Route library logs to the test harness (visible with `--nocapture`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Build a PDF with one text page per entry.
pub fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 11.into()]),
                Operation::new("Td", vec![50.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Placeholder payload for scripted engines; only has to pass validation.
pub fn fake_pdf() -> Vec<u8> {
    b"%PDF-1.7 scripted".to_vec()
}

/// What a scripted engine does for one page.
#[derive(Debug, Clone)]
pub enum Script {
    Text(&'static str),
    /// Empty text on a page that claims to have content.
    Blank,
    Fail,
}

/// A fake engine following a fixed per-page script.
pub struct Scripted {
    engine: Engine,
    pages: Vec<Script>,
    unreadable: bool,
    delay: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    /// Most `extract_pages` calls seen running at the same time.
    pub peak: AtomicUsize,
}

impl Scripted {
    pub fn new(engine: Engine, pages: Vec<Script>) -> Self {
        Self {
            engine,
            pages,
            unreadable: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn texts(engine: Engine, texts: &[&'static str]) -> Self {
        Self::new(engine, texts.iter().map(|t| Script::Text(t)).collect())
    }

    pub fn unreadable(engine: Engine) -> Self {
        Self {
            unreadable: true,
            ..Self::new(engine, vec![])
        }
    }

    /// Sleep this long inside every `extract_pages` call.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl PageExtractor for Scripted {
    fn engine(&self) -> Engine {
        self.engine
    }

    fn page_count(&self, _data: &[u8]) -> Result<usize, EngineError> {
        if self.unreadable {
            return Err(EngineError::Open {
                engine: self.engine,
                detail: "scripted: bad xref".into(),
            });
        }
        Ok(self.pages.len())
    }

    fn extract_pages(&self, _data: &[u8], pages: &[usize]) -> Result<PageOutcomes, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.unreadable {
            return Err(EngineError::Open {
                engine: self.engine,
                detail: "scripted: bad xref".into(),
            });
        }
        Ok(pages
            .iter()
            .map(|&idx| match self.pages.get(idx) {
                Some(Script::Text(t)) => Ok(PageText {
                    text: t.to_string(),
                    has_content: true,
                }),
                Some(Script::Blank) => Ok(PageText {
                    text: String::new(),
                    has_content: true,
                }),
                Some(Script::Fail) | None => Err(EngineError::Page {
                    engine: self.engine,
                    page: idx + 1,
                    detail: "scripted: broken content stream".into(),
                }),
            })
            .collect())
    }

    fn metadata(&self, _data: &[u8]) -> Result<DocumentMetadata, EngineError> {
        if self.unreadable {
            return Err(EngineError::Open {
                engine: self.engine,
                detail: "scripted: bad xref".into(),
            });
        }
        Ok(DocumentMetadata {
            title: Some("Scripted".into()),
            author: None,
            creation_date: None,
            producer: Some(self.engine.to_string()),
        })
    }
}

/// Config wired to the given engines.
pub fn config_with(
    primary: Arc<dyn PageExtractor>,
    secondary: Arc<dyn PageExtractor>,
    chunk_size: usize,
) -> ProcessingConfig {
    ProcessingConfig::builder()
        .primary(primary)
        .secondary(secondary)
        .chunk_size(chunk_size)
        .build()
        .unwrap()
}
