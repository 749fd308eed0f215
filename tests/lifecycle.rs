//! Task-lifecycle integration tests.
//!
//! Everything here runs against lopdf-generated PDFs or scripted engines, so
//! no native pdfium library is needed.
//!
//! Run with:
//!   cargo test --test lifecycle -- --nocapture

mod common;

use arrow_array::{Array, Int64Array, StringArray};
use bytes::Bytes;
use common::{build_pdf, config_with, fake_pdf, init_tracing, Script, Scripted};
use edgequake_pdf2table::pipeline::lopdf::LopdfExtractor;
use edgequake_pdf2table::{
    extract_from_bytes, Document, Engine, EngineTag, ExtractError, ExtractionMethod,
    ExtractionOptions, ExtractionService, OutputFormat, PageWarning, ProcessingConfig,
    TaskStatus,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const POLL: Duration = Duration::from_millis(2);

fn lopdf_service(chunk_size: usize) -> ExtractionService {
    init_tracing();
    let engine = Arc::new(LopdfExtractor::default());
    ExtractionService::new(config_with(engine.clone(), engine, chunk_size))
}

fn options(format: OutputFormat, include_metadata: bool) -> ExtractionOptions {
    ExtractionOptions {
        output_format: format,
        include_metadata,
        ..Default::default()
    }
}

fn csv_records(bytes: &[u8]) -> Vec<csv::StringRecord> {
    csv::Reader::from_reader(bytes)
        .records()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

// ── 1. N pages → N rows in page order ────────────────────────────────────────

#[tokio::test]
async fn test_n_pages_give_n_rows_in_order() {
    let texts: Vec<String> = (1..=7).map(|i| format!("Line item {i}")).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let svc = lopdf_service(3);

    let id = svc
        .submit("ledger.pdf", build_pdf(&refs), options(OutputFormat::Csv, false))
        .unwrap();
    let task = svc.wait(id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);

    let artifact = svc.result(id).unwrap();
    let rows = csv_records(&artifact.bytes);
    assert_eq!(rows.len(), 7);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(&row[0], "ledger.pdf");
        assert_eq!(row[1].parse::<usize>().unwrap(), i + 1);
        assert_eq!(&row[2], format!("Line item {}", i + 1));
    }
}

// ── 2. Progress is monotonic and ends at 100 ─────────────────────────────────

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_100() {
    let primary = Arc::new(
        Scripted::texts(Engine::Pdfium, &["a", "b", "c", "d", "e"])
            .slow(Duration::from_millis(15)),
    );
    let secondary = Arc::new(Scripted::texts(Engine::Lopdf, &[]));
    let svc = ExtractionService::new(config_with(primary, secondary, 1));

    let id = svc
        .submit("p.pdf", fake_pdf(), ExtractionOptions::default())
        .unwrap();

    let mut seen = Vec::new();
    loop {
        let view = svc.status(id).unwrap();
        seen.push(view.progress);
        if view.status.is_terminal() {
            assert_eq!(view.status, TaskStatus::Completed);
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {seen:?}");
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.iter().any(|&p| p > 0 && p < 100), "no intermediate tick: {seen:?}");
}

// ── 3. Identical submissions → identical output ──────────────────────────────

#[tokio::test]
async fn test_identical_submissions_give_identical_artifacts() {
    let svc = lopdf_service(2);
    let pdf = Bytes::from(build_pdf(&["alpha", "beta", "gamma"]));

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let id = svc
            .submit("same.pdf", pdf.clone(), options(OutputFormat::Json, true))
            .unwrap();
        svc.wait(id, POLL).await.unwrap();
        outputs.push(svc.result(id).unwrap().bytes.clone());
    }
    assert_eq!(outputs[0], outputs[1]);
}

// ── 4. Primary fails on a page, secondary recovers ───────────────────────────

#[tokio::test]
async fn test_secondary_recovers_failed_primary_page() {
    init_tracing();
    let primary = Arc::new(Scripted::new(
        Engine::Pdfium,
        vec![Script::Text("one"), Script::Fail, Script::Blank],
    ));
    let secondary = Arc::new(Scripted::texts(Engine::Lopdf, &["uno", "dos", "tres"]));
    let config = config_with(primary, secondary.clone(), 20);

    let result = extract_from_bytes("mixed.pdf", fake_pdf(), &config, &ExtractionOptions::default())
        .await
        .unwrap();
    let engines: Vec<EngineTag> = result.pages.iter().map(|p| p.engine).collect();
    assert_eq!(engines, vec![EngineTag::Pdfium, EngineTag::Lopdf, EngineTag::Lopdf]);
    assert_eq!(result.pages[1].text, "dos");
    assert_eq!(result.pages[2].text, "tres");
    assert!(matches!(
        result.pages[1].warning,
        Some(PageWarning::Recovered { page: 2, .. })
    ));
    assert_eq!(result.warnings.len(), 2);
    // Both retried pages went to the secondary in one call.
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);

    // The same document through the task service completes.
    let svc = ExtractionService::new(config);
    let id = svc
        .submit("mixed.pdf", fake_pdf(), options(OutputFormat::Csv, false))
        .unwrap();
    assert_eq!(svc.wait(id, POLL).await.unwrap().status, TaskStatus::Completed);
    let rows = csv_records(&svc.result(id).unwrap().bytes);
    assert_eq!(
        rows.iter().map(|r| r[2].to_string()).collect::<Vec<_>>(),
        vec!["one", "dos", "tres"]
    );
}

#[tokio::test]
async fn test_explicit_method_never_falls_back() {
    let primary = Arc::new(Scripted::new(
        Engine::Pdfium,
        vec![Script::Text("kept"), Script::Fail],
    ));
    let secondary = Arc::new(Scripted::texts(Engine::Lopdf, &["x", "y"]));
    let config = config_with(primary, secondary.clone(), 20);
    let options = ExtractionOptions {
        extraction_method: ExtractionMethod::Pdfium,
        ..Default::default()
    };

    let result = extract_from_bytes("e.pdf", fake_pdf(), &config, &options)
        .await
        .unwrap();
    assert_eq!(result.pages[1].engine, EngineTag::Failed);
    assert_eq!(result.pages[1].text, "");
    assert!(matches!(
        result.pages[1].warning,
        Some(PageWarning::EngineFailed { engine: Engine::Pdfium, .. })
    ));
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
}

// ── 5. Both engines fail everywhere → failed, no artifact ────────────────────

#[tokio::test]
async fn test_universal_failure_fails_task() {
    init_tracing();
    let primary = Arc::new(Scripted::new(Engine::Pdfium, vec![Script::Fail; 3]));
    let secondary = Arc::new(Scripted::new(
        Engine::Lopdf,
        vec![Script::Fail, Script::Blank, Script::Fail],
    ));
    let svc = ExtractionService::new(config_with(primary, secondary, 2));

    let id = svc
        .submit("dead.pdf", fake_pdf(), ExtractionOptions::default())
        .unwrap();
    let task = svc.wait(id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.result.is_none());
    assert!(task.error_detail.unwrap().contains("All 3 pages"));

    match svc.result(id) {
        Err(ExtractError::TaskFailed { message, .. }) => {
            assert!(!message.contains("scripted"), "engine detail leaked: {message}");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[tokio::test]
async fn test_unopenable_document_fails_task() {
    let svc = ExtractionService::new(config_with(
        Arc::new(Scripted::unreadable(Engine::Pdfium)),
        Arc::new(Scripted::unreadable(Engine::Lopdf)),
        20,
    ));
    let id = svc
        .submit("locked.pdf", fake_pdf(), ExtractionOptions::default())
        .unwrap();
    let task = svc.wait(id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.message, "Processing failed: the PDF could not be opened");
}

// ── 6. Batch with one unreadable file ────────────────────────────────────────

#[tokio::test]
async fn test_batch_isolates_unreadable_file() {
    let svc = lopdf_service(20);
    let good = Bytes::from(build_pdf(&["first", "second"]));
    let docs: Vec<Document> = (0..5)
        .map(|i| {
            if i == 3 {
                Document::new("broken.pdf", Bytes::from_static(b"%PDF-1.4\n%%EOF"))
            } else {
                Document::new(format!("file{i}.pdf"), good.clone())
            }
        })
        .collect();

    let id = svc
        .submit_batch(docs, options(OutputFormat::Json, false))
        .unwrap();
    let task = svc.wait(id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100);

    let artifact = svc.result(id).unwrap();
    assert_eq!(artifact.filename, "batch.json");
    let records: Vec<serde_json::Value> = serde_json::from_slice(&artifact.bytes).unwrap();
    assert_eq!(records.len(), 5);

    let names: Vec<&str> = records
        .iter()
        .map(|r| r["filename"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["file0.pdf", "file1.pdf", "file2.pdf", "broken.pdf", "file4.pdf"]
    );
    let failures: Vec<&serde_json::Value> =
        records.iter().filter(|r| r.get("error").is_some()).collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0]["filename"], "broken.pdf");
    let reason = failures[0]["error"].as_str().unwrap();
    assert_eq!(reason, "Processing failed: the PDF could not be opened");
    assert!(!reason.contains("lopdf"), "engine detail leaked: {reason}");
    assert!(!reason.contains("broken.pdf"));
    assert_eq!(records[0]["pages"].as_array().unwrap().len(), 2);
    assert_eq!(records[0]["pages"][1]["text"], "second");
}

#[tokio::test]
async fn test_batch_progress_counts_files_not_pages() {
    let primary = Arc::new(
        Scripted::texts(Engine::Pdfium, &["a", "b", "c"]).slow(Duration::from_millis(10)),
    );
    let secondary = Arc::new(Scripted::texts(Engine::Lopdf, &[]));
    let svc = ExtractionService::new(config_with(primary, secondary, 1));
    let docs: Vec<Document> = (0..5)
        .map(|i| Document::new(format!("f{i}.pdf"), fake_pdf()))
        .collect();

    let id = svc
        .submit_batch(docs, options(OutputFormat::Csv, false))
        .unwrap();
    let mut seen = Vec::new();
    loop {
        let view = svc.status(id).unwrap();
        if view.status.is_terminal() {
            assert_eq!(view.status, TaskStatus::Completed);
            assert_eq!(view.progress, 100);
            break;
        }
        seen.push((view.progress, view.message));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    assert!(!seen.is_empty());
    for (progress, message) in &seen {
        assert!(
            [0, 20, 40, 60, 80, 100].contains(progress),
            "page-level progress leaked: {progress} ({message})"
        );
        assert!(!message.starts_with("Processing page"), "got: {message}");
        if *progress > 0 {
            assert_eq!(message, &format!("Processed {} of 5 files", progress / 20));
        }
    }
}

// ── Shared worker pool ───────────────────────────────────────────────────────

fn pooled_service(primary: Arc<Scripted>, workers: usize) -> ExtractionService {
    let config = ProcessingConfig::builder()
        .primary(primary)
        .secondary(Arc::new(Scripted::texts(Engine::Lopdf, &[])))
        .chunk_size(1)
        .workers(workers)
        .build()
        .unwrap();
    ExtractionService::new(config)
}

#[tokio::test]
async fn test_concurrent_submissions_share_worker_pool() {
    init_tracing();
    let primary = Arc::new(
        Scripted::texts(Engine::Pdfium, &["a", "b"]).slow(Duration::from_millis(40)),
    );
    let svc = pooled_service(primary.clone(), 2);

    let ids: Vec<_> = (0..8)
        .map(|i| {
            svc.submit(format!("doc{i}.pdf"), fake_pdf(), ExtractionOptions::default())
                .unwrap()
        })
        .collect();
    for id in ids {
        let task = svc.wait(id, POLL).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    let peak = primary.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "{peak} documents extracted at once with 2 workers");
    assert_eq!(primary.calls.load(Ordering::SeqCst), 16);
}

#[tokio::test]
async fn test_batches_and_single_documents_share_worker_pool() {
    let primary = Arc::new(
        Scripted::texts(Engine::Pdfium, &["a", "b"]).slow(Duration::from_millis(30)),
    );
    let svc = pooled_service(primary.clone(), 2);

    let batch = |prefix: &str| -> Vec<Document> {
        (0..3)
            .map(|i| Document::new(format!("{prefix}{i}.pdf"), fake_pdf()))
            .collect()
    };
    let ids = vec![
        svc.submit_batch(batch("a"), ExtractionOptions::default()).unwrap(),
        svc.submit_batch(batch("b"), ExtractionOptions::default()).unwrap(),
        svc.submit("single.pdf", fake_pdf(), ExtractionOptions::default())
            .unwrap(),
    ];
    for id in ids {
        let task = svc.wait(id, POLL).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    let peak = primary.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "{peak} documents extracted at once with 2 workers");
}

// ── 7. Cancel mid-processing ─────────────────────────────────────────────────

#[tokio::test]
async fn test_cancel_mid_processing_never_yields_artifact() {
    init_tracing();
    let primary = Arc::new(
        Scripted::texts(Engine::Pdfium, &["1", "2", "3", "4", "5", "6", "7", "8"])
            .slow(Duration::from_millis(25)),
    );
    let secondary = Arc::new(Scripted::texts(Engine::Lopdf, &[]));
    let svc = ExtractionService::new(config_with(primary.clone(), secondary, 1));

    let id = svc
        .submit("long.pdf", fake_pdf(), ExtractionOptions::default())
        .unwrap();
    while svc.status(id).unwrap().status == TaskStatus::Queued {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    svc.cancel(id);
    svc.cancel(id);

    let task = svc.wait(id, POLL).await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);

    // Give the worker time to reach its next chunk boundary and stop.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let view = svc.status(id).unwrap();
    assert_eq!(view.status, TaskStatus::Cancelled);
    assert!(view.progress < 100);
    assert!(matches!(svc.result(id), Err(ExtractError::TaskCancelled(_))));
    assert!(primary.calls.load(Ordering::SeqCst) < 8);
}

#[tokio::test]
async fn test_status_of_unknown_task_is_not_found() {
    let svc = lopdf_service(20);
    let ghost = edgequake_pdf2table::TaskId::new();
    assert_err!(svc.status(ghost));
    svc.cancel(ghost);
}

// ── 8. CSV and Parquet carry the same cells ──────────────────────────────────

#[tokio::test]
async fn test_csv_and_parquet_cells_match() {
    let primary = Arc::new(Scripted::texts(
        Engine::Pdfium,
        &["Total: 1,204.50", "Notes \"quoted\"", ""],
    ));
    let secondary = Arc::new(Scripted::texts(Engine::Lopdf, &["", "", ""]));
    let svc = ExtractionService::new(config_with(primary, secondary, 20));
    let doc = fake_pdf();

    let csv_id = assert_ok!(svc.submit("m.pdf", doc.clone(), options(OutputFormat::Csv, true)));
    let pq_id = assert_ok!(svc.submit("m.pdf", doc, options(OutputFormat::Parquet, true)));
    svc.wait(csv_id, POLL).await.unwrap();
    svc.wait(pq_id, POLL).await.unwrap();

    let csv_rows = csv_records(&svc.result(csv_id).unwrap().bytes);
    let parquet = svc.result(pq_id).unwrap();
    assert_eq!(parquet.media_type(), "application/octet-stream");

    let reader = ParquetRecordBatchReaderBuilder::try_new(parquet.bytes.clone())
        .unwrap()
        .build()
        .unwrap();
    let mut pq_rows: Vec<Vec<String>> = Vec::new();
    for batch in reader {
        let batch = batch.unwrap();
        let string_col = |i: usize| {
            batch
                .column(i)
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap()
                .clone()
        };
        let pages = batch
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .clone();
        let (filenames, texts) = (string_col(0), string_col(2));
        let meta: Vec<StringArray> = (3..7).map(string_col).collect();
        for row in 0..batch.num_rows() {
            let mut cells = vec![
                filenames.value(row).to_string(),
                pages.value(row).to_string(),
                texts.value(row).to_string(),
            ];
            for col in &meta {
                cells.push(if col.is_null(row) {
                    String::new()
                } else {
                    col.value(row).to_string()
                });
            }
            pq_rows.push(cells);
        }
    }

    let csv_cells: Vec<Vec<String>> = csv_rows
        .iter()
        .map(|r| r.iter().map(str::to_string).collect())
        .collect();
    assert_eq!(csv_cells.len(), 3);
    assert_eq!(csv_cells, pq_rows);
    assert_eq!(csv_cells[0][3], "Scripted");
    assert_eq!(csv_cells[0][4], "");
}
