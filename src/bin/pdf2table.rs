//! CLI binary for edgequake-pdf2table.
//!
//! A thin shim over the library: maps flags to `ProcessingConfig` and
//! `ExtractionOptions`, submits one task through `ExtractionService`, renders
//! the polled progress and writes the artifact.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2table::{
    inspect, Document, ExtractionMethod, ExtractionOptions, ExtractionProgressCallback,
    ExtractionService, OutputFormat, ProcessingConfig, TaskId, TaskStatus,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];
const POLL: Duration = Duration::from_millis(100);

// ── Page-warning log lines above the bar ─────────────────────────────────────

/// Prints degraded pages above the progress bar. Percentages come from status
/// polls, not from here.
struct CliWarnings {
    bar: ProgressBar,
    count: AtomicUsize,
}

impl ExtractionProgressCallback for CliWarnings {
    fn on_page_warning(&self, filename: &str, page: usize, warning: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        let msg = if warning.chars().count() > 90 {
            let cut: String = warning.chars().take(89).collect();
            format!("{cut}\u{2026}")
        } else {
            warning.to_string()
        };
        self.bar.println(format!(
            "  {} {} p.{:<4} {}",
            yellow("⚠"),
            dim(filename),
            page,
            msg
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One file to CSV on stdout
  pdf2table report.pdf

  # Parquet file, text only
  pdf2table --format parquet --text-only report.pdf -o report.parquet

  # Batch of files into one JSON document, 4 workers
  pdf2table --format json --workers 4 a.pdf b.pdf c.pdf -o batch.json

  # Force the pure-Rust engine (no libpdfium needed)
  pdf2table --method lopdf scanned.pdf

  # Metadata only
  pdf2table --inspect-only report.pdf

ENGINES:
  auto     pdfium per page, lopdf for pages pdfium cannot read (default)
  pdfium   pdfium only (alias: pymupdf)
  lopdf    lopdf only  (alias: pypdf)

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  PDF2TABLE_*             Every flag can be set through its PDF2TABLE_ variable
  RUST_LOG                Override the log filter
"#;

/// Extract text from PDF files into CSV, JSON or Parquet records.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2table",
    version,
    about = "Extract text from PDF files into CSV, JSON or Parquet records",
    long_about = "Extract per-page text from PDF documents into tabular (CSV), hierarchical \
(JSON) or columnar (Parquet) records. Pages pdfium cannot read are retried with the pure-Rust \
lopdf engine; unreadable files in a batch are reported without failing the others.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF files. Several files produce one combined artifact.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Write the artifact here. When omitted, CSV and JSON go to stdout and
    /// Parquet is written to <name>.parquet in the current directory.
    #[arg(short, long, env = "PDF2TABLE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format.
    #[arg(long, env = "PDF2TABLE_FORMAT", value_enum, default_value = "csv")]
    format: FormatArg,

    /// Extraction engine policy.
    #[arg(long, env = "PDF2TABLE_METHOD", value_enum, default_value = "auto")]
    method: MethodArg,

    /// Omit the title/author/creation_date/producer columns.
    #[arg(long, env = "PDF2TABLE_NO_METADATA")]
    no_metadata: bool,

    /// Page text only; skips metadata extraction entirely.
    #[arg(long, env = "PDF2TABLE_TEXT_ONLY")]
    text_only: bool,

    /// Pages per chunk (1–500).
    #[arg(long, env = "PDF2TABLE_CHUNK_SIZE", default_value_t = 20)]
    chunk_size: usize,

    /// Documents processed concurrently in a batch.
    #[arg(short, long, env = "PDF2TABLE_WORKERS", default_value_t = 2)]
    workers: usize,

    /// Largest accepted file in MiB.
    #[arg(long, env = "PDF2TABLE_MAX_FILE_MB", default_value_t = 100)]
    max_file_mb: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2TABLE_PASSWORD")]
    password: Option<String>,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Print PDF metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Print metadata as JSON (with --inspect-only).
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2TABLE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TABLE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TABLE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Csv,
    Json,
    Parquet,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Csv => OutputFormat::Csv,
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Parquet => OutputFormat::Parquet,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum MethodArg {
    Auto,
    #[value(alias = "pymupdf")]
    Pdfium,
    #[value(alias = "pypdf")]
    Lopdf,
}

impl From<MethodArg> for ExtractionMethod {
    fn from(v: MethodArg) -> Self {
        match v {
            MethodArg::Auto => ExtractionMethod::Auto,
            MethodArg::Pdfium => ExtractionMethod::Pdfium,
            MethodArg::Lopdf => ExtractionMethod::Lopdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar carries the feedback; library INFO lines would tear it.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let bar = if show_progress {
        new_bar()
    } else {
        ProgressBar::hidden()
    };
    let warnings = Arc::new(CliWarnings {
        bar: bar.clone(),
        count: AtomicUsize::new(0),
    });
    let config = build_config(&cli, warnings.clone())?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for path in &cli.files {
            let meta = inspect(path, &config)
                .await
                .with_context(|| format!("Failed to inspect {}", path.display()))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
                );
            } else {
                println!("File:           {}", path.display());
                println!("Title:          {}", meta.title.as_deref().unwrap_or("-"));
                println!("Author:         {}", meta.author.as_deref().unwrap_or("-"));
                println!(
                    "Creation date:  {}",
                    meta.creation_date.as_deref().unwrap_or("-")
                );
                println!("Producer:       {}", meta.producer.as_deref().unwrap_or("-"));
            }
        }
        return Ok(());
    }

    // ── Submit ───────────────────────────────────────────────────────────
    let options = ExtractionOptions {
        output_format: cli.format.into(),
        extraction_method: cli.method.into(),
        include_metadata: !cli.no_metadata,
        text_only: cli.text_only,
    };

    let mut docs = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        docs.push(
            Document::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        );
    }

    let start = Instant::now();
    let service = ExtractionService::new(config);
    let id = if docs.len() == 1 {
        let doc = docs.remove(0);
        service.submit_document(doc, options).context("Submission rejected")?
    } else {
        service.submit_batch(docs, options).context("Submission rejected")?
    };

    // ── Poll until done ──────────────────────────────────────────────────
    let status = poll(&service, id, &bar).await?;
    bar.finish_and_clear();

    match status {
        TaskStatus::Completed => {}
        TaskStatus::Cancelled => anyhow::bail!("Interrupted"),
        _ => {
            let view = service.status(id)?;
            if !cli.quiet {
                eprintln!("{} {}", red("✘"), view.message);
            }
            let detail = service.registry().get(id)?.error_detail.unwrap_or_default();
            anyhow::bail!("Extraction failed: {detail}");
        }
    }

    // ── Write the artifact ───────────────────────────────────────────────
    let artifact = service.result(id).context("Failed to fetch result")?;
    let destination = match (&cli.output, cli.format) {
        (Some(path), _) => Some(path.clone()),
        (None, FormatArg::Parquet) => Some(PathBuf::from(&artifact.filename)),
        (None, _) => None,
    };

    match &destination {
        Some(path) => artifact
            .write_to(path)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(&artifact.bytes)
                .context("Failed to write to stdout")?;
        }
    }

    if !cli.quiet {
        let degraded = warnings.count.load(Ordering::SeqCst);
        eprintln!(
            "{}  {} file(s)  {}  {}ms{}",
            if degraded == 0 { green("✔") } else { yellow("⚠") },
            cli.files.len(),
            dim(&format!("{} bytes {}", artifact.size(), artifact.format)),
            start.elapsed().as_millis(),
            match &destination {
                Some(path) => format!("  →  {}", bold(&path.display().to_string())),
                None => String::new(),
            },
        );
        if degraded > 0 {
            eprintln!("   {} degraded page(s)", yellow(&degraded.to_string()));
        }
    }

    Ok(())
}

/// Poll the task into the bar; Ctrl-C cancels it.
async fn poll(service: &ExtractionService, id: TaskId, bar: &ProgressBar) -> Result<TaskStatus> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let view = service.status(id)?;
        bar.set_position(view.progress as u64);
        bar.set_message(view.message.clone());
        if view.status.is_terminal() {
            return Ok(view.status);
        }

        tokio::select! {
            _ = &mut ctrl_c => {
                bar.println(format!("{} cancelling…", yellow("⚠")));
                service.cancel(id);
            }
            _ = tokio::time::sleep(POLL) => {}
        }
    }
}

fn new_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  \
         ⏱ {elapsed_precise}  {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS);
    bar.set_style(style);
    bar.set_prefix("Extracting");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Map CLI args to `ProcessingConfig`.
fn build_config(cli: &Cli, warnings: Arc<CliWarnings>) -> Result<ProcessingConfig> {
    let mut builder = ProcessingConfig::builder()
        .chunk_size(cli.chunk_size)
        .workers(cli.workers)
        .max_file_size(cli.max_file_mb.saturating_mul(1024 * 1024))
        .max_batch_files(cli.files.len().max(1))
        .progress_callback(warnings);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(lib.clone());
    }

    builder.build().context("Invalid configuration")
}
