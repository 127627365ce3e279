//! CLI binary for edgequake-pdf2csv.
//!
//! `pdf2csv serve` runs the HTTP upload service; `pdf2csv extract` pushes
//! local files through the same pipeline and writes the results next to
//! each other in an output directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_pdf2csv::server::{router, AppState};
use edgequake_pdf2csv::{
    HeaderPolicy, JobProgressCallback, JobStatus, PdfiumTableExtractor, ProgressCallback,
    Retrieval, ServiceConfig, TableExtractor, Upload,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback ────────────────────────────────────────────────────

/// Prints one line per accepted file so long batches show signs of life.
struct CliProgressCallback;

impl JobProgressCallback for CliProgressCallback {
    fn on_job_accepted(&self, job_id: &str, filename: &str) {
        eprintln!("{} {}  {}", cyan("◆"), bold(filename), dim(job_id));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the upload service on port 5000
  pdf2csv serve

  # Bind elsewhere and keep results under /var/lib/pdf2csv
  pdf2csv --storage-dir /var/lib/pdf2csv serve --bind 127.0.0.1:8080

  # Extract tables from local files into ./tables
  pdf2csv extract report.pdf annex.pdf -o tables

  # Semicolon-separated output, first row always a header
  pdf2csv --delimiter ';' --header-policy first-row extract report.pdf

HTTP API:
  POST   /              multipart field "files" (repeatable) → {"data":[{"uid","file_name"}]}
  GET    /{uid}         table_1.csv, tables.zip, {"message":"No tables found"}, or 202
  GET    /{uid}/status  job record as JSON
  DELETE /{uid}         forget a finished job

ENVIRONMENT VARIABLES:
  PDF2CSV_*               Every flag, e.g. PDF2CSV_CONCURRENCY=8
  PDFIUM_LIB_PATH         Path to an existing libpdfium; skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Override the log filter

  PDFium (~30 MB) is downloaded automatically on first run and cached.
"#;

/// Extract tables from PDF uploads into CSV files.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2csv",
    version,
    about = "Extract tables from PDF documents into CSV files",
    long_about = "Extract tables from PDF documents into CSV files. Runs either as an HTTP \
upload service (uploads return an identifier, results are fetched later) or as a one-shot \
command over local files.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory under which each job's results are stored.
    #[arg(long, global = true, env = "PDF2CSV_STORAGE_DIR", default_value = "uploads/csv")]
    storage_dir: PathBuf,

    /// Number of documents extracted at the same time.
    #[arg(short, long, global = true, env = "PDF2CSV_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-document extraction timeout in seconds.
    #[arg(long, global = true, env = "PDF2CSV_EXTRACTION_TIMEOUT", default_value_t = 120)]
    extraction_timeout: u64,

    /// Seconds a retrieval waits for a running job before answering 202.
    #[arg(long, global = true, env = "PDF2CSV_RETRIEVAL_WAIT", default_value_t = 30)]
    retrieval_wait: u64,

    /// Maximum number of files per upload.
    #[arg(long, global = true, env = "PDF2CSV_MAX_FILES", default_value_t = 32)]
    max_files: usize,

    /// Maximum upload request size in MiB.
    #[arg(long, global = true, env = "PDF2CSV_MAX_UPLOAD_MB", default_value_t = 100)]
    max_upload_mb: usize,

    /// CSV field delimiter (a single ASCII character).
    #[arg(long, global = true, env = "PDF2CSV_DELIMITER", default_value_t = ',')]
    delimiter: char,

    /// How table headers are decided: extractor, first-row, no-header.
    #[arg(
        long,
        global = true,
        env = "PDF2CSV_HEADER_POLICY",
        value_enum,
        default_value = "extractor"
    )]
    header_policy: HeaderPolicyArg,

    /// Trim cells and strip invisible characters; table shapes are unchanged.
    #[arg(long, global = true, env = "PDF2CSV_CLEAN")]
    clean: bool,

    /// Path to an existing libpdfium instead of the auto-downloaded copy.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2CSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2CSV_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP upload service.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "PDF2CSV_BIND", default_value = "0.0.0.0:5000")]
        bind: SocketAddr,
    },
    /// Extract tables from local PDF files.
    Extract {
        /// PDF files to process.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Directory the CSV / zip results are written to.
        #[arg(short, long, env = "PDF2CSV_OUTPUT_DIR", default_value = ".")]
        output: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum HeaderPolicyArg {
    Extractor,
    FirstRow,
    NoHeader,
}

impl From<HeaderPolicyArg> for HeaderPolicy {
    fn from(v: HeaderPolicyArg) -> Self {
        match v {
            HeaderPolicyArg::Extractor => HeaderPolicy::Extractor,
            HeaderPolicyArg::FirstRow => HeaderPolicy::FirstRow,
            HeaderPolicyArg::NoHeader => HeaderPolicy::NoHeader,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // `extract` prints its own per-file summary, so library INFO logs would
    // only repeat it.
    let serving = matches!(cli.command, Command::Serve { .. });
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if serving {
        "info"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let extractor = resolve_extractor(&cli)?;
    let progress: Option<ProgressCallback> = if !serving && !cli.quiet {
        Some(Arc::new(CliProgressCallback))
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    match &cli.command {
        Command::Serve { bind } => serve(config, extractor, *bind).await,
        Command::Extract { files, output } => {
            extract(config, extractor, files, output, cli.quiet).await
        }
    }
}

/// Make sure a pdfium library is available before any job needs it.
///
/// On the very first run the library (~30 MB) is downloaded from
/// bblanchon/pdfium-binaries into the pdfium-auto cache. Later startups only
/// check the cached path.
fn resolve_extractor(cli: &Cli) -> Result<Arc<dyn TableExtractor>> {
    if let Some(ref path) = cli.pdfium_lib {
        return Ok(Arc::new(PdfiumTableExtractor::with_library(path)));
    }

    let fresh_download = !pdfium_auto::is_pdfium_cached();
    if fresh_download && !cli.quiet {
        eprintln!("{} {}", cyan("◆"), bold("Downloading PDF engine…"));
    }

    let quiet = cli.quiet;
    // block_in_place keeps the progress closure borrowable while the
    // blocking download runs off the async executor's hot path.
    let lib_path = tokio::task::block_in_place(|| {
        let report = |downloaded: u64, total: Option<u64>| {
            if quiet {
                return;
            }
            if let Some(t) = total.filter(|t| *t > 0) {
                eprint!("\r  {}", dim(&format!("{:>3}%", downloaded * 100 / t)));
            }
        };
        pdfium_auto::ensure_pdfium_library(Some(&report))
    })
    .context("Failed to download PDFium engine")?;

    if fresh_download && !cli.quiet {
        eprintln!("\r  {} {}", green("✓"), dim(&lib_path.display().to_string()));
    }
    Ok(Arc::new(PdfiumTableExtractor::with_library(lib_path)))
}

/// Map CLI args to `ServiceConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ServiceConfig> {
    let delimiter = u8::try_from(cli.delimiter)
        .with_context(|| format!("Delimiter {:?} is not a single-byte character", cli.delimiter))?;

    let mut builder = ServiceConfig::builder()
        .storage_dir(&cli.storage_dir)
        .concurrency(cli.concurrency)
        .extraction_timeout_secs(cli.extraction_timeout)
        .retrieval_wait_secs(cli.retrieval_wait)
        .max_files_per_batch(cli.max_files)
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024))
        .delimiter(delimiter)
        .header_policy(cli.header_policy.clone().into())
        .clean_cells(cli.clean);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn serve(
    config: ServiceConfig,
    extractor: Arc<dyn TableExtractor>,
    bind: SocketAddr,
) -> Result<()> {
    let storage = config.storage_dir.clone();
    let state = AppState::new(config, extractor)
        .with_context(|| format!("Failed to prepare storage at {}", storage.display()))?;
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    info!("Listening on http://{}", bind);
    info!("Storing results under {}", storage.display());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn extract(
    config: ServiceConfig,
    extractor: Arc<dyn TableExtractor>,
    files: &[PathBuf],
    output: &Path,
    quiet: bool,
) -> Result<()> {
    let start = Instant::now();
    let state = AppState::new(config, extractor).context("Failed to prepare storage")?;
    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        uploads.push(Upload::new(name, bytes));
    }

    let handles = state
        .orchestrator
        .submit(uploads)
        .await
        .context("Upload rejected")?;
    let total = handles.len();

    let mut pending: FuturesUnordered<_> = handles
        .into_iter()
        .map(|handle| async move {
            let id = handle.id().clone();
            let filename = handle.filename().to_string();
            let status = handle.wait().await;
            (id, filename, status)
        })
        .collect();

    let mut failed = 0usize;
    while let Some((id, filename, status)) = pending.next().await {
        match status {
            JobStatus::Failed { reason } => {
                failed += 1;
                eprintln!("  {} {}  {}", red("✗"), filename, red(&reason));
            }
            _ => {
                let line = match state.retrieval.retrieve(id.as_str()).await? {
                    Retrieval::File(file) => {
                        let stem = Path::new(&filename)
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "upload".to_string());
                        let ext = Path::new(&file.filename)
                            .extension()
                            .map(|e| e.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "csv".to_string());
                        let dest = output.join(format!("{id}_{stem}.{ext}"));
                        tokio::fs::write(&dest, &file.bytes)
                            .await
                            .with_context(|| format!("Failed to write {}", dest.display()))?;
                        format!(
                            "  {} {}  →  {}",
                            green("✓"),
                            filename,
                            bold(&dest.display().to_string())
                        )
                    }
                    Retrieval::NoTables { message } => {
                        format!("  {} {}  {}", dim("–"), filename, dim(&message))
                    }
                    Retrieval::Processing { .. } => {
                        format!("  {} {}  still processing", cyan("⚠"), filename)
                    }
                };
                if !quiet {
                    eprintln!("{line}");
                }
            }
        }
    }

    if !quiet {
        eprintln!(
            "{}  {}/{} files  {}ms",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            total - failed,
            total,
            start.elapsed().as_millis()
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} file(s) failed");
    }
    Ok(())
}
