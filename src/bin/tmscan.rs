//! CLI binary for trademark-scan.
//!
//! A thin shim over the library crate: maps flags onto `ScanConfig`, keeps
//! job/library state in a JSON snapshot between invocations, and prints
//! results.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use trademark_scan::import;
use trademark_scan::scan::pause_job;
use trademark_scan::store::blob::is_url;
use trademark_scan::store::{
    BlobStore, DetectionStore, FsBlobStore, HttpBlobStore, JobStore, LibraryStore, MemoryStore,
    StoreResult,
};
use trademark_scan::{
    run_matching, JobStatus, LibraryBrand, MatchContext, ProgressCallback, ScanConfig,
    ScanProgressCallback, ScanReport, ScanRunner,
};

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per page. Pages inside a batch finish
/// out of order; the bar only counts.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Fetching PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Scanning");
        self.bar.reset_eta();
    }
}

impl ScanProgressCallback for CliProgressCallback {
    fn on_scan_start(&self, job_id: &str, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {} {}",
            cyan("◆"),
            bold(&format!("Scanning {total_pages} pages")),
            dim(&format!("(job {job_id})"))
        ));
    }

    fn on_batch_start(&self, batch: usize, total_batches: usize, first: usize, last: usize) {
        self.bar
            .set_message(format!("batch {batch}/{total_batches} (pages {first}–{last})"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, brand: Option<&str>) {
        let label = match brand {
            Some(name) => bold(name),
            None => dim("no brand"),
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total,
            label
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_scan_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} pages scanned successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages scanned  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

// ── Blob routing ─────────────────────────────────────────────────────────────

/// URLs go over HTTP; everything else is a path under `--blob-root`.
struct RoutingBlobStore {
    fs: FsBlobStore,
    http: HttpBlobStore,
}

#[async_trait]
impl BlobStore for RoutingBlobStore {
    async fn download(&self, storage_ref: &str) -> StoreResult<Vec<u8>> {
        if is_url(storage_ref) {
            self.http.download(storage_ref).await
        } else {
            self.fs.download(storage_ref).await
        }
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # Scan a bulletin (path relative to --blob-root, default: current dir)
  tmscan scan bulletins/2024-03.pdf --logo-dir logos

  # Scan straight from a URL
  tmscan scan https://example.org/gazette/2024-03.pdf

  # Re-run a failed or paused job
  tmscan run 6f1c…

  # Load the reference library, then match a job against it
  tmscan library import registre.xlsx
  tmscan match 6f1c… --threshold 80

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider, gemini-2.5-flash)
  TMSCAN_LLM_PROVIDER     Override provider (gemini, openai, anthropic, ollama)
  TMSCAN_MODEL            Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                tracing filter, overrides --verbose/--quiet
"#;

/// Extract trademarks from registry PDFs and match them against a brand library.
#[derive(Parser, Debug)]
#[command(
    name = "tmscan",
    version,
    about = "Extract trademarks from registry PDFs and match them against a brand library",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JSON snapshot holding jobs, detections, matches and the library.
    #[arg(long, global = true, env = "TMSCAN_STORE", default_value = "tmscan-state.json")]
    store: PathBuf,

    /// Directory that relative storage refs resolve against.
    #[arg(long, global = true, env = "TMSCAN_BLOB_ROOT", default_value = ".")]
    blob_root: PathBuf,

    /// Print JSON instead of tables.
    #[arg(long, global = true, env = "TMSCAN_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "TMSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TMSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TMSCAN_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a job for a PDF and run it.
    Scan {
        /// PDF path (under --blob-root) or HTTP/HTTPS URL.
        pdf: String,
        #[command(flatten)]
        opts: ScanArgs,
    },
    /// Re-run a queued, paused or failed job from page 1.
    Run {
        job_id: String,
        #[command(flatten)]
        opts: ScanArgs,
    },
    /// Pause a processing job.
    Pause { job_id: String },
    /// List jobs.
    Jobs,
    /// List brands detected for a job.
    Brands { job_id: String },
    /// Match a job's detected brands against the library.
    Match {
        job_id: String,
        /// Minimum fuzzy similarity (0–100).
        #[arg(long, env = "TMSCAN_THRESHOLD", default_value_t = trademark_scan::DEFAULT_THRESHOLD,
              value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: u8,
    },
    /// Manage the reference brand library.
    #[command(subcommand)]
    Library(LibraryCommand),
}

#[derive(Subcommand, Debug)]
enum LibraryCommand {
    /// Import brands from a spreadsheet (xlsx, xls, ods) or a JSON array
    /// of names or objects.
    Import { file: PathBuf },
    /// List library brands.
    List,
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Vision model ID (e.g. gemini-2.5-flash).
    #[arg(long, env = "TMSCAN_MODEL")]
    model: Option<String>,

    /// Provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "TMSCAN_PROVIDER")]
    provider: Option<String>,

    /// Pages per batch; pages inside a batch run concurrently.
    #[arg(short, long, env = "TMSCAN_BATCH_SIZE", default_value_t = 10)]
    batch_size: usize,

    /// Rendering DPI (72–400).
    #[arg(long, env = "TMSCAN_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Max model output tokens per page.
    #[arg(long, env = "TMSCAN_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "TMSCAN_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "TMSCAN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Per-page timeout in seconds (0 disables).
    #[arg(long, env = "TMSCAN_PAGE_TIMEOUT", default_value_t = 120)]
    page_timeout: u64,

    /// Source download timeout in seconds.
    #[arg(long, env = "TMSCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Write cropped logos here.
    #[arg(long, env = "TMSCAN_LOGO_DIR")]
    logo_dir: Option<PathBuf>,

    /// Parent directory for per-run temp dirs.
    #[arg(long, env = "TMSCAN_WORK_DIR")]
    work_dir: Option<PathBuf>,
}

/// One library import entry: a bare name or an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportRow {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        registration_number: Option<String>,
        #[serde(default)]
        nice_class: Option<String>,
        #[serde(default)]
        filing_date: Option<String>,
        #[serde(default)]
        expiry_date: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
}

impl From<ImportRow> for LibraryBrand {
    fn from(row: ImportRow) -> Self {
        match row {
            ImportRow::Name(name) => LibraryBrand::new(name.trim()),
            ImportRow::Full {
                name,
                registration_number,
                nice_class,
                filing_date,
                expiry_date,
                status,
            } => LibraryBrand {
                registration_number,
                nice_class,
                filing_date,
                expiry_date,
                status,
                ..LibraryBrand::new(name.trim())
            },
        }
    }
}

// ── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while a scan is running.
    let scanning = matches!(cli.command, Command::Scan { .. } | Command::Run { .. });
    let show_progress = scanning && !cli.quiet && !cli.no_progress && !cli.json;
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

    let store = Arc::new(
        MemoryStore::load(&cli.store)
            .await
            .with_context(|| format!("Failed to load state from {}", cli.store.display()))?,
    );

    let result = dispatch(&cli, &store, show_progress).await;

    // State is saved even when the command failed: a failed run still
    // records its job status.
    store
        .save(&cli.store)
        .await
        .with_context(|| format!("Failed to save state to {}", cli.store.display()))?;

    result
}

async fn dispatch(cli: &Cli, store: &Arc<MemoryStore>, show_progress: bool) -> Result<()> {
    match &cli.command {
        Command::Scan { pdf, opts } => {
            let runner = build_runner(cli, store, opts, show_progress).await?;
            let storage_ref = storage_ref_for(pdf, &cli.blob_root)?;
            let filename = file_name_of(pdf);
            let job = runner
                .create_job(filename, storage_ref)
                .await
                .context("Failed to create job")?;
            let report = runner.run_job(&job.id).await.context("Scan failed")?;
            print_report(cli, &report)
        }
        Command::Run { job_id, opts } => {
            let runner = build_runner(cli, store, opts, show_progress).await?;
            let report = runner.run_job(job_id).await.context("Scan failed")?;
            print_report(cli, &report)
        }
        Command::Pause { job_id } => {
            let job = pause_job(store.as_ref(), job_id)
                .await
                .context("Pause failed")?;
            if !cli.quiet {
                eprintln!("{} job {} is {}", green("✔"), job.id, job.status);
            }
            Ok(())
        }
        Command::Jobs => {
            let jobs = JobStore::list(store.as_ref()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
                return Ok(());
            }
            for job in jobs {
                println!(
                    "{}  {:<10}  {:>4}/{:<4}  {}{}",
                    job.id,
                    job.status,
                    job.progress_pages,
                    job.total_pages,
                    job.filename,
                    job.last_error
                        .map(|e| format!("  {}", red(&e)))
                        .unwrap_or_default()
                );
            }
            Ok(())
        }
        Command::Brands { job_id } => {
            let brands = DetectionStore::list_for_job(store.as_ref(), job_id).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&brands)?);
                return Ok(());
            }
            for b in brands {
                let pages: Vec<String> = b.source_pages.iter().map(|p| p.to_string()).collect();
                println!(
                    "p{:<5} {:<30} {:<16} {}",
                    pages.join(","),
                    b.name,
                    b.application_number.unwrap_or_default(),
                    dim(&b.nice_classes.join(","))
                );
            }
            Ok(())
        }
        Command::Match { job_id, threshold } => {
            let ctx = MatchContext {
                jobs: store.as_ref(),
                library: store.as_ref(),
                detections: store.as_ref(),
                matches: store.as_ref(),
            };
            let matches = run_matching(&ctx, job_id, *threshold)
                .await
                .context("Matching failed")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&matches)?);
                return Ok(());
            }
            for m in &matches {
                println!(
                    "{:>3}%  {:<6}  {:<30} ≈ {}",
                    m.similarity, m.match_type, m.detected_brand_name, m.library_brand_name
                );
            }
            if !cli.quiet {
                eprintln!("{} {} matches", cyan("◆"), matches.len());
            }
            Ok(())
        }
        Command::Library(LibraryCommand::Import { file }) => {
            let brands: Vec<LibraryBrand> = if import::is_spreadsheet(file) {
                let path = file.clone();
                tokio::task::spawn_blocking(move || import::read_spreadsheet(&path))
                    .await
                    .context("Spreadsheet reader panicked")??
            } else {
                let raw = tokio::fs::read_to_string(file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let rows: Vec<ImportRow> = serde_json::from_str(&raw).with_context(|| {
                    format!("{} is not a JSON array of brands", file.display())
                })?;
                rows.into_iter().map(LibraryBrand::from).collect()
            };
            let total = brands.len();
            let inserted = store.add_library_brands(brands).await;
            if !cli.quiet {
                eprintln!(
                    "{} imported {} of {} brands ({} duplicates skipped)",
                    green("✔"),
                    inserted,
                    total,
                    total - inserted
                );
            }
            Ok(())
        }
        Command::Library(LibraryCommand::List) => {
            let brands = LibraryStore::list(store.as_ref()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&brands)?);
                return Ok(());
            }
            for b in brands {
                println!(
                    "{:<30} {:<16} {}",
                    b.name,
                    b.registration_number.unwrap_or_default(),
                    dim(&b.nice_class.unwrap_or_default())
                );
            }
            Ok(())
        }
    }
}

/// Map CLI args to a runner.
async fn build_runner(
    cli: &Cli,
    store: &Arc<MemoryStore>,
    opts: &ScanArgs,
    show_progress: bool,
) -> Result<ScanRunner> {
    let system_prompt = match &opts.system_prompt {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        ),
        None => None,
    };

    let mut builder = ScanConfig::builder()
        .batch_size(opts.batch_size)
        .dpi(opts.dpi)
        .max_tokens(opts.max_tokens)
        .temperature(opts.temperature)
        .page_timeout_secs(opts.page_timeout)
        .download_timeout_secs(opts.download_timeout);

    if let Some(ref model) = opts.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = opts.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref dir) = opts.logo_dir {
        builder = builder.logo_dir(dir);
    }
    if let Some(ref dir) = opts.work_dir {
        builder = builder.work_dir(dir);
    }
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new_dynamic();
        builder = builder.progress_callback(cb);
    }

    let config = builder.build().context("Invalid configuration")?;

    let blobs = Arc::new(RoutingBlobStore {
        fs: FsBlobStore::new(&cli.blob_root),
        http: HttpBlobStore::new(None, opts.download_timeout)
            .context("Failed to build HTTP client")?,
    });

    ScanRunner::from_config(store.clone(), store.clone(), blobs, config)
        .context("Failed to initialise scanner")
}

/// Storage ref for `pdf`: URLs pass through, local paths become relative to
/// `blob_root`.
fn storage_ref_for(pdf: &str, blob_root: &Path) -> Result<String> {
    if is_url(pdf) {
        return Ok(pdf.to_string());
    }
    let root = blob_root
        .canonicalize()
        .with_context(|| format!("Blob root {} does not exist", blob_root.display()))?;
    let file = Path::new(pdf)
        .canonicalize()
        .with_context(|| format!("PDF not found: {pdf}"))?;
    let rel = file.strip_prefix(&root).with_context(|| {
        format!(
            "{} is outside the blob root {}; pass --blob-root",
            file.display(),
            root.display()
        )
    })?;
    Ok(rel.to_string_lossy().into_owned())
}

fn file_name_of(pdf: &str) -> String {
    pdf.rsplit(['/', '\\'])
        .find(|s| !s.is_empty())
        .unwrap_or(pdf)
        .to_string()
}

fn print_report(cli: &Cli, report: &ScanReport) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else if !cli.quiet {
        eprintln!(
            "{}  job {}  {}  {}/{} pages  {} brands  {}ms",
            if report.status == JobStatus::Completed {
                green("✔")
            } else {
                red("✘")
            },
            report.job_id,
            bold(report.status.as_str()),
            report.succeeded,
            report.total_pages,
            report.brands_detected,
            report.duration_ms
        );
        if report.rate_limited {
            eprintln!(
                "   {}",
                cyan("Vision API quota exceeded on some pages. Re-run the job later with `tmscan run`.")
            );
        }
    }

    if report.status == JobStatus::Failed {
        bail!(
            "Job {} failed: {}",
            report.job_id,
            report.last_error.as_deref().unwrap_or("no page succeeded")
        );
    }
    Ok(())
}
