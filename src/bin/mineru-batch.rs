//! CLI binary for mineru-batch.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! runs the batch, and prints the report.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mineru_batch::{
    BatchConfig, BatchOrchestrator, BatchProgressCallback, ProcessingResult, ProgressCallback,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar across the whole batch, with a log
/// line per completed file. Files may complete out of order in parallel
/// mode; the bar only counts completions, so ordering does not matter.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} PDF file(s)…"))
        ));
    }

    fn on_file_start(&self, filename: &str) {
        self.bar.set_message(filename.to_string());
    }

    fn on_file_complete(&self, result: &ProcessingResult) {
        let line = result.status_line();
        let line = if !result.md_converted {
            red(&line)
        } else if result.md_file_reused {
            dim(&line)
        } else {
            green(&line)
        };
        self.bar.println(format!("  {line}"));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, converted: usize) {
        self.bar.finish_and_clear();
        let failed = total_files.saturating_sub(converted);
        if failed == 0 {
            eprintln!(
                "{} {} file(s) ready",
                green("✔"),
                bold(&converted.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} file(s) ready  ({} failed)",
                if converted == 0 { red("✘") } else { cyan("⚠") },
                bold(&converted.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process ./articles into ./articles/processed
  mineru-batch

  # Explicit directories
  mineru-batch --input-dir papers --output-dir papers/out

  # Sequential, no summaries
  mineru-batch --sequential --no-summaries

  # Re-run after an interruption: valid files are skipped automatically
  mineru-batch

  # Larger worker pool, longer job budget for big documents
  mineru-batch --max-workers 8 --job-timeout 600

OUTPUT LAYOUT:
  <output-dir>/md/<name>.md                  converted Markdown
  <output-dir>/imgs/<name>/                  extracted images
  <output-dir>/summaries/<name>.json         structured summary
  <output-dir>/.pdf_processing_status.csv    durable per-file status table

ENVIRONMENT VARIABLES:
  MINERU_API_KEY         MinerU extraction API token (required)
  MINERU_API_BASE        Override the extraction API base URL
  PDF_DIR                Default input directory
  OUTPUT_DIR             Default output directory
  STATUS_FILE            Default status table path
  PDF_MAX_WORKERS        Default worker pool size
  PDF_ENABLE_PARALLEL    "true"/"false", default true
  ANTHROPIC_AUTH_TOKEN   Summarizer credential (preferred)
  ANTHROPIC_API_KEY      Summarizer credential (fallback)
  ANTHROPIC_BASE_URL     Override the summarizer API base URL
  ANTHROPIC_MODEL        Override the summarizer model

EXIT STATUS:
  0  batch completed (individual file failures are reported, not fatal)
  1  fatal error: missing input directory, invalid configuration
"#;

/// Batch-convert PDF documents to Markdown via the MinerU API.
#[derive(Parser, Debug)]
#[command(
    name = "mineru-batch",
    version,
    about = "Batch-convert PDF documents to Markdown via the MinerU API",
    long_about = "Convert every PDF in a directory to Markdown using the MinerU extraction \
API, with optional structured summaries from a language model. Runs are resumable: files whose \
output already exists and passes validation are skipped, so interrupting and re-running a \
batch never repeats finished work.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory scanned for *.pdf files (non-recursive).
    #[arg(short, long, env = "PDF_DIR", default_value = "articles")]
    input_dir: PathBuf,

    /// Root directory for md/, imgs/, and summaries/.
    #[arg(short, long, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Path of the CSV status table. Default: <output-dir>/.pdf_processing_status.csv.
    #[arg(long, env = "STATUS_FILE")]
    status_file: Option<PathBuf>,

    /// MinerU API token.
    #[arg(long, env = "MINERU_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Extraction API base URL.
    #[arg(long, env = "MINERU_API_BASE", default_value = "https://mineru.net/api/v4")]
    api_base: String,

    /// OCR language hint sent to the extraction service.
    #[arg(long, default_value = "ch")]
    language: String,

    /// Enable formula recognition.
    #[arg(long)]
    formulas: bool,

    /// Disable table extraction.
    #[arg(long)]
    no_tables: bool,

    /// Worker pool size for parallel processing.
    #[arg(short = 'w', long, env = "PDF_MAX_WORKERS", default_value_t = 5)]
    max_workers: usize,

    /// Process files one at a time instead of in parallel.
    #[arg(long)]
    sequential: bool,

    /// Retries for the upload and download steps.
    #[arg(long, default_value_t = 4)]
    max_retries: u32,

    /// Seconds between job-status polls.
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// Wall-clock budget in seconds for one remote conversion job.
    #[arg(long, default_value_t = 300)]
    job_timeout: u64,

    /// Skip summary generation entirely.
    #[arg(long)]
    no_summaries: bool,

    /// Print the report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors and the final report.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar is the primary feedback channel; suppress INFO noise
    // while it is active unless the user explicitly asked for logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| cli.input_dir.join("processed"));

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let mut builder = BatchConfig::builder()
        .input_dir(&cli.input_dir)
        .output_dir(&output_dir)
        .api_key(&cli.api_key)
        .api_base_url(&cli.api_base)
        .language(&cli.language)
        .enable_formula(cli.formulas)
        .enable_table(!cli.no_tables)
        .max_workers(cli.max_workers)
        .parallel(!cli.sequential)
        .max_retries(cli.max_retries)
        .poll_interval(Duration::from_secs(cli.poll_interval))
        .job_timeout(Duration::from_secs(cli.job_timeout))
        .summarize(!cli.no_summaries);
    if let Some(status_file) = &cli.status_file {
        builder = builder.status_file(status_file);
    }
    if let Some(cb) = progress_cb {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run batch ────────────────────────────────────────────────────────
    let orchestrator = BatchOrchestrator::new(config).context("Failed to initialize")?;
    let report = orchestrator.run().await.context("Batch failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else if !cli.quiet {
        println!("{report}");
        println!(
            "{}",
            dim(&format!(
                "Status table: {}",
                orchestrator.status().path().display()
            ))
        );
    }

    Ok(())
}
