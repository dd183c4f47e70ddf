//! Configuration types for batch PDF-to-Markdown processing.
//!
//! All run behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across workers, serialise them for logging, and diff two
//! runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::BatchError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for one batch run.
///
/// Built via [`BatchConfig::builder()`] or read from the process environment
/// with [`BatchConfig::from_env()`].
///
/// # Example
/// ```rust
/// use mineru_batch::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .input_dir("articles")
///     .output_dir("articles/processed")
///     .api_key("mineru-token")
///     .max_workers(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Directory scanned (non-recursively) for `*.pdf` inputs.
    pub input_dir: PathBuf,

    /// Root of the produced artifact tree: `md/`, `imgs/`, `summaries/`.
    pub output_dir: PathBuf,

    /// Path of the durable CSV status table. Default:
    /// `<output_dir>/.pdf_processing_status.csv`.
    pub status_file: PathBuf,

    /// Bearer token for the MinerU extraction API.
    pub api_key: String,

    /// Base URL of the extraction API. Default: `https://mineru.net/api/v4`.
    /// Overridable for self-hosted deployments.
    pub api_base_url: String,

    /// OCR language hint passed to the extraction service. Default: "ch".
    pub language: String,

    /// Ask the service to recognise formulas. Default: false.
    pub enable_formula: bool,

    /// Ask the service to extract tables. Default: true.
    pub enable_table: bool,

    /// Force OCR on every page. Default: true.
    pub is_ocr: bool,

    /// Size of the bounded worker pool. Default: 5.
    ///
    /// Each worker runs one file's full pipeline (validity check, remote job,
    /// summarization, status persist). The remote job is network-bound, so a
    /// handful of workers cuts wall-clock time near-linearly until the
    /// service starts queueing submissions.
    pub max_workers: usize,

    /// Dispatch across the worker pool when more than one file is queued.
    /// When false the batch runs strictly sequentially. Default: true.
    pub parallel: bool,

    /// Retry attempts for the upload-slot, upload, and download steps.
    /// Default: 4.
    ///
    /// The poll loop is excluded: a `failed` job state is terminal, and
    /// network blips while polling only count toward the job timeout.
    pub max_retries: u32,

    /// Initial retry delay (exponential backoff, doubling). Default: 5s.
    pub retry_base_delay: Duration,

    /// Interval between job-status polls. Default: 10s.
    pub poll_interval: Duration,

    /// Wall-clock budget for one remote job, measured from submission
    /// acknowledgement to the `done` state. Default: 300s.
    pub job_timeout: Duration,

    /// Per-request timeout for individual HTTP calls. Default: 180s.
    pub request_timeout: Duration,

    /// Generate structured summaries for files whose summary is missing or
    /// stale. Requires a summarizer credential; without one, summaries are
    /// skipped and the file still counts as processed. Default: true.
    pub summarize: bool,

    /// Optional per-file progress events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        let output_dir = PathBuf::from("articles/processed");
        Self {
            input_dir: PathBuf::from("articles"),
            status_file: output_dir.join(".pdf_processing_status.csv"),
            output_dir,
            api_key: String::new(),
            api_base_url: "https://mineru.net/api/v4".to_string(),
            language: "ch".to_string(),
            enable_formula: false,
            enable_table: true,
            is_ocr: true,
            max_workers: 5,
            parallel: true,
            max_retries: 4,
            retry_base_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            job_timeout: Duration::from_secs(300),
            request_timeout: Duration::from_secs(180),
            summarize: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir)
            .field("status_file", &self.status_file)
            .field("api_key", &"<redacted>")
            .field("api_base_url", &self.api_base_url)
            .field("language", &self.language)
            .field("enable_formula", &self.enable_formula)
            .field("enable_table", &self.enable_table)
            .field("is_ocr", &self.is_ocr)
            .field("max_workers", &self.max_workers)
            .field("parallel", &self.parallel)
            .field("max_retries", &self.max_retries)
            .field("poll_interval", &self.poll_interval)
            .field("job_timeout", &self.job_timeout)
            .field("summarize", &self.summarize)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn callback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
            status_file_set: false,
        }
    }

    /// Build a config from the process environment.
    ///
    /// Recognised variables: `PDF_DIR`, `OUTPUT_DIR`, `STATUS_FILE`,
    /// `MINERU_API_KEY`, `MINERU_API_BASE`, `PDF_MAX_WORKERS`,
    /// `PDF_ENABLE_PARALLEL`. Unset variables fall back to the defaults.
    pub fn from_env() -> Result<Self, BatchError> {
        let mut builder = Self::builder();

        if let Ok(dir) = std::env::var("PDF_DIR") {
            builder = builder.input_dir(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            builder = builder.output_dir(dir);
        }
        if let Ok(path) = std::env::var("STATUS_FILE") {
            builder = builder.status_file(path);
        }
        if let Ok(key) = std::env::var("MINERU_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Ok(base) = std::env::var("MINERU_API_BASE") {
            builder = builder.api_base_url(base);
        }
        if let Ok(n) = std::env::var("PDF_MAX_WORKERS") {
            let n: usize = n.parse().map_err(|_| {
                BatchError::InvalidConfig(format!("PDF_MAX_WORKERS must be a number, got '{n}'"))
            })?;
            builder = builder.max_workers(n);
        }
        if let Ok(v) = std::env::var("PDF_ENABLE_PARALLEL") {
            builder = builder.parallel(v.trim().eq_ignore_ascii_case("true"));
        }

        builder.build()
    }

    /// The derived artifact layout under [`Self::output_dir`].
    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(&self.output_dir)
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
    status_file_set: bool,
}

impl BatchConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn status_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.status_file = path.into();
        self.status_file_set = true;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn enable_formula(mut self, v: bool) -> Self {
        self.config.enable_formula = v;
        self
    }

    pub fn enable_table(mut self, v: bool) -> Self {
        self.config.enable_table = v;
        self
    }

    pub fn is_ocr(mut self, v: bool) -> Self {
        self.config.is_ocr = v;
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n.max(1);
        self
    }

    pub fn parallel(mut self, v: bool) -> Self {
        self.config.parallel = v;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_base_delay(mut self, d: Duration) -> Self {
        self.config.retry_base_delay = d;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.config.poll_interval = d;
        self
    }

    pub fn job_timeout(mut self, d: Duration) -> Self {
        self.config.job_timeout = d;
        self
    }

    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.config.request_timeout = d;
        self
    }

    pub fn summarize(mut self, v: bool) -> Self {
        self.config.summarize = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// An unset status file defaults to `<output_dir>/.pdf_processing_status.csv`
    /// so the table travels with the artifacts it describes.
    pub fn build(mut self) -> Result<BatchConfig, BatchError> {
        if !self.status_file_set {
            self.config.status_file = self.config.output_dir.join(".pdf_processing_status.csv");
        }
        let c = &self.config;
        if c.max_workers == 0 {
            return Err(BatchError::InvalidConfig("max_workers must be ≥ 1".into()));
        }
        if c.poll_interval.is_zero() {
            return Err(BatchError::InvalidConfig(
                "poll_interval must be non-zero".into(),
            ));
        }
        if c.api_base_url.is_empty() {
            return Err(BatchError::InvalidConfig("api_base_url is empty".into()));
        }
        if c.api_key.trim().is_empty() {
            return Err(BatchError::InvalidConfig(
                "api_key is empty; set MINERU_API_KEY or use .api_key(...)".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Output layout ────────────────────────────────────────────────────────

/// Deterministic mapping from a PDF's base name to its artifact paths.
///
/// Every component that needs to find an artifact — the validity checker
/// before a run, the conversion client when writing, the summarizer when
/// saving — derives paths through this one type, so a layout change cannot
/// desynchronise producers and consumers.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    output_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Root of the artifact tree.
    pub fn root(&self) -> &Path {
        &self.output_dir
    }

    /// `<output_dir>/md/<stem>.md`
    pub fn md_path(&self, stem: &str) -> PathBuf {
        self.output_dir.join("md").join(format!("{stem}.md"))
    }

    /// `<output_dir>/imgs/<stem>/`
    pub fn images_dir(&self, stem: &str) -> PathBuf {
        self.output_dir.join("imgs").join(stem)
    }

    /// `<output_dir>/summaries/<stem>.json`
    pub fn summary_path(&self, stem: &str) -> PathBuf {
        self.output_dir
            .join("summaries")
            .join(format!("{stem}.json"))
    }
}

/// The base name of a PDF path, used as the stable artifact key.
pub fn pdf_stem(pdf_path: &Path) -> String {
    pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
