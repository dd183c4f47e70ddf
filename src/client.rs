//! MinerU extraction client: drive one remote PDF-to-Markdown job.
//!
//! The service exposes a fixed three-phase asynchronous job protocol:
//!
//! ```text
//! 1. POST /file-urls/batch          acquire batch_id + pre-signed upload URL
//! 2. PUT  <upload url>              raw PDF bytes, HTTP-status-only success
//! 3. GET  /extract-results/batch/…  poll until done | failed | timeout
//! 4. GET  <full_zip_url>            download archive, unpack artifacts
//! ```
//!
//! ## Retry strategy
//!
//! Phases 1, 2, and 4 are wrapped in exponential backoff
//! (`retry_base_delay * 2^attempt`) for transient network failures.
//! Application-level rejections, an explicit remote `failed` state, and a
//! malformed archive are never retried — they are deterministic and retrying
//! would only repeat paid work. Network errors *during polling* are special:
//! they are logged and polling continues, counting only toward the job's
//! wall-clock timeout, not the retry budget.
//!
//! The job handle (`batch_id`, URLs) is transient protocol state: it is
//! reconstructed per attempt and lost on crash. A restart simply treats the
//! file as not-yet-converted and resubmits.

use crate::config::{pdf_stem, BatchConfig, OutputLayout};
use crate::error::BatchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Progress lines while polling are throttled to this interval.
const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Synthetic filename used by the connection self-test; no upload follows.
const CONNECTION_TEST_FILENAME: &str = "connection_test.pdf";

// ── Conversion seam ──────────────────────────────────────────────────────

/// Locations of the artifacts one conversion produced.
#[derive(Debug, Clone)]
pub struct ConvertedArtifacts {
    pub md_path: PathBuf,
    /// Present only when the result archive carried an images directory.
    pub images_dir: Option<PathBuf>,
}

/// The conversion backend, as the orchestrator sees it.
///
/// [`MinerUClient`] is the production implementation; tests inject stubs to
/// exercise the batch state machine without network access.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Lightweight liveness/credential probe, used to fail fast before
    /// spending a real file's quota. Results are never cached: credentials
    /// may have been rotated between files.
    async fn test_connection(&self) -> bool;

    /// Run the full remote job for one PDF and install its artifacts under
    /// the output layout.
    async fn convert(
        &self,
        pdf_path: &Path,
        layout: &OutputLayout,
    ) -> Result<ConvertedArtifacts, BatchError>;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct UploadSlotRequest {
    enable_formula: bool,
    language: String,
    enable_table: bool,
    files: Vec<FileSpec>,
}

#[derive(Debug, Serialize)]
struct FileSpec {
    name: String,
    is_ocr: bool,
}

/// Envelope shared by every JSON endpoint: `code != 0` is an application
/// error carrying `msg`, distinct from transport failure.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<T, BatchError> {
        if self.code != 0 {
            return Err(BatchError::ApiError {
                code: self.code,
                msg: self.msg.unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        self.data.ok_or(BatchError::ApiError {
            code: 0,
            msg: "response carried no data".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct UploadSlotData {
    batch_id: String,
    file_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct BatchResultData {
    #[serde(default)]
    extract_result: Vec<ExtractResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExtractResult {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub full_zip_url: Option<String>,
    #[serde(default)]
    pub err_msg: Option<String>,
}

/// What one poll observation means for the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PollOutcome {
    /// Job finished; the result archive is at this URL.
    Ready(String),
    /// Remote processing reported failure. Terminal, not retryable.
    Failed(String),
    /// Keep polling. Carries the observed state for progress logging.
    InProgress(String),
}

/// Map a raw extract-result entry onto the poll state machine.
///
/// `pending`, `running`, and `converting` are the documented transient
/// states; any state this client does not recognise is treated the same way
/// so that new intermediate states on the service side do not break us.
pub(crate) fn classify_poll(extract: &ExtractResult) -> PollOutcome {
    match extract.state.as_str() {
        "done" => match &extract.full_zip_url {
            Some(url) => PollOutcome::Ready(url.clone()),
            None => PollOutcome::Failed("job done but no result URL returned".to_string()),
        },
        "failed" => PollOutcome::Failed(
            extract
                .err_msg
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
        ),
        "pending" | "running" | "converting" => PollOutcome::InProgress(extract.state.clone()),
        other => {
            warn!("Unrecognised job state '{other}' — treating as in-progress");
            PollOutcome::InProgress(other.to_string())
        }
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// HTTP client for the MinerU v4 extraction API.
pub struct MinerUClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    language: String,
    enable_formula: bool,
    enable_table: bool,
    is_ocr: bool,
    max_retries: u32,
    retry_base_delay: Duration,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl MinerUClient {
    pub fn new(config: &BatchConfig) -> Result<Self, BatchError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BatchError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            enable_formula: config.enable_formula,
            enable_table: config.enable_table,
            is_ocr: config.is_ocr,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
            poll_interval: config.poll_interval,
            job_timeout: config.job_timeout,
        })
    }

    /// Phase 1: acquire an upload slot for `filename`.
    async fn request_upload_slot(&self, filename: &str) -> Result<(String, String), BatchError> {
        let url = format!("{}/file-urls/batch", self.base_url);
        let body = UploadSlotRequest {
            enable_formula: self.enable_formula,
            language: self.language.clone(),
            enable_table: self.enable_table,
            files: vec![FileSpec {
                name: filename.to_string(),
                is_ocr: self.is_ocr,
            }],
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| http_err("upload-slot request", e))?
            .error_for_status()
            .map_err(|e| http_err("upload-slot request", e))?;

        let envelope: ApiEnvelope<UploadSlotData> = response
            .json()
            .await
            .map_err(|e| http_err("upload-slot response", e))?;
        let data = envelope.into_data()?;

        let upload_url = data.file_urls.into_iter().next().ok_or(BatchError::ApiError {
            code: 0,
            msg: "no upload URL returned".to_string(),
        })?;
        debug!("Acquired upload slot, batch_id={}", data.batch_id);
        Ok((data.batch_id, upload_url))
    }

    /// Phase 2: PUT the raw file bytes to the pre-signed URL.
    ///
    /// No bearer token here — the URL itself carries the authorisation, and
    /// success is HTTP-status-only with no application envelope.
    async fn upload_file(&self, pdf_path: &Path, upload_url: &str) -> Result<(), BatchError> {
        let bytes = tokio::fs::read(pdf_path)
            .await
            .map_err(|e| BatchError::io(pdf_path, e))?;

        self.http
            .put(upload_url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| http_err("upload", e))?
            .error_for_status()
            .map_err(|e| http_err("upload", e))?;

        debug!("Uploaded {}", pdf_path.display());
        Ok(())
    }

    /// One poll observation for phase 3.
    async fn poll_status(&self, batch_id: &str) -> Result<PollOutcome, BatchError> {
        let url = format!("{}/extract-results/batch/{batch_id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| http_err("poll", e))?
            .error_for_status()
            .map_err(|e| http_err("poll", e))?;

        let envelope: ApiEnvelope<BatchResultData> = response
            .json()
            .await
            .map_err(|e| http_err("poll response", e))?;
        let data = envelope.into_data()?;

        match data.extract_result.first() {
            Some(extract) => Ok(classify_poll(extract)),
            None => Ok(PollOutcome::InProgress("pending".to_string())),
        }
    }

    /// Phase 4: download the result archive and install artifacts.
    async fn download_and_install(
        &self,
        zip_url: &str,
        filename: &str,
        layout: &OutputLayout,
    ) -> Result<ConvertedArtifacts, BatchError> {
        let response = self
            .http
            .get(zip_url)
            .send()
            .await
            .map_err(|e| http_err("download", e))?
            .error_for_status()
            .map_err(|e| http_err("download", e))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| http_err("download", e))?
            .to_vec();
        debug!("Downloaded result archive ({} bytes)", bytes.len());

        let filename = filename.to_string();
        let layout = layout.clone();
        // Archive extraction is blocking CPU + disk work; keep it off the
        // async executor's hot path.
        tokio::task::spawn_blocking(move || {
            let scratch = TempDir::new()
                .map_err(|e| BatchError::Archive(format!("scratch dir: {e}")))?;
            unpack_archive(&bytes, scratch.path())?;
            install_artifacts(scratch.path(), &layout, &filename)
            // `scratch` drops here on every exit path, including errors.
        })
        .await
        .map_err(|e| BatchError::Archive(format!("unpack task failed: {e}")))?
    }
}

#[async_trait]
impl Converter for MinerUClient {
    /// Probe the API by requesting an upload slot for a synthetic filename.
    ///
    /// Deliberately re-tested on every call rather than cached — the operator
    /// may rotate the API key between files of a long-running batch.
    async fn test_connection(&self) -> bool {
        info!("Testing extraction API connection…");
        match self.request_upload_slot(CONNECTION_TEST_FILENAME).await {
            Ok(_) => {
                info!("Extraction API connection OK");
                true
            }
            Err(e) => {
                warn!("Extraction API connection failed: {e}");
                warn!("Check the API key at https://mineru.net/apiManage");
                false
            }
        }
    }

    async fn convert(
        &self,
        pdf_path: &Path,
        layout: &OutputLayout,
    ) -> Result<ConvertedArtifacts, BatchError> {
        let filename = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size = std::fs::metadata(pdf_path)
            .map_err(|e| BatchError::io(pdf_path, e))?
            .len();
        info!(
            "Converting {} ({:.2} MB)",
            filename,
            size as f64 / (1024.0 * 1024.0)
        );

        // Phase 1+2 share one retry scope: a fresh attempt needs a fresh
        // upload slot, since pre-signed URLs are single-use.
        let batch_id = with_retries("submit", self.max_retries, self.retry_base_delay, || {
            let filename = filename.clone();
            async move {
                let (batch_id, upload_url) = self.request_upload_slot(&filename).await?;
                self.upload_file(pdf_path, &upload_url).await?;
                Ok(batch_id)
            }
        })
        .await?;
        info!("Submitted {filename}, batch_id={batch_id}");

        // Phase 3: poll to completion.
        let zip_url = poll_until_done(
            || self.poll_status(&batch_id),
            self.poll_interval,
            self.job_timeout,
        )
        .await?;
        info!("Remote conversion of {filename} finished");

        // Phase 4: download + unpack, retried for transient network errors;
        // ArtifactNotFound and Archive pass through untouched.
        let artifacts = with_retries(
            "download",
            self.max_retries,
            self.retry_base_delay,
            || self.download_and_install(&zip_url, &filename, layout),
        )
        .await?;
        info!("Markdown written to {}", artifacts.md_path.display());
        Ok(artifacts)
    }
}

fn http_err(stage: &'static str, e: reqwest::Error) -> BatchError {
    BatchError::Http {
        stage,
        reason: e.to_string(),
    }
}

// ── Retry / poll machinery ───────────────────────────────────────────────

/// Run `f` up to `max_attempts` times, backing off exponentially between
/// attempts. Only [transient](BatchError::is_transient) errors consume
/// attempts; anything else returns immediately.
pub(crate) async fn with_retries<T, F, Fut>(
    op: &'static str,
    max_attempts: u32,
    base_delay: Duration,
    mut f: F,
) -> Result<T, BatchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BatchError>>,
{
    let attempts = max_attempts.max(1);
    let mut attempt: u32 = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let backoff = base_delay * 2u32.pow(attempt);
                warn!(
                    "{op}: attempt {}/{attempts} failed ({e}), retrying in {:?}",
                    attempt + 1,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drive the poll loop to a terminal outcome.
///
/// The timeout is detected by wall-clock comparison at the top of each
/// iteration, so total elapsed time is bounded by `timeout + interval`.
/// Transient errors from `poll` keep the loop alive (they count only toward
/// the timeout); application errors surface immediately.
pub(crate) async fn poll_until_done<F, Fut>(
    mut poll: F,
    interval: Duration,
    timeout: Duration,
) -> Result<String, BatchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome, BatchError>>,
{
    let started = tokio::time::Instant::now();
    let mut last_progress_log: Option<tokio::time::Instant> = None;

    loop {
        if started.elapsed() >= timeout {
            return Err(BatchError::JobTimeout {
                secs: timeout.as_secs(),
            });
        }

        match poll().await {
            Ok(PollOutcome::Ready(url)) => return Ok(url),
            Ok(PollOutcome::Failed(message)) => return Err(BatchError::JobFailed { message }),
            Ok(PollOutcome::InProgress(state)) => {
                let due = last_progress_log
                    .map(|t| t.elapsed() >= STATUS_LOG_INTERVAL)
                    .unwrap_or(true);
                if due {
                    info!(
                        "Job state: {state} ({}s elapsed)",
                        started.elapsed().as_secs()
                    );
                    last_progress_log = Some(tokio::time::Instant::now());
                }
            }
            Err(e) if e.is_transient() => {
                warn!("Poll attempt failed ({e}), will poll again");
            }
            Err(e) => return Err(e),
        }

        tokio::time::sleep(interval).await;
    }
}

// ── Archive handling ─────────────────────────────────────────────────────

/// Extract every entry of the zip in `bytes` under `target`, sanitising
/// entry names so a hostile archive cannot escape the scratch directory.
pub(crate) fn unpack_archive(bytes: &[u8], target: &Path) -> Result<(), BatchError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive =
        zip::ZipArchive::new(cursor).map_err(|e| BatchError::Archive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| BatchError::Archive(e.to_string()))?;
        let out_path = match entry.enclosed_name() {
            Some(name) => target.join(name),
            None => continue,
        };

        if entry.name().ends_with('/') {
            std::fs::create_dir_all(&out_path).map_err(|e| BatchError::io(&out_path, e))?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| BatchError::io(parent, e))?;
            }
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .map_err(|e| BatchError::Archive(e.to_string()))?;
            std::fs::write(&out_path, contents).map_err(|e| BatchError::io(&out_path, e))?;
        }
    }
    Ok(())
}

/// Find the extraction artifacts inside an unpacked archive.
///
/// The archive's internal layout is not contractually fixed, so this is an
/// intentionally loose search: the first `*.md` file anywhere in the tree,
/// and the first directory literally named `images` anywhere in the tree.
/// Keeping the search in one function means a future layout change on the
/// service side touches exactly this spot.
pub(crate) fn locate_artifacts(root: &Path) -> (Option<PathBuf>, Option<PathBuf>) {
    let mut md_file = None;
    let mut images_dir = None;

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if md_file.is_none()
            && path.is_file()
            && path.extension().map(|e| e == "md").unwrap_or(false)
        {
            md_file = Some(path.to_path_buf());
        }
        if images_dir.is_none()
            && path.is_dir()
            && path.file_name().map(|n| n == "images").unwrap_or(false)
        {
            images_dir = Some(path.to_path_buf());
        }
        if md_file.is_some() && images_dir.is_some() {
            break;
        }
    }
    (md_file, images_dir)
}

/// Copy located artifacts from the scratch tree into their final layout
/// positions. Nothing is written under `md/` unless a Markdown file was
/// actually found.
pub(crate) fn install_artifacts(
    scratch: &Path,
    layout: &OutputLayout,
    pdf_filename: &str,
) -> Result<ConvertedArtifacts, BatchError> {
    let stem = pdf_stem(Path::new(pdf_filename));
    let (md_src, images_src) = locate_artifacts(scratch);

    let md_src = md_src.ok_or_else(|| BatchError::ArtifactNotFound {
        filename: pdf_filename.to_string(),
    })?;

    let md_dst = layout.md_path(&stem);
    if let Some(parent) = md_dst.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BatchError::io(parent, e))?;
    }
    std::fs::copy(&md_src, &md_dst).map_err(|e| BatchError::io(&md_dst, e))?;

    let mut installed_images = None;
    if let Some(images_src) = images_src {
        let images_dst = layout.images_dir(&stem);
        std::fs::create_dir_all(&images_dst).map_err(|e| BatchError::io(&images_dst, e))?;
        let mut copied = 0usize;
        for entry in std::fs::read_dir(&images_src).map_err(|e| BatchError::io(&images_src, e))? {
            let entry = entry.map_err(|e| BatchError::io(&images_src, e))?;
            let src = entry.path();
            if src.is_file() {
                let dst = images_dst.join(entry.file_name());
                std::fs::copy(&src, &dst).map_err(|e| BatchError::io(&dst, e))?;
                copied += 1;
            }
        }
        debug!("Copied {copied} image file(s) to {}", images_dst.display());
        if copied > 0 {
            installed_images = Some(images_dst);
        }
    }

    Ok(ConvertedArtifacts {
        md_path: md_dst,
        images_dir: installed_images,
    })
}
