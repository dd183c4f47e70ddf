//! Batch orchestration: the per-file pipeline and the worker pool around it.
//!
//! One [`BatchOrchestrator`] owns a run. For every discovered PDF it executes
//! the same decision sequence:
//!
//! ```text
//! valid Markdown on disk? ──yes──▶ reuse (no network)
//!         │no
//! service reachable? ──no──▶ record failure, move on
//!         │yes
//! remote conversion job ──▶ artifacts installed
//!         │
//! summary missing/stale AND summarizer available? ──▶ summarize
//!         │
//! persist status row, emit progress event
//! ```
//!
//! Failure isolation is the core property: any per-file error is converted
//! into that file's [`ProcessingResult::error_message`] and the batch keeps
//! going. Only a missing input directory or invalid configuration aborts the
//! run itself.

use crate::client::{Converter, MinerUClient};
use crate::config::{pdf_stem, BatchConfig};
use crate::error::BatchError;
use crate::output::{BatchReport, ProcessingResult};
use crate::pipeline::scan::discover_pdfs;
use crate::pipeline::summarize::{write_summary, ClaudeSummarizer, Summarizer};
use crate::pipeline::validity::{markdown_verdict, summary_verdict};
use crate::status::StatusStore;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives one batch run end to end.
pub struct BatchOrchestrator {
    config: BatchConfig,
    converter: Arc<dyn Converter>,
    summarizer: Option<Arc<dyn Summarizer>>,
    status: StatusStore,
}

impl BatchOrchestrator {
    /// Build an orchestrator with the production MinerU client and, when
    /// summarization is enabled and a credential is present in the
    /// environment, the Anthropic summarizer.
    pub fn new(config: BatchConfig) -> Result<Self, BatchError> {
        let converter: Arc<dyn Converter> = Arc::new(MinerUClient::new(&config)?);
        let summarizer: Option<Arc<dyn Summarizer>> = if config.summarize {
            match ClaudeSummarizer::from_env() {
                Some(s) => Some(Arc::new(s)),
                None => {
                    info!("No summarizer credential configured; summaries will be skipped");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self::with_parts(config, converter, summarizer))
    }

    /// Build an orchestrator around explicit collaborators.
    ///
    /// This is the seam the integration tests use to substitute stub
    /// backends; the status table is still loaded from `config.status_file`.
    pub fn with_parts(
        config: BatchConfig,
        converter: Arc<dyn Converter>,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        let status = StatusStore::load(&config.status_file);
        Self {
            config,
            converter,
            summarizer,
            status,
        }
    }

    /// The shared status table.
    pub fn status(&self) -> &StatusStore {
        &self.status
    }

    /// Run the whole batch and return the aggregated report.
    ///
    /// Per-file failures are recorded in the report, not returned as `Err`.
    pub async fn run(&self) -> Result<BatchReport, BatchError> {
        let pdfs = discover_pdfs(&self.config.input_dir)?;
        info!(
            "Found {} PDF file(s) in {}",
            pdfs.len(),
            self.config.input_dir.display()
        );

        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_start(pdfs.len());
        }
        if pdfs.is_empty() {
            return Ok(BatchReport::from_results(Vec::new()));
        }

        let results = if self.config.parallel && pdfs.len() > 1 {
            debug!("Dispatching across {} worker(s)", self.config.max_workers);
            stream::iter(pdfs)
                .map(|pdf| self.process_one(pdf))
                .buffer_unordered(self.config.max_workers)
                .collect::<Vec<_>>()
                .await
        } else {
            let mut results = Vec::with_capacity(pdfs.len());
            for pdf in pdfs {
                results.push(self.process_one(pdf).await);
            }
            results
        };

        let converted = results.iter().filter(|r| r.md_converted).count();
        if let Some(cb) = &self.config.progress_callback {
            cb.on_batch_complete(results.len(), converted);
        }
        Ok(BatchReport::from_results(results))
    }

    /// Run the full pipeline for one PDF. Never fails: every error lands in
    /// the returned result's `error_message`.
    async fn process_one(&self, pdf_path: PathBuf) -> ProcessingResult {
        let filename = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(cb) = &self.config.progress_callback {
            cb.on_file_start(&filename);
        }

        let started = Instant::now();
        let mut result = ProcessingResult::new(&filename);
        let layout = self.config.layout();
        let stem = pdf_stem(&pdf_path);

        // Stage 1: Markdown, by reuse or by remote conversion.
        match markdown_verdict(&pdf_path, &layout) {
            Ok(()) => {
                info!("{filename}: valid Markdown on disk, skipping conversion");
                result.md_converted = true;
                result.md_file_reused = true;
                result.md_path = Some(layout.md_path(&stem).to_string_lossy().into_owned());
                let images = layout.images_dir(&stem);
                if images.is_dir() {
                    result.images_dir = Some(images.to_string_lossy().into_owned());
                }
            }
            Err(reason) => {
                debug!("{filename}: needs conversion ({reason})");
                // Probed per file, not per run: a long batch can outlive a
                // credential rotation.
                if self.converter.test_connection().await {
                    match self.converter.convert(&pdf_path, &layout).await {
                        Ok(artifacts) => {
                            result.md_converted = true;
                            result.md_path =
                                Some(artifacts.md_path.to_string_lossy().into_owned());
                            result.images_dir = artifacts
                                .images_dir
                                .map(|d| d.to_string_lossy().into_owned());
                        }
                        Err(e) => {
                            warn!("{filename}: conversion failed: {e}");
                            result.error_message = Some(e.to_string());
                        }
                    }
                } else {
                    result.error_message =
                        Some("Extraction service unavailable".to_string());
                }
            }
        }

        // Stage 2: summary, only on top of trusted Markdown. The on-disk
        // check runs even with summarization switched off, so an existing
        // fresh summary is still reported rather than forgotten.
        if result.md_converted {
            match summary_verdict(&pdf_path, &layout) {
                Ok(()) => {
                    debug!("{filename}: fresh summary on disk, skipping");
                    result.summary_generated = true;
                    result.summary_path =
                        Some(layout.summary_path(&stem).to_string_lossy().into_owned());
                }
                Err(_) if !self.config.summarize => {
                    debug!("{filename}: summarization disabled, skipping");
                }
                Err(reason) => match &self.summarizer {
                    Some(summarizer) => {
                        debug!("{filename}: summarizing ({reason})");
                        match self.generate_summary(summarizer, &pdf_path, &filename).await {
                            Ok(path) => {
                                result.summary_generated = true;
                                result.summary_path =
                                    Some(path.to_string_lossy().into_owned());
                            }
                            Err(e) => {
                                // Non-fatal: the file stays a partial success.
                                warn!("{filename}: summarization failed: {e}");
                                result.error_message = Some(format!("summary: {e}"));
                            }
                        }
                    }
                    None => debug!("{filename}: no summarizer, skipping summary"),
                },
            }
        }

        result.processing_time = started.elapsed().as_secs_f64();

        if let Err(e) = self.status.record(&result) {
            warn!("{filename}: could not persist status row: {e}");
        }
        if let Some(cb) = &self.config.progress_callback {
            cb.on_file_complete(&result);
        }
        info!("{}", result.status_line());
        result
    }

    async fn generate_summary(
        &self,
        summarizer: &Arc<dyn Summarizer>,
        pdf_path: &Path,
        filename: &str,
    ) -> Result<PathBuf, crate::error::SummarizeError> {
        let layout = self.config.layout();
        let stem = pdf_stem(pdf_path);
        let md_path = layout.md_path(&stem);
        let markdown =
            tokio::fs::read_to_string(&md_path)
                .await
                .map_err(|e| crate::error::SummarizeError::Io {
                    path: md_path.clone(),
                    source: e,
                })?;

        let summary = summarizer.summarize(&markdown, filename).await?;
        let summary_path = layout.summary_path(&stem);
        write_summary(&summary, &summary_path)?;
        Ok(summary_path)
    }
}
