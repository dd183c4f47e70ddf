//! Per-file result records and the end-of-run report.
//!
//! [`ProcessingResult`] is the strongly-typed record that flows through the
//! whole system: produced once per file per run, persisted as one CSV row by
//! [`crate::status::StatusStore`], and aggregated into a [`BatchReport`] at
//! the end of the run. Stringly-typed values never leak past the store
//! boundary — serde's derive does the string↔typed conversion there.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one file's pipeline invocation.
///
/// Invariants maintained by the orchestrator:
/// * `summary_generated` implies `md_converted`;
/// * `error_message` is only set when at least one of
///   `md_converted` / `summary_generated` is false.
///
/// Field order matters: it defines the column order of the durable status
/// table (`filename, md_converted, summary_generated, md_path, images_dir,
/// summary_path, error_message, processing_time, md_file_reused`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    /// Identifying key, stable across runs.
    pub filename: String,
    /// The Markdown artifact exists and is trusted for this run.
    pub md_converted: bool,
    pub summary_generated: bool,
    /// Present only when the corresponding artifact exists.
    pub md_path: Option<String>,
    pub images_dir: Option<String>,
    pub summary_path: Option<String>,
    /// Set exactly when processing did not reach a successful terminal state
    /// for that stage.
    pub error_message: Option<String>,
    /// Wall-clock duration of this file's pipeline invocation, seconds.
    pub processing_time: f64,
    /// The Markdown artifact satisfied the validity check without a new
    /// conversion call.
    pub md_file_reused: bool,
}

impl ProcessingResult {
    /// A blank result for `filename`; the pipeline fills in the rest.
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            md_converted: false,
            summary_generated: false,
            md_path: None,
            images_dir: None,
            summary_path: None,
            error_message: None,
            processing_time: 0.0,
            md_file_reused: false,
        }
    }

    /// Markdown produced, no summary, and no error recorded.
    pub fn is_partial_success(&self) -> bool {
        self.md_converted && !self.summary_generated
    }

    /// One human-readable status line, used both for live per-file progress
    /// output and for the detail section of the final report.
    pub fn status_line(&self) -> String {
        let glyph = if self.md_converted { "✓" } else { "✗" };
        let reused = if self.md_file_reused { " (reused)" } else { "" };
        let summary = if self.summary_generated { " +summary" } else { "" };
        let images = if self.images_dir.is_some() { " +images" } else { "" };
        let error = match &self.error_message {
            Some(e) => format!(" [{e}]"),
            None => String::new(),
        };
        format!(
            "{glyph} {}{reused}{summary}{images}{error} ({:.1}s)",
            self.filename, self.processing_time
        )
    }
}

/// Aggregate counts over one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    /// Files whose Markdown artifact is trusted after this run.
    pub converted: usize,
    /// Subset of `converted` that skipped the remote call.
    pub reused: usize,
    /// Subset of `converted` produced by a fresh remote job this run.
    pub newly_converted: usize,
    pub summarized: usize,
    pub images_extracted: usize,
    pub failed: usize,
}

/// End-of-run report: sorted per-file results plus aggregate counts.
///
/// Results are sorted by filename before construction, so the rendered
/// report is deterministic regardless of worker completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<ProcessingResult>,
    pub stats: BatchStats,
}

impl BatchReport {
    /// Build a report from per-file results, sorting them by filename.
    pub fn from_results(mut results: Vec<ProcessingResult>) -> Self {
        results.sort_by(|a, b| a.filename.cmp(&b.filename));
        let stats = BatchStats {
            total: results.len(),
            converted: results.iter().filter(|r| r.md_converted).count(),
            reused: results.iter().filter(|r| r.md_file_reused).count(),
            newly_converted: results
                .iter()
                .filter(|r| r.md_converted && !r.md_file_reused)
                .count(),
            summarized: results.iter().filter(|r| r.summary_generated).count(),
            images_extracted: results.iter().filter(|r| r.images_dir.is_some()).count(),
            failed: results.iter().filter(|r| !r.md_converted).count(),
        };
        Self { results, stats }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.results.is_empty() {
            return writeln!(f, "No PDF files to process.");
        }

        let s = &self.stats;
        let pct = if s.total > 0 {
            s.converted as f64 / s.total as f64 * 100.0
        } else {
            0.0
        };

        writeln!(f, "PDF processing report")?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(f, "Total files:       {}", s.total)?;
        writeln!(f, "Markdown ready:    {} ({pct:.1}%)", s.converted)?;
        writeln!(f, "  reused:          {}", s.reused)?;
        writeln!(f, "  newly converted: {}", s.newly_converted)?;
        writeln!(f, "Summaries:         {}", s.summarized)?;
        writeln!(f, "Image sets:        {}", s.images_extracted)?;
        writeln!(f, "Failed:            {}", s.failed)?;
        writeln!(f)?;
        writeln!(f, "Files")?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for r in &self.results {
            writeln!(f, "{}", r.status_line())?;
        }
        Ok(())
    }
}
