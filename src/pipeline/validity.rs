//! Artifact validity checks: the cache key of the whole pipeline.
//!
//! A file is only sent through the paid remote conversion when its existing
//! Markdown fails one of the checks below. The checks run in cost order and
//! short-circuit on the first failure: a `stat` is cheaper than reading the
//! file, which is cheaper than scanning its content.
//!
//! Verdicts are `Result<(), String>`: `Ok(())` means the artifact may be
//! reused; `Err(reason)` carries a human-readable reason. Callers use the
//! reason only for logging, never for control-flow branching beyond the
//! reuse decision itself.

use crate::config::{pdf_stem, OutputLayout};
use std::path::Path;
use std::time::SystemTime;

/// Minimum byte size of a trusted Markdown artifact. Guards against
/// truncated or empty downloads.
pub const MIN_MD_BYTES: u64 = 100;

/// Minimum trimmed character count. Guards against near-empty extraction.
pub const MIN_MD_CHARS: usize = 50;

/// At least one of these must appear for the content to count as Markdown
/// rather than extraction garbage: heading, bold, image link, table pipe.
const STRUCTURAL_MARKERS: [&str; 4] = ["#", "**", "![", "|"];

/// Decide whether the Markdown artifact derived from `pdf_path` is reusable.
///
/// Checks, in order, short-circuiting on first failure:
/// 1. the expected `md/<stem>.md` exists;
/// 2. file size ≥ [`MIN_MD_BYTES`];
/// 3. trimmed content length ≥ [`MIN_MD_CHARS`];
/// 4. content contains at least one Markdown structural marker;
/// 5. the Markdown is not older than the source PDF — a PDF replaced after
///    conversion requires reconversion.
pub fn markdown_verdict(pdf_path: &Path, layout: &OutputLayout) -> Result<(), String> {
    let md_path = layout.md_path(&pdf_stem(pdf_path));

    if !md_path.exists() {
        return Err("Markdown file does not exist".to_string());
    }

    let meta = std::fs::metadata(&md_path)
        .map_err(|e| format!("Cannot stat Markdown file: {e}"))?;
    if meta.len() < MIN_MD_BYTES {
        return Err(format!(
            "Markdown file too small ({} bytes < {MIN_MD_BYTES})",
            meta.len()
        ));
    }

    let content = std::fs::read_to_string(&md_path)
        .map_err(|e| format!("Cannot read Markdown file: {e}"))?;
    let trimmed = content.trim();
    if trimmed.chars().count() < MIN_MD_CHARS {
        return Err(format!(
            "Markdown content too short ({} chars < {MIN_MD_CHARS})",
            trimmed.chars().count()
        ));
    }

    if !STRUCTURAL_MARKERS.iter().any(|m| trimmed.contains(m)) {
        return Err("Content has no Markdown structure (no heading, bold, image, or table)".into());
    }

    if is_older_than(&md_path, pdf_path) {
        return Err("Markdown is older than the source PDF".to_string());
    }

    Ok(())
}

/// Decide whether the summary artifact for `pdf_path` is reusable:
/// it must exist and must not be older than the Markdown it summarizes.
pub fn summary_verdict(pdf_path: &Path, layout: &OutputLayout) -> Result<(), String> {
    let stem = pdf_stem(pdf_path);
    let summary_path = layout.summary_path(&stem);
    let md_path = layout.md_path(&stem);

    if !summary_path.exists() {
        return Err("Summary file does not exist".to_string());
    }
    if is_older_than(&summary_path, &md_path) {
        return Err("Summary is older than the Markdown".to_string());
    }
    Ok(())
}

/// True when `artifact`'s mtime is strictly older than `source`'s.
///
/// An unavailable mtime on either side counts as "older": the artifact
/// cannot be proven fresh, and the safe direction is to reconvert.
fn is_older_than(artifact: &Path, source: &Path) -> bool {
    let mtime = |p: &Path| -> Option<SystemTime> {
        std::fs::metadata(p).ok().and_then(|m| m.modified().ok())
    };
    match (mtime(artifact), mtime(source)) {
        (Some(a), Some(s)) => a < s,
        _ => true,
    }
}
