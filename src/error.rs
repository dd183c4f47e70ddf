//! Error types for the mineru-batch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`BatchError`] — failures of a file's **primary** pipeline (discovery,
//!   the remote conversion job, artifact unpacking). A `BatchError` inside a
//!   worker is caught at the per-file boundary and recorded into that file's
//!   [`crate::output::ProcessingResult::error_message`]; it never aborts the
//!   batch. Only [`BatchError::InputDirMissing`] and configuration errors
//!   escape the orchestrator as `Err`.
//!
//! * [`SummarizeError`] — failures of the **secondary** summarization
//!   collaborator. Always non-fatal: a converted file whose summary failed is
//!   a partial success, never a failure.
//!
//! The split matters for the retry policy: [`BatchError::is_transient`]
//! decides which conversion failures are worth another attempt, while a
//! summarization failure is simply logged and the batch moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the batch pipeline and the conversion client.
#[derive(Debug, Error)]
pub enum BatchError {
    // ── Fatal (abort the whole run) ───────────────────────────────────────
    /// The input directory does not exist; there is nothing to process.
    #[error("Input directory not found: '{path}'\nCheck the path or set PDF_DIR.")]
    InputDirMissing { path: PathBuf },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Remote job protocol ───────────────────────────────────────────────
    /// Connection/HTTP failure talking to the extraction service.
    /// Transient: retried with exponential backoff.
    #[error("HTTP request failed during {stage}: {reason}")]
    Http { stage: &'static str, reason: String },

    /// The service answered at the transport level but signalled a logical
    /// failure (non-zero application code). Not retried.
    #[error("Extraction API error (code {code}): {msg}")]
    ApiError { code: i64, msg: String },

    /// The remote job explicitly reported the `failed` state. Terminal.
    #[error("Remote conversion job failed: {message}")]
    JobFailed { message: String },

    /// The wall-clock polling budget was exceeded. Terminal for this attempt;
    /// the file is eligible for a fresh attempt on the next run.
    #[error("Remote conversion job timed out after {secs}s\nIncrease --job-timeout for very large documents.")]
    JobTimeout { secs: u64 },

    /// The downloaded result archive contains no Markdown file.
    /// Signals a service-side contract violation; never retried.
    #[error("No Markdown file found in the result archive for '{filename}'")]
    ArtifactNotFound { filename: String },

    /// The result archive could not be read or unpacked.
    #[error("Failed to unpack result archive: {0}")]
    Archive(String),

    // ── Local I/O ─────────────────────────────────────────────────────────
    /// Reading the input PDF or writing an output artifact failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The durable status table could not be rewritten.
    #[error("Failed to persist status table '{path}': {reason}")]
    StatusStore { path: PathBuf, reason: String },
}

impl BatchError {
    /// Whether the retry wrapper should spend another attempt on this error.
    ///
    /// Network-level failures and local I/O come back different on a second
    /// try often enough to be worth the backoff. Application-level rejections
    /// ([`ApiError`](Self::ApiError)), an explicit remote `failed` state, a
    /// timeout, and a malformed archive are deterministic: retrying repeats
    /// the same paid work for the same outcome.
    pub fn is_transient(&self) -> bool {
        matches!(self, BatchError::Http { .. } | BatchError::Io { .. })
    }

    /// Convenience constructor for I/O errors carrying the offending path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BatchError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the summarization collaborator.
///
/// Every variant is non-fatal to the owning file's outcome: Markdown success
/// stands alone as a partial success.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// Connection/HTTP failure talking to the language-model API.
    #[error("Summarization request failed: {0}")]
    Http(String),

    /// The API rejected the credential (401/403). Retrying will not help.
    #[error("Summarization API authentication failed: {0}\nCheck the configured token.")]
    Auth(String),

    /// HTTP 429. Carries the server's Retry-After hint when one was sent.
    #[error("Summarization API rate limit exceeded")]
    RateLimited { retry_after: Option<u64> },

    /// The model's reply contained no parseable JSON record.
    #[error("Could not extract a JSON summary from the model response")]
    MalformedResponse,

    /// Reading the Markdown or writing the summary file failed.
    #[error("Summary I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BatchError::Http {
            stage: "upload",
            reason: "connection reset".into()
        }
        .is_transient());
        assert!(!BatchError::ApiError {
            code: -60012,
            msg: "quota exceeded".into()
        }
        .is_transient());
        assert!(!BatchError::JobFailed {
            message: "parse error".into()
        }
        .is_transient());
        assert!(!BatchError::JobTimeout { secs: 300 }.is_transient());
        assert!(!BatchError::ArtifactNotFound {
            filename: "a.pdf".into()
        }
        .is_transient());
    }

    #[test]
    fn job_timeout_display() {
        let e = BatchError::JobTimeout { secs: 300 };
        assert!(e.to_string().contains("300s"));
    }

    #[test]
    fn api_error_display_carries_code_and_msg() {
        let e = BatchError::ApiError {
            code: -1,
            msg: "invalid token".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("-1"), "got: {msg}");
        assert!(msg.contains("invalid token"));
    }

    #[test]
    fn artifact_not_found_names_the_file() {
        let e = BatchError::ArtifactNotFound {
            filename: "paper.pdf".into(),
        };
        assert!(e.to_string().contains("paper.pdf"));
    }

    #[test]
    fn rate_limited_display() {
        let e = SummarizeError::RateLimited { retry_after: None };
        assert!(e.to_string().contains("rate limit"));
    }
}
