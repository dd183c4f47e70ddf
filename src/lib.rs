//! # mineru-batch
//!
//! Resumable batch conversion of PDF documents to Markdown via the MinerU
//! extraction API, with optional structured summaries from a language model.
//!
//! ```text
//!  input_dir/*.pdf
//!       │
//!       ▼
//!  ┌──────────┐   invalid/missing   ┌─────────────────────────┐
//!  │ validity ├────────────────────▶│ MinerU job               │
//!  │ check    │                     │ submit ▶ poll ▶ download │
//!  └────┬─────┘                     └───────────┬─────────────┘
//!       │ valid (reuse)                         │
//!       ▼                                       ▼
//!  md/<stem>.md  imgs/<stem>/  ◀────────────────┘
//!       │
//!       ▼ (optional)
//!  summaries/<stem>.json
//!       │
//!       ▼
//!  .pdf_processing_status.csv   one row per file, rewritten per completion
//! ```
//!
//! The engine is **idempotent**: before converting, each file's existing
//! Markdown artifact is checked for validity and freshness, and valid
//! artifacts are reused without any network traffic. Interrupt a run at any
//! point and the next run picks up where it stopped.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mineru_batch::{BatchConfig, BatchOrchestrator};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BatchConfig::builder()
//!     .input_dir("articles")
//!     .output_dir("articles/processed")
//!     .api_key(std::env::var("MINERU_API_KEY")?)
//!     .build()?;
//!
//! let report = BatchOrchestrator::new(config)?.run().await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! Per-file failures never abort the batch; they are recorded in the report
//! and in the durable status table. Only a missing input directory or an
//! invalid configuration makes [`BatchOrchestrator::run`] return `Err`.

pub mod batch;
pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod status;

pub use batch::BatchOrchestrator;
pub use client::{ConvertedArtifacts, Converter, MinerUClient};
pub use config::{pdf_stem, BatchConfig, BatchConfigBuilder, OutputLayout};
pub use error::{BatchError, SummarizeError};
pub use output::{BatchReport, BatchStats, ProcessingResult};
pub use pipeline::summarize::{
    markdown_stats, ClaudeSummarizer, MarkdownStats, PaperSummary, Summarizer,
};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use status::StatusStore;
