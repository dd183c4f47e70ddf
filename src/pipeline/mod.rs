//! Pipeline stages for batch PDF processing.
//!
//! Each submodule implements exactly one decision or transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. a different summarization backend) without
//! touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! scan ──▶ validity ──▶ [client: submit/poll/download] ──▶ validity ──▶ summarize
//! (find)   (reuse?)      (remote job, see crate::client)   (summary?)   (optional)
//! ```
//!
//! 1. [`scan`]      — enumerate `*.pdf` inputs in a stable order
//! 2. [`validity`]  — decide whether existing artifacts may be reused; the
//!    cache key of the whole system
//! 3. [`summarize`] — the external language-model collaborator behind a
//!    trait seam; absence of a credential disables it without error

pub mod scan;
pub mod summarize;
pub mod validity;
