//! Prompt templates for the summarization stage.
//!
//! Kept in one module so prompt wording can be tuned without touching the
//! request plumbing in [`crate::pipeline::summarize`].

/// Markdown longer than this is truncated before being sent to the model.
/// Keeps token usage bounded for very long papers; the opening sections
/// carry the title, authors, and abstract, which is what the summary needs.
pub const MAX_CONTENT_CHARS: usize = 20_000;

/// System prompt establishing the extraction persona and output contract.
pub const SUMMARY_SYSTEM_PROMPT: &str = r#"You are an expert research assistant who reads academic papers and produces structured summaries.

You always respond with a single JSON object and nothing else. No prose before or after the JSON, no markdown fences."#;

/// Build the per-document user prompt.
///
/// The document content is clipped at a char boundary near
/// [`MAX_CONTENT_CHARS`] so the prompt never splits a UTF-8 code point.
pub fn build_summary_prompt(markdown: &str, filename: &str) -> String {
    let clipped = truncate_at_char_boundary(markdown, MAX_CONTENT_CHARS);
    let truncation_note = if clipped.len() < markdown.len() {
        "\n\n[Document truncated for length.]"
    } else {
        ""
    };

    format!(
        r#"Analyze the following academic paper (source file: {filename}) and produce a JSON object with exactly these fields:

{{
  "title": "the paper's full title",
  "authors": ["author name", "..."],
  "abstract": "the paper's abstract, verbatim if present, otherwise a faithful reconstruction",
  "summary": "a 2-3 paragraph summary of the paper's contribution and approach",
  "key_findings": ["one finding per entry, 3-6 entries"],
  "keywords": ["5-10 topical keywords"]
}}

Use empty strings or empty arrays for fields the document does not support. Respond with the JSON object only.

--- PAPER CONTENT ---

{clipped}{truncation_note}"#
    )
}

/// Truncate `s` to at most `max` bytes without splitting a code point.
fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
