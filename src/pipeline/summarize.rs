//! Structured paper summaries via the Anthropic Messages API.
//!
//! Summarization is a strictly secondary stage: it consumes the converted
//! Markdown, never the PDF, and any failure here leaves the file a partial
//! success. The orchestrator talks to the [`Summarizer`] trait so tests can
//! substitute a stub for the network client.
//!
//! Model replies are requested as bare JSON but parsed leniently — models
//! occasionally wrap the object in a code fence or lead with a sentence of
//! prose, and discarding an otherwise good summary over formatting is a
//! needless quality loss ([`extract_json`]).

use crate::error::SummarizeError;
use crate::prompts::{build_summary_prompt, SUMMARY_SYSTEM_PROMPT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4000;
const TEMPERATURE: f64 = 0.3;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ── Summary record ───────────────────────────────────────────────────────

/// The structured summary persisted as `summaries/<stem>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaperSummary {
    pub filename: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub metadata: MarkdownStats,
    pub generated_at: DateTime<Utc>,
    pub model_used: String,
}

/// Cheap document statistics computed locally from the Markdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MarkdownStats {
    pub word_count: usize,
    pub image_count: usize,
    pub table_row_count: usize,
    /// Rough length estimate at 500 words per page.
    pub estimated_pages: usize,
}

static IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[.*?\]\(.*?\)").unwrap_or_else(|e| panic!("image regex: {e}"))
});
static TABLE_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\|.*\|\s*$").unwrap_or_else(|e| panic!("table regex: {e}"))
});

/// Compute [`MarkdownStats`] for one converted document.
pub fn markdown_stats(markdown: &str) -> MarkdownStats {
    let word_count = markdown.split_whitespace().count();
    MarkdownStats {
        word_count,
        image_count: IMAGE_RE.find_iter(markdown).count(),
        table_row_count: TABLE_ROW_RE.find_iter(markdown).count(),
        estimated_pages: word_count.div_ceil(500).max(1),
    }
}

// ── Summarizer seam ──────────────────────────────────────────────────────

/// The summarization backend, as the orchestrator sees it.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(
        &self,
        markdown: &str,
        filename: &str,
    ) -> Result<PaperSummary, SummarizeError>;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// The fields the model is asked to produce.
#[derive(Debug, Deserialize)]
struct ModelSummary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    abstract_text: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    key_findings: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

// ── Client ───────────────────────────────────────────────────────────────

/// Summarizer backed by the Anthropic Messages API.
pub struct ClaudeSummarizer {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ClaudeSummarizer {
    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self, SummarizeError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SummarizeError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    /// Build from the environment, or `None` when no credential is set.
    ///
    /// `ANTHROPIC_AUTH_TOKEN` wins over `ANTHROPIC_API_KEY` so proxy
    /// deployments can override the direct key without unsetting it.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_AUTH_TOKEN")
            .or_else(|_| std::env::var("ANTHROPIC_API_KEY"))
            .ok()
            .filter(|k| !k.trim().is_empty())?;
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model =
            std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        match Self::new(api_key, base_url, model) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Summarizer unavailable: {e}");
                None
            }
        }
    }

    async fn send_once(&self, prompt: &str) -> Result<MessagesResponse, SummarizeError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            system: SUMMARY_SYSTEM_PROMPT,
            messages: vec![Message {
                role: "user",
                content: prompt.to_string(),
            }],
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| SummarizeError::Http(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SummarizeError::Auth(status.to_string()));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            // Surface the server's pacing hint so the retry loop can honor it.
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(SummarizeError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(SummarizeError::Http(format!("HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| SummarizeError::Http(e.to_string()))
    }
}

#[async_trait]
impl Summarizer for ClaudeSummarizer {
    async fn summarize(
        &self,
        markdown: &str,
        filename: &str,
    ) -> Result<PaperSummary, SummarizeError> {
        let prompt = build_summary_prompt(markdown, filename);
        info!("Summarizing {filename} via {}", self.model);

        let mut attempt = 0u32;
        let response = loop {
            match self.send_once(&prompt).await {
                Ok(r) => break r,
                Err(SummarizeError::Auth(msg)) => return Err(SummarizeError::Auth(msg)),
                Err(e) if attempt + 1 < MAX_ATTEMPTS => {
                    let delay = match &e {
                        SummarizeError::RateLimited {
                            retry_after: Some(secs),
                        } => Duration::from_secs(*secs),
                        _ => RETRY_DELAY,
                    };
                    warn!(
                        "Summarization attempt {}/{MAX_ATTEMPTS} failed ({e}), retrying in {:?}",
                        attempt + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let text: String = response
            .content
            .iter()
            .map(|block| block.text.as_str())
            .collect();
        let parsed = extract_json(&text).ok_or(SummarizeError::MalformedResponse)?;
        let fields: ModelSummary =
            serde_json::from_value(parsed).map_err(|_| SummarizeError::MalformedResponse)?;
        debug!("Parsed summary for {filename}: '{}'", fields.title);

        Ok(PaperSummary {
            filename: filename.to_string(),
            title: fields.title,
            authors: fields.authors,
            abstract_text: fields.abstract_text,
            summary: fields.summary,
            key_findings: fields.key_findings,
            keywords: fields.keywords,
            metadata: markdown_stats(markdown),
            generated_at: Utc::now(),
            model_used: response.model.unwrap_or_else(|| self.model.clone()),
        })
    }
}

// ── Lenient JSON extraction ──────────────────────────────────────────────

static FENCED_JSON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")
        .unwrap_or_else(|e| panic!("fenced-json regex: {e}"))
});
static BARE_OBJECT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{.*\}").unwrap_or_else(|e| panic!("bare-object regex: {e}"))
});

/// Pull a JSON object out of a model reply.
///
/// Tried in order: the whole text as JSON, the first fenced ```json block,
/// then the widest `{…}` span. Returns `None` when nothing parses.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Some(value);
        }
    }
    if let Some(captures) = FENCED_JSON_RE.captures(trimmed) {
        if let Some(block) = captures.get(1) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(block.as_str()) {
                if value.is_object() {
                    return Some(value);
                }
            }
        }
    }
    if let Some(span) = BARE_OBJECT_RE.find(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(span.as_str()) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    None
}

/// Write a summary record to `path` as pretty-printed JSON.
pub fn write_summary(summary: &PaperSummary, path: &Path) -> Result<(), SummarizeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SummarizeError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let json = serde_json::to_string_pretty(summary).map_err(|e| SummarizeError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other(e),
    })?;
    std::fs::write(path, json).map_err(|e| SummarizeError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
