//! Integration tests for the batch orchestrator.
//!
//! The remote backends are replaced with in-process stubs so the full
//! pipeline — discovery, validity checks, conversion, summarization, status
//! persistence — runs against real files in a temp tree without network
//! access. A live end-to-end test against the real service exists at the
//! bottom, gated behind `MINERU_E2E=1`.

use async_trait::async_trait;
use chrono::Utc;
use mineru_batch::{
    pdf_stem, BatchConfig, BatchError, BatchOrchestrator, ConvertedArtifacts, Converter,
    MarkdownStats, OutputLayout, PaperSummary, StatusStore, SummarizeError, Summarizer,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Markdown comfortably above the validity thresholds, with structure.
const VALID_MD: &str = "# Converted Document\n\nThis body text is comfortably longer than the \
minimum trusted size for a converted artifact and includes **bold structure** so the validity \
checks accept it.\n\n![fig](images/fig1.png)\n";

/// Below the size floor: an artifact like this must trigger reconversion.
const STUB_MD: &str = "# x\n";

// ── Stub backends ────────────────────────────────────────────────────────

/// Converter stub that writes a valid artifact locally. Filenames listed in
/// `fail` get a terminal job error instead.
struct StubConverter {
    convert_calls: Mutex<Vec<String>>,
    fail: HashSet<String>,
    with_images: bool,
}

impl StubConverter {
    fn new() -> Self {
        Self {
            convert_calls: Mutex::new(Vec::new()),
            fail: HashSet::new(),
            with_images: false,
        }
    }

    fn failing_on(name: &str) -> Self {
        let mut s = Self::new();
        s.fail.insert(name.to_string());
        s
    }

    fn calls(&self) -> Vec<String> {
        self.convert_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Converter for StubConverter {
    async fn test_connection(&self) -> bool {
        true
    }

    async fn convert(
        &self,
        pdf_path: &Path,
        layout: &OutputLayout,
    ) -> Result<ConvertedArtifacts, BatchError> {
        let filename = pdf_path.file_name().unwrap().to_string_lossy().into_owned();
        self.convert_calls.lock().unwrap().push(filename.clone());

        if self.fail.contains(&filename) {
            return Err(BatchError::JobFailed {
                message: "synthetic conversion failure".into(),
            });
        }

        let stem = pdf_stem(pdf_path);
        let md_path = layout.md_path(&stem);
        std::fs::create_dir_all(md_path.parent().unwrap()).unwrap();
        std::fs::write(&md_path, VALID_MD).unwrap();

        let images_dir = if self.with_images {
            let dir = layout.images_dir(&stem);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("fig1.png"), b"\x89PNG").unwrap();
            Some(dir)
        } else {
            None
        };

        Ok(ConvertedArtifacts { md_path, images_dir })
    }
}

/// Summarizer stub returning a canned record, or failing when rigged.
struct StubSummarizer {
    calls: AtomicUsize,
    fail: bool,
}

impl StubSummarizer {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn summarize(
        &self,
        markdown: &str,
        filename: &str,
    ) -> Result<PaperSummary, SummarizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SummarizeError::MalformedResponse);
        }
        Ok(PaperSummary {
            filename: filename.to_string(),
            title: "Stub Title".into(),
            authors: vec!["A. Author".into()],
            abstract_text: "An abstract.".into(),
            summary: "A summary.".into(),
            key_findings: vec!["finding".into()],
            keywords: vec!["kw".into()],
            metadata: MarkdownStats {
                word_count: markdown.split_whitespace().count(),
                ..MarkdownStats::default()
            },
            generated_at: Utc::now(),
            model_used: "stub-model".into(),
        })
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────

struct Fixture {
    _dir: TempDir,
    config: BatchConfig,
}

impl Fixture {
    fn with_pdfs(names: &[&str]) -> Self {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir_all(&input).unwrap();
        for name in names {
            std::fs::write(input.join(name), b"%PDF-1.4 test").unwrap();
        }
        let config = BatchConfig::builder()
            .input_dir(&input)
            .output_dir(dir.path().join("out"))
            .api_key("test-key")
            .build()
            .unwrap();
        Self { _dir: dir, config }
    }

    fn orchestrator(
        &self,
        converter: Arc<StubConverter>,
        summarizer: Option<Arc<StubSummarizer>>,
    ) -> BatchOrchestrator {
        BatchOrchestrator::with_parts(
            self.config.clone(),
            converter,
            summarizer.map(|s| s as Arc<dyn Summarizer>),
        )
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_batch_converts_and_summarizes_everything() {
    let fx = Fixture::with_pdfs(&["a.pdf", "b.pdf", "c.pdf"]);
    let converter = Arc::new(StubConverter::new());
    let summarizer = Arc::new(StubSummarizer::new());

    let report = fx
        .orchestrator(converter.clone(), Some(summarizer.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.stats.total, 3);
    assert_eq!(report.stats.converted, 3);
    assert_eq!(report.stats.newly_converted, 3);
    assert_eq!(report.stats.summarized, 3);
    assert_eq!(report.stats.failed, 0);
    assert_eq!(converter.calls().len(), 3);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 3);

    let layout = fx.config.layout();
    for stem in ["a", "b", "c"] {
        assert!(layout.md_path(stem).is_file());
        assert!(layout.summary_path(stem).is_file());
    }
}

#[tokio::test]
async fn second_run_reuses_everything_with_zero_remote_calls() {
    let fx = Fixture::with_pdfs(&["a.pdf", "b.pdf"]);
    let first = Arc::new(StubConverter::new());
    fx.orchestrator(first, Some(Arc::new(StubSummarizer::new())))
        .run()
        .await
        .unwrap();

    let second = Arc::new(StubConverter::new());
    let second_summarizer = Arc::new(StubSummarizer::new());
    let report = fx
        .orchestrator(second.clone(), Some(second_summarizer.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(report.stats.reused, 2);
    assert_eq!(report.stats.newly_converted, 0);
    assert!(second.calls().is_empty());
    assert_eq!(second_summarizer.calls.load(Ordering::SeqCst), 0);
    // Reused files still report their artifacts.
    for r in &report.results {
        assert!(r.md_path.is_some());
        assert!(r.summary_generated);
    }
}

#[tokio::test]
async fn one_failure_does_not_disturb_the_rest() {
    let fx = Fixture::with_pdfs(&["a.pdf", "bad.pdf", "c.pdf"]);
    let converter = Arc::new(StubConverter::failing_on("bad.pdf"));

    let report = fx
        .orchestrator(converter, Some(Arc::new(StubSummarizer::new())))
        .run()
        .await
        .unwrap();

    assert_eq!(report.stats.converted, 2);
    assert_eq!(report.stats.failed, 1);

    let bad = report
        .results
        .iter()
        .find(|r| r.filename == "bad.pdf")
        .unwrap();
    assert!(!bad.md_converted);
    assert!(!bad.summary_generated);
    assert!(bad
        .error_message
        .as_deref()
        .unwrap()
        .contains("synthetic conversion failure"));
}

#[tokio::test]
async fn retry_after_failure_converts_only_the_failed_file() {
    let fx = Fixture::with_pdfs(&["a.pdf", "bad.pdf"]);
    fx.orchestrator(Arc::new(StubConverter::failing_on("bad.pdf")), None)
        .run()
        .await
        .unwrap();

    // The failure is gone on the second run; only bad.pdf should hit the
    // service again.
    let converter = Arc::new(StubConverter::new());
    let report = fx.orchestrator(converter.clone(), None).run().await.unwrap();

    assert_eq!(converter.calls(), vec!["bad.pdf".to_string()]);
    assert_eq!(report.stats.converted, 2);
    assert_eq!(report.stats.reused, 1);
    assert_eq!(report.stats.failed, 0);
}

#[tokio::test]
async fn sequential_and_parallel_runs_agree() {
    let names = ["a.pdf", "b.pdf", "c.pdf", "d.pdf"];

    let mut fx_par = Fixture::with_pdfs(&names);
    fx_par.config.parallel = true;
    fx_par.config.max_workers = 4;
    let par = fx_par
        .orchestrator(Arc::new(StubConverter::new()), None)
        .run()
        .await
        .unwrap();

    let mut fx_seq = Fixture::with_pdfs(&names);
    fx_seq.config.parallel = false;
    let seq = fx_seq
        .orchestrator(Arc::new(StubConverter::new()), None)
        .run()
        .await
        .unwrap();

    assert_eq!(par.stats.total, seq.stats.total);
    assert_eq!(par.stats.converted, seq.stats.converted);
    // Reports are sorted, so filenames line up pairwise.
    let par_names: Vec<_> = par.results.iter().map(|r| &r.filename).collect();
    let seq_names: Vec<_> = seq.results.iter().map(|r| &r.filename).collect();
    assert_eq!(par_names, seq_names);

    // The durable tables must agree too, field by field, leaving out
    // processing_time and the paths (the fixtures live in different dirs).
    let par_table = StatusStore::load(&fx_par.config.status_file).snapshot();
    let seq_table = StatusStore::load(&fx_seq.config.status_file).snapshot();
    assert_eq!(par_table.len(), seq_table.len());
    for (key, p) in &par_table {
        let s = seq_table.get(key).expect("row present in both tables");
        assert_eq!(p.md_converted, s.md_converted);
        assert_eq!(p.summary_generated, s.summary_generated);
        assert_eq!(p.md_file_reused, s.md_file_reused);
        assert_eq!(p.error_message, s.error_message);
        assert_eq!(p.md_path.is_some(), s.md_path.is_some());
    }
}

#[tokio::test]
async fn disabled_summaries_still_report_a_fresh_summary_on_disk() {
    let mut fx = Fixture::with_pdfs(&["a.pdf"]);
    fx.orchestrator(
        Arc::new(StubConverter::new()),
        Some(Arc::new(StubSummarizer::new())),
    )
    .run()
    .await
    .unwrap();

    // Same tree, summarization switched off: the existing summary must
    // still be recognised, not silently demoted.
    fx.config.summarize = false;
    let report = fx
        .orchestrator(Arc::new(StubConverter::new()), None)
        .run()
        .await
        .unwrap();

    let r = &report.results[0];
    assert!(r.md_file_reused);
    assert!(r.summary_generated);
    assert!(r.summary_path.is_some());

    let store = StatusStore::load(&fx.config.status_file);
    assert!(store.get("a.pdf").unwrap().summary_generated);
}

#[tokio::test]
async fn no_summarizer_means_partial_success_not_failure() {
    let fx = Fixture::with_pdfs(&["a.pdf"]);
    let report = fx
        .orchestrator(Arc::new(StubConverter::new()), None)
        .run()
        .await
        .unwrap();

    let r = &report.results[0];
    assert!(r.md_converted);
    assert!(!r.summary_generated);
    assert!(r.error_message.is_none());
    assert!(r.is_partial_success());
    assert_eq!(report.stats.failed, 0);
}

#[tokio::test]
async fn summarizer_failure_is_recorded_but_markdown_stands() {
    let fx = Fixture::with_pdfs(&["a.pdf"]);
    let summarizer = Arc::new(StubSummarizer {
        calls: AtomicUsize::new(0),
        fail: true,
    });
    let report = fx
        .orchestrator(Arc::new(StubConverter::new()), Some(summarizer))
        .run()
        .await
        .unwrap();

    let r = &report.results[0];
    assert!(r.md_converted);
    assert!(!r.summary_generated);
    assert!(r.error_message.as_deref().unwrap().starts_with("summary:"));
    assert_eq!(report.stats.failed, 0);
}

#[tokio::test]
async fn undersized_artifact_triggers_reconversion() {
    let fx = Fixture::with_pdfs(&["a.pdf"]);
    let layout = fx.config.layout();
    std::fs::create_dir_all(layout.md_path("a").parent().unwrap()).unwrap();
    std::fs::write(layout.md_path("a"), STUB_MD).unwrap();

    let converter = Arc::new(StubConverter::new());
    let report = fx.orchestrator(converter.clone(), None).run().await.unwrap();

    assert_eq!(converter.calls(), vec!["a.pdf".to_string()]);
    assert_eq!(report.stats.newly_converted, 1);
    assert_eq!(std::fs::read_to_string(layout.md_path("a")).unwrap(), VALID_MD);
}

#[tokio::test]
async fn stale_summary_is_regenerated() {
    let fx = Fixture::with_pdfs(&["a.pdf"]);
    let summarizer1 = Arc::new(StubSummarizer::new());
    fx.orchestrator(Arc::new(StubConverter::new()), Some(summarizer1))
        .run()
        .await
        .unwrap();

    // Backdate the summary behind the Markdown so it no longer matches.
    let layout = fx.config.layout();
    let old = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(layout.summary_path("a"))
        .unwrap()
        .set_modified(old)
        .unwrap();

    let summarizer2 = Arc::new(StubSummarizer::new());
    let report = fx
        .orchestrator(Arc::new(StubConverter::new()), Some(summarizer2.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(summarizer2.calls.load(Ordering::SeqCst), 1);
    assert!(report.results[0].summary_generated);
    assert!(report.results[0].md_file_reused);
}

#[tokio::test]
async fn images_are_reported_when_extracted() {
    let fx = Fixture::with_pdfs(&["a.pdf"]);
    let converter = Arc::new(StubConverter {
        convert_calls: Mutex::new(Vec::new()),
        fail: HashSet::new(),
        with_images: true,
    });
    let report = fx.orchestrator(converter, None).run().await.unwrap();

    assert_eq!(report.stats.images_extracted, 1);
    let images_dir = report.results[0].images_dir.as_deref().unwrap();
    assert!(Path::new(images_dir).join("fig1.png").is_file());
}

#[tokio::test]
async fn status_table_survives_across_orchestrators() {
    let fx = Fixture::with_pdfs(&["a.pdf", "bad.pdf"]);
    fx.orchestrator(Arc::new(StubConverter::failing_on("bad.pdf")), None)
        .run()
        .await
        .unwrap();

    let store = StatusStore::load(&fx.config.status_file);
    let ok = store.get("a.pdf").unwrap();
    assert!(ok.md_converted);
    assert!(ok.processing_time >= 0.0);

    let bad = store.get("bad.pdf").unwrap();
    assert!(!bad.md_converted);
    assert!(bad.error_message.is_some());
}

#[tokio::test]
async fn non_pdf_files_are_ignored() {
    let fx = Fixture::with_pdfs(&["a.pdf"]);
    std::fs::write(fx.config.input_dir.join("notes.txt"), b"text").unwrap();
    std::fs::write(fx.config.input_dir.join("data.csv"), b"a,b").unwrap();

    let report = fx
        .orchestrator(Arc::new(StubConverter::new()), None)
        .run()
        .await
        .unwrap();
    assert_eq!(report.stats.total, 1);
    assert_eq!(report.results[0].filename, "a.pdf");
}

// ── Live end-to-end ──────────────────────────────────────────────────────

/// Full run against the real MinerU service. Requires `MINERU_E2E=1`,
/// `MINERU_API_KEY`, and a PDF at the path in `MINERU_E2E_PDF`.
#[tokio::test]
#[ignore = "requires network and MINERU_API_KEY; run with MINERU_E2E=1"]
async fn live_end_to_end() {
    if std::env::var("MINERU_E2E").as_deref() != Ok("1") {
        return;
    }
    let api_key = std::env::var("MINERU_API_KEY").expect("MINERU_API_KEY not set");
    let pdf = std::env::var("MINERU_E2E_PDF").expect("MINERU_E2E_PDF not set");

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in");
    std::fs::create_dir_all(&input).unwrap();
    std::fs::copy(&pdf, input.join("sample.pdf")).unwrap();

    let config = BatchConfig::builder()
        .input_dir(&input)
        .output_dir(dir.path().join("out"))
        .api_key(api_key)
        .summarize(false)
        .build()
        .unwrap();

    let report = BatchOrchestrator::new(config.clone())
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(report.stats.converted, 1);
    assert!(config.layout().md_path("sample").is_file());
}
