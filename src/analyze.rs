//! Top-level entry points: analyse evidence, export and verify reports.
//!
//! | Function | Network | pdfium | Output |
//! |----------|---------|--------|--------|
//! | [`plan`] | no | no | model choice and part ordering (dry run) |
//! | [`analyze`] | one call | no | tidied Markdown report + HTML |
//! | [`submit`] | one call | no | next [`AppState`] |
//! | [`export_pdf`] | no | yes | sealed `Verum-Omnis-Report-<ms>.pdf` |
//! | [`export_html`] | no | no | standalone HTML page |
//! | [`verify_export`] | no | yes | seal check against the pre-stamp PDF |

use crate::config::AnalysisConfig;
use crate::error::{EvidenceWarning, VerumError};
use crate::logo::StoredLogo;
use crate::pipeline::compose::{compose_request, ComposedRequest, ModelSelection, RequestPart};
use crate::pipeline::evidence::{load_evidence, EvidenceFile};
use crate::pipeline::layout::{ContentMode, LogoImage, ReportLayout};
use crate::pipeline::model::{resolve_client, submit_once, Report};
use crate::pipeline::pdf::PdfiumBackend;
use crate::pipeline::render::{render_report, standalone_html, styled_html, Brightness, CmarkRenderer, MarkdownRenderer};
use crate::pipeline::seal::{seal_document, verify_sealed, PdfBackend, Seal, SealedReport, Verification};
use crate::pipeline::tidy::tidy_report;
use crate::prompts::REPORT_TITLE;
use crate::state::AppState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ── Output types ─────────────────────────────────────────────────────────

/// One request part as shown by a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PartSummary {
    Text { chars: usize, preview: String },
    InlineData { mime_type: String, base64_len: usize },
}

impl PartSummary {
    fn of(part: &RequestPart) -> Self {
        match part {
            RequestPart::Text(text) => PartSummary::Text {
                chars: text.chars().count(),
                preview: preview(text, 72),
            },
            RequestPart::InlineData(inline) => PartSummary::InlineData {
                mime_type: inline.mime_type.clone(),
                base64_len: inline.data.len(),
            },
        }
    }
}

fn preview(text: &str, max: usize) -> String {
    let first_line = text.trim().lines().next().unwrap_or_default();
    let mut out: String = first_line.chars().take(max).collect();
    if first_line.chars().count() > max || text.trim().lines().nth(1).is_some() {
        out.push('…');
    }
    out
}

/// What a submission would send, without sending it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestPlan {
    pub model: String,
    pub selection: ModelSelection,
    pub thinking_budget: Option<u32>,
    /// Parts in request order: instruction, prompt, then evidence.
    pub parts: Vec<PartSummary>,
    pub warnings: Vec<EvidenceWarning>,
}

impl RequestPlan {
    fn of(request: &ComposedRequest, warnings: &[EvidenceWarning]) -> Self {
        Self {
            model: request.model().to_string(),
            selection: request.selection(),
            thinking_budget: request.selection().thinking_budget(),
            parts: request.parts().iter().map(PartSummary::of).collect(),
            warnings: warnings.to_vec(),
        }
    }
}

/// Result of a successful analysis.
#[derive(Debug, Clone)]
pub struct AnalysisOutput {
    /// The tidied report.
    pub report: Report,
    /// Rendered report body.
    pub html: String,
    /// Body with the configured brightness colour applied.
    pub styled_html: String,
    pub plan: RequestPlan,
    /// Evidence files left out of the request.
    pub warnings: Vec<EvidenceWarning>,
    pub duration_ms: u64,
}

// ── Analysis ─────────────────────────────────────────────────────────────

/// Load every evidence input (path or URL), preserving order.
pub async fn load_inputs(inputs: &[String], config: &AnalysisConfig) -> Result<Vec<EvidenceFile>, VerumError> {
    let mut files = Vec::with_capacity(inputs.len());
    for input in inputs {
        files.push(load_evidence(input, config.download_timeout_secs).await?);
    }
    Ok(files)
}

/// Compose the request and report what would be sent. No external call.
pub fn plan(
    prompt: &str,
    evidence: &[EvidenceFile],
    think_more: bool,
    config: &AnalysisConfig,
) -> Result<RequestPlan, VerumError> {
    let composition = compose_request(prompt, evidence, think_more, config)?;
    Ok(RequestPlan::of(&composition.request, &composition.warnings))
}

/// The one model call of a submission, with an optional overall timeout.
async fn call_model(request: &ComposedRequest, config: &AnalysisConfig) -> Result<Report, VerumError> {
    let client = resolve_client(config)?;
    let report = match config.api_timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), submit_once(client.as_ref(), request))
            .await
            .unwrap_or_else(|_| {
                Err(VerumError::external_call(format!(
                    "The model did not answer within {secs}s"
                )))
            })?,
        None => submit_once(client.as_ref(), request).await?,
    };
    Ok(Report {
        markdown: tidy_report(&report.markdown),
        ..report
    })
}

/// Analyse a prompt and evidence files and return the rendered report.
///
/// # Errors
/// * [`VerumError::InputValidation`] when the prompt is blank and no evidence
///   was given; no call is made.
/// * [`VerumError::ExternalCall`] / [`VerumError::ProviderNotConfigured`]
///   when the single model call fails. Nothing partial is returned.
pub async fn analyze(
    prompt: &str,
    evidence: Vec<EvidenceFile>,
    think_more: bool,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, VerumError> {
    let start = Instant::now();
    let composition = compose_request(prompt, &evidence, think_more, config)?;
    // Evidence bytes now live in the request parts only.
    drop(evidence);
    let plan = RequestPlan::of(&composition.request, &composition.warnings);

    let report = call_model(&composition.request, config).await?;
    let html = render_report(Some(&CmarkRenderer), &report.markdown);
    let styled = styled_html(&html, config.brightness);
    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Analysis complete: {} chars of Markdown from {} in {}ms",
        report.markdown.len(),
        report.model,
        duration_ms
    );

    Ok(AnalysisOutput {
        report,
        html,
        styled_html: styled,
        plan,
        warnings: composition.warnings,
        duration_ms,
    })
}

/// Run one submission through the application state.
///
/// Validation and in-flight refusals are shown as errors on the returned
/// state; a refused in-flight submission leaves the outstanding one as is.
pub async fn submit(state: AppState, config: &AnalysisConfig) -> AppState {
    match state.begin_submit(config) {
        Ok((loading, request)) => {
            let outcome = call_model(&request, config).await;
            loading.finish_submit(outcome)
        }
        Err(e) => {
            debug!("Submission refused: {}", e);
            state.show_error(&e)
        }
    }
}

// ── Export ───────────────────────────────────────────────────────────────

/// How a report is exported.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub brightness: Brightness,
    pub mode: ContentMode,
    pub logo: Option<LogoImage>,
    /// Also write the pre-stamp document next to the sealed one so the seal
    /// can be verified later.
    pub keep_unsealed: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            brightness: Brightness::default(),
            mode: ContentMode::Markdown,
            logo: None,
            keep_unsealed: false,
        }
    }
}

/// Files written by [`export_pdf`].
#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub path: PathBuf,
    pub unsealed_path: Option<PathBuf>,
    pub seal: Seal,
    pub page_count: usize,
}

/// `<stem>.unsealed.pdf` next to a sealed export.
pub fn unsealed_path_for(sealed: &Path) -> PathBuf {
    let stem = sealed
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".into());
    sealed.with_file_name(format!("{stem}.unsealed.pdf"))
}

fn require_report(markdown: &str) -> Result<(), VerumError> {
    if markdown.trim().is_empty() {
        Err(VerumError::NoReport)
    } else {
        Ok(())
    }
}

/// Lay out and seal a report with any backend. Blocking.
pub fn seal_markdown<B: PdfBackend + ?Sized>(
    backend: &B,
    markdown: &str,
    options: &ExportOptions,
    now: DateTime<Utc>,
) -> Result<SealedReport, VerumError> {
    require_report(markdown)?;
    let layout = ReportLayout::build(
        REPORT_TITLE,
        markdown,
        options.mode,
        options.brightness,
        options.logo.clone(),
    );
    seal_document(backend, &layout, now)
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), VerumError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| VerumError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })
}

/// Persist a sealed report into `out_dir`.
pub async fn write_sealed(
    sealed: &SealedReport,
    out_dir: &Path,
    keep_unsealed: bool,
) -> Result<ExportOutcome, VerumError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|source| VerumError::OutputWriteFailed {
            path: out_dir.to_path_buf(),
            source,
        })?;

    let path = out_dir.join(&sealed.filename);
    write_file(&path, &sealed.sealed).await?;

    let unsealed_path = if keep_unsealed {
        let p = unsealed_path_for(&path);
        write_file(&p, &sealed.unsealed).await?;
        Some(p)
    } else {
        None
    };

    info!("Wrote {}", path.display());
    Ok(ExportOutcome {
        path,
        unsealed_path,
        seal: sealed.seal.clone(),
        page_count: sealed.page_count,
    })
}

/// Export a sealed PDF of `markdown` into `out_dir` using pdfium.
///
/// # Errors
/// * [`VerumError::NoReport`] when `markdown` is blank.
/// * [`VerumError::PdfiumBindingFailed`] / [`VerumError::PdfRenderFailed`]
///   for PDF engine failures.
/// * [`VerumError::OutputWriteFailed`] when the file cannot be written.
pub async fn export_pdf(
    markdown: &str,
    out_dir: &Path,
    options: ExportOptions,
) -> Result<ExportOutcome, VerumError> {
    require_report(markdown)?;
    let markdown = markdown.to_string();
    let keep_unsealed = options.keep_unsealed;
    let now = Utc::now();

    let sealed = tokio::task::spawn_blocking(move || {
        let backend = PdfiumBackend::bind()?;
        seal_markdown(&backend, &markdown, &options, now)
    })
    .await
    .map_err(|e| VerumError::Internal(format!("PDF task panicked: {}", e)))??;

    write_sealed(&sealed, out_dir, keep_unsealed).await
}

/// Standalone HTML page for a report, with the brightness colour and logo.
pub fn export_html(
    markdown: &str,
    mode: ContentMode,
    brightness: Brightness,
    logo: Option<&StoredLogo>,
) -> Result<String, VerumError> {
    require_report(markdown)?;
    let renderer: Option<&dyn MarkdownRenderer> = match mode {
        ContentMode::Markdown => Some(&CmarkRenderer),
        ContentMode::Plain => None,
    };
    let body = render_report(renderer, markdown);
    Ok(standalone_html(
        REPORT_TITLE,
        &body,
        brightness,
        logo.map(StoredLogo::data_url),
    ))
}

/// Write [`export_html`] output as `Verum-Omnis-Report-<ms>.html` in `out_dir`.
pub async fn write_html(html: &str, out_dir: &Path, now: DateTime<Utc>) -> Result<PathBuf, VerumError> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|source| VerumError::OutputWriteFailed {
            path: out_dir.to_path_buf(),
            source,
        })?;
    let path = out_dir.join(format!("Verum-Omnis-Report-{}.html", now.timestamp_millis()));
    write_file(&path, html.as_bytes()).await?;
    Ok(path)
}

// ── Verification ─────────────────────────────────────────────────────────

/// Check the seal of `sealed` against the pre-stamp document `unsealed`.
pub async fn verify_export(unsealed: &Path, sealed: &Path) -> Result<Verification, VerumError> {
    let unsealed_bytes = crate::pipeline::evidence::read_bytes(unsealed).await?;
    let sealed_bytes = crate::pipeline::evidence::read_bytes(sealed).await?;

    let verification = tokio::task::spawn_blocking(move || {
        let backend = PdfiumBackend::bind()?;
        verify_sealed(&backend, &unsealed_bytes, &sealed_bytes)
    })
    .await
    .map_err(|e| VerumError::Internal(format!("Verify task panicked: {}", e)))??;

    match &verification {
        Verification::Match { seal } => info!("Seal matches ({})", seal.digest),
        Verification::Mismatch { recomputed, .. } => warn!("Seal mismatch: recomputed {}", recomputed),
        Verification::NoSeal => warn!("No seal found in {}", sealed.display()),
    }
    Ok(verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::model::ModelClient;
    use crate::pipeline::seal::tests::TextBackend;
    use crate::state::Phase;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Canned {
        answer: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelClient for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _request: &ComposedRequest) -> Result<String, VerumError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer
                .map(str::to_string)
                .map_err(VerumError::external_call)
        }
    }

    fn config_with(answer: Result<&'static str, &'static str>) -> (AnalysisConfig, Arc<Canned>) {
        let client = Arc::new(Canned {
            answer,
            calls: AtomicUsize::new(0),
        });
        let config = AnalysisConfig::builder().client(client.clone()).build().unwrap();
        (config, client)
    }

    #[tokio::test]
    async fn analyze_tidies_and_renders() {
        let (config, client) = config_with(Ok("```markdown\n# Executive Summary\r\nBreach found.\n```"));
        let out = analyze("Who breached?", vec![], false, &config).await.unwrap();
        assert_eq!(out.report.markdown, "# Executive Summary\nBreach found.\n");
        assert!(out.html.contains("<h1>Executive Summary</h1>"));
        assert!(out.styled_html.contains("hsl(0, 0%, 82%)"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn analyze_without_input_makes_no_call() {
        let (config, client) = config_with(Ok("unused"));
        let err = analyze("  ", vec![], false, &config).await.unwrap_err();
        assert!(matches!(err, VerumError::InputValidation));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn analyze_surfaces_failure_verbatim() {
        let (config, _) = config_with(Err("API key not valid"));
        let err = analyze("case", vec![], false, &config).await.unwrap_err();
        assert_eq!(err.to_string(), "API key not valid");
    }

    #[tokio::test]
    async fn analyze_reports_skipped_evidence() {
        let (config, _) = config_with(Ok("ok"));
        let files = vec![
            EvidenceFile::new("notes.txt", "text/plain", b"met at 9".to_vec()),
            EvidenceFile::new("archive.zip", "application/zip", vec![0x50, 0x4b]),
        ];
        let out = analyze("", files, false, &config).await.unwrap();
        assert_eq!(out.warnings.len(), 1);
        // instruction, prompt, notes.txt
        assert_eq!(out.plan.parts.len(), 3);
    }

    #[test]
    fn plan_shows_model_and_part_order() {
        let files = vec![
            EvidenceFile::new("contract.pdf", "application/pdf", b"%PDF-1.7".to_vec()),
            EvidenceFile::new("notes.txt", "text/plain", b"line".to_vec()),
        ];
        let p = plan("Review", &files, false, &AnalysisConfig::default()).unwrap();
        assert_eq!(p.model, "gemini-2.5-pro");
        assert_eq!(p.thinking_budget, Some(32768));
        assert!(matches!(&p.parts[0], PartSummary::Text { preview, .. } if preview.starts_with("You are Verum Omnis")));
        assert!(matches!(&p.parts[1], PartSummary::Text { preview, .. } if preview.contains("Review")));
        assert!(matches!(&p.parts[2], PartSummary::InlineData { mime_type, .. } if mime_type == "application/pdf"));
        assert!(matches!(&p.parts[3], PartSummary::Text { preview, .. } if preview.contains("notes.txt")));
    }

    #[tokio::test]
    async fn submit_drives_state_to_report() {
        let (config, _) = config_with(Ok("# Findings"));
        let state = AppState::default().set_prompt("case");
        let done = submit(state, &config).await;
        assert_eq!(done.phase, Phase::Idle);
        assert_eq!(done.report.unwrap().markdown, "# Findings\n");
    }

    #[tokio::test]
    async fn submit_records_failure_without_report() {
        let (config, _) = config_with(Err(""));
        let done = submit(AppState::default().set_prompt("case"), &config).await;
        assert!(done.report.is_none());
        assert_eq!(
            done.error.as_deref(),
            Some("An error occurred while processing your request.")
        );
    }

    #[test]
    fn sealing_requires_a_report() {
        let err = seal_markdown(&TextBackend, " \n", &ExportOptions::default(), Utc::now()).unwrap_err();
        assert!(matches!(err, VerumError::NoReport));
    }

    #[tokio::test]
    async fn sealed_export_is_written_with_epoch_name() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let sealed = seal_markdown(&TextBackend, "# Summary", &ExportOptions::default(), now).unwrap();
        let outcome = write_sealed(&sealed, dir.path(), true).await.unwrap();

        let name = outcome.path.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name, format!("Verum-Omnis-Report-{}.pdf", now.timestamp_millis()));
        let unsealed = std::fs::read(outcome.unsealed_path.unwrap()).unwrap();
        assert!(outcome.seal.matches(&unsealed));
        assert_eq!(std::fs::read(&outcome.path).unwrap(), sealed.sealed);
    }

    #[test]
    fn unsealed_path_sits_next_to_export() {
        assert_eq!(
            unsealed_path_for(Path::new("/out/Verum-Omnis-Report-1.pdf")),
            PathBuf::from("/out/Verum-Omnis-Report-1.unsealed.pdf")
        );
    }

    #[test]
    fn html_export_plain_mode_skips_markdown() {
        let html = export_html("**x**", ContentMode::Plain, Brightness::new(40), None).unwrap();
        assert!(html.contains("**x**"));
        assert!(html.contains("hsl(0, 0%, 32.8%)"));
        assert!(html.contains("<h1>Verum Omnis - Forensic Report</h1>"));
    }

    #[tokio::test]
    async fn html_is_written_with_epoch_name() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let path = write_html("<p>x</p>", dir.path(), now).await.unwrap();
        assert!(path.ends_with(format!("Verum-Omnis-Report-{}.html", now.timestamp_millis())));
    }

    #[test]
    fn preview_marks_truncation() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("two\nlines", 10), "two…");
        assert_eq!(preview("abcdefghijkl", 4), "abcd…");
    }
}
