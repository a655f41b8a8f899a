//! Integration tests for verum-omnis.
//!
//! The first group runs offline against the public API with in-memory
//! model clients and document backends. The second group needs a pdfium
//! library and/or a live Gemini key and is gated behind `E2E_ENABLED`.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=/path/to/libpdfium cargo test --test e2e -- --nocapture
//!
//! Live model tests additionally need GEMINI_API_KEY.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use verum_omnis::pipeline::compose::{ComposedRequest, RequestPart};
use verum_omnis::pipeline::layout::{PageGeometry, ReportLayout, TextRun};
use verum_omnis::pipeline::seal::{digest_hex, verify_sealed};
use verum_omnis::{
    analyze, export_pdf, plan, seal_markdown, submit, verify_export, AnalysisConfig, AppState,
    EvidenceFile, EvidenceWarning, ExportOptions, LogoStore, ModelClient, PartSummary, PdfBackend,
    Verification, VerumError,
};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("target/e2e-output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test unless E2E_ENABLED is set.
macro_rules! e2e_skip_unless_enabled {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
}

/// Skip this test unless E2E_ENABLED and a Gemini key are both set.
macro_rules! e2e_skip_unless_live {
    () => {{
        e2e_skip_unless_enabled!();
        if std::env::var("GEMINI_API_KEY").is_err() && std::env::var("API_KEY").is_err() {
            println!("SKIP: set GEMINI_API_KEY to run live model tests");
            return;
        }
    }};
}

/// Records every request it sees and answers with a fixed result.
struct RecordingClient {
    answer: Result<String, String>,
    requests: Mutex<Vec<ComposedRequest>>,
}

impl RecordingClient {
    fn answering(answer: Result<&str, &str>) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.map(str::to_string).map_err(str::to_string),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for RecordingClient {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, request: &ComposedRequest) -> Result<String, VerumError> {
        self.requests.lock().unwrap().push(request.clone());
        self.answer.clone().map_err(VerumError::external_call)
    }
}

fn config_for(client: &Arc<RecordingClient>) -> AnalysisConfig {
    AnalysisConfig::builder()
        .client(client.clone())
        .build()
        .unwrap()
}

fn image() -> EvidenceFile {
    EvidenceFile::new("scene.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0])
}

fn pdf() -> EvidenceFile {
    EvidenceFile::new("contract.pdf", "application/pdf", b"%PDF-1.7\n".to_vec())
}

fn text(name: &str, body: &str) -> EvidenceFile {
    EvidenceFile::new(name, "text/plain", body.as_bytes().to_vec())
}

/// Document backend serialising runs as text, one line each.
struct LineBackend;

impl PdfBackend for LineBackend {
    fn paginate(&self, layout: &ReportLayout) -> Result<Vec<u8>, VerumError> {
        let mut out = String::from("%PDF-lines\n");
        for page in &layout.pages {
            out.push_str("<page>\n");
            for run in &page.runs {
                out.push_str(&run.text);
                out.push('\n');
            }
        }
        Ok(out.into_bytes())
    }

    fn stamp(&self, unsealed: &[u8], _geometry: &PageGeometry, runs: &[TextRun]) -> Result<Vec<u8>, VerumError> {
        let mut out = unsealed.to_vec();
        for run in runs {
            out.extend_from_slice(run.text.as_bytes());
            out.push(b'\n');
        }
        Ok(out)
    }

    fn last_page_text(&self, document: &[u8]) -> Result<String, VerumError> {
        let text = String::from_utf8_lossy(document);
        Ok(text.rsplit("<page>").next().unwrap_or_default().to_string())
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    let img = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(width, height, Rgba([0, 80, 160, 255])));
    let mut out = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

// ── Model selection (no network) ─────────────────────────────────────────────

#[test]
fn test_image_forces_fast_model_regardless_of_thinking_or_pdf() {
    let config = AnalysisConfig::default();
    for think in [false, true] {
        for files in [vec![image()], vec![image(), pdf()], vec![pdf(), image()]] {
            let p = plan("q", &files, think, &config).unwrap();
            assert_eq!(p.model, "gemini-2.5-flash");
            assert_eq!(p.thinking_budget, None);
        }
    }
}

#[test]
fn test_pdf_or_thinking_selects_pro_with_budget() {
    let config = AnalysisConfig::default();
    let with_pdf = plan("q", &[pdf(), text("a.txt", "x")], false, &config).unwrap();
    assert_eq!(with_pdf.model, "gemini-2.5-pro");
    assert_eq!(with_pdf.thinking_budget, Some(32768));

    let thinking = plan("q", &[], true, &config).unwrap();
    assert_eq!(thinking.model, "gemini-2.5-pro");
    assert_eq!(thinking.thinking_budget, Some(32768));
}

#[test]
fn test_plain_request_uses_fast_model_without_budget() {
    let p = plan("q", &[text("a.txt", "x")], false, &AnalysisConfig::default()).unwrap();
    assert_eq!(p.model, "gemini-2.5-flash");
    assert_eq!(p.thinking_budget, None);
}

// ── Request composition ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_parts_are_instruction_prompt_then_evidence_in_upload_order() {
    let client = RecordingClient::answering(Ok("# Report"));
    let files = vec![
        text("first.txt", "alpha"),
        pdf(),
        EvidenceFile::new("skip.bin", "application/octet-stream", vec![1, 2, 3]),
        text("last.txt", "omega"),
    ];
    let out = analyze("Who signed?", files, false, &config_for(&client))
        .await
        .unwrap();

    assert_eq!(
        out.warnings,
        vec![EvidenceWarning::UnsupportedMime {
            name: "skip.bin".into(),
            mime: "application/octet-stream".into(),
        }]
    );

    let requests = client.requests.lock().unwrap();
    let parts = requests[0].parts();
    assert_eq!(parts.len(), 5);
    assert!(parts[0].as_text().unwrap().starts_with("You are Verum Omnis"));
    assert!(parts[1].as_text().unwrap().contains("\"Who signed?\""));
    assert_eq!(parts[2].as_text(), Some("\n--- Evidence File: first.txt ---\nalpha"));
    assert!(matches!(&parts[3], RequestPart::InlineData(d) if d.mime_type == "application/pdf"));
    assert_eq!(parts[4].as_text(), Some("\n--- Evidence File: last.txt ---\nomega"));
}

#[tokio::test]
async fn test_empty_prompt_gets_placeholder_when_evidence_present() {
    let client = RecordingClient::answering(Ok("ok"));
    analyze("", vec![text("n.txt", "x")], false, &config_for(&client))
        .await
        .unwrap();
    let requests = client.requests.lock().unwrap();
    assert!(requests[0].parts()[1]
        .as_text()
        .unwrap()
        .contains("No specific question provided."));
}

#[tokio::test]
async fn test_no_prompt_and_no_evidence_is_rejected_without_a_call() {
    let client = RecordingClient::answering(Ok("unused"));
    let err = analyze(" \t", vec![], true, &config_for(&client))
        .await
        .unwrap_err();
    assert!(matches!(err, VerumError::InputValidation));
    assert_eq!(
        err.to_string(),
        "Please provide a case description or upload evidence files."
    );
    assert_eq!(client.calls(), 0);
}

#[test]
fn test_plan_lists_every_part() {
    let p = plan("q", &[image(), text("t.txt", "body")], false, &AnalysisConfig::default()).unwrap();
    assert_eq!(p.parts.len(), 4);
    assert!(matches!(&p.parts[2], PartSummary::InlineData { mime_type, .. } if mime_type == "image/jpeg"));
}

// ── Failure contract ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_failure_is_single_attempt_and_leaves_no_report() {
    let client = RecordingClient::answering(Err("Resource has been exhausted (e.g. check quota)."));
    let state = AppState::default()
        .set_prompt("case")
        .add_files([text("a.txt", "x")]);
    let done = submit(state, &config_for(&client)).await;

    assert_eq!(client.calls(), 1);
    assert!(done.report.is_none());
    assert!(!done.is_loading());
    assert_eq!(
        done.error.as_deref(),
        Some("Resource has been exhausted (e.g. check quota).")
    );
    // Evidence stays selected for a retry by the user.
    assert_eq!(done.files.len(), 1);
}

#[tokio::test]
async fn test_new_submission_replaces_previous_report() {
    let first = RecordingClient::answering(Ok("first"));
    let second = RecordingClient::answering(Err(""));
    let state = submit(AppState::default().set_prompt("case"), &config_for(&first)).await;
    assert_eq!(state.report.as_ref().unwrap().markdown, "first\n");

    let state = submit(state, &config_for(&second)).await;
    assert!(state.report.is_none());
    assert_eq!(
        state.error.as_deref(),
        Some("An error occurred while processing your request.")
    );
}

// ── Sealing (in-memory backend) ──────────────────────────────────────────────

#[test]
fn test_seal_digest_covers_pre_stamp_bytes() {
    let sealed = seal_markdown(
        &LineBackend,
        "# Executive Summary\n\nThe invoice was altered.",
        &ExportOptions::default(),
        Utc::now(),
    )
    .unwrap();

    assert_eq!(sealed.seal.digest, digest_hex(&sealed.unsealed));
    assert_eq!(sealed.seal.digest.len(), 64);

    let stamped = String::from_utf8(sealed.sealed.clone()).unwrap();
    assert!(stamped.contains(&format!("Cryptographic Seal (SHA-256): {}", sealed.seal.digest)));
    assert!(stamped.contains("Generated: "));
    assert!(stamped.contains("Verum Omnis - Forensic Report"));
    assert!(sealed.filename.starts_with("Verum-Omnis-Report-"));
    assert!(sealed.filename.ends_with(".pdf"));

    assert!(matches!(
        verify_sealed(&LineBackend, &sealed.unsealed, &sealed.sealed).unwrap(),
        Verification::Match { .. }
    ));
}

#[test]
fn test_seal_detects_altered_content() {
    let sealed = seal_markdown(&LineBackend, "Original finding.", &ExportOptions::default(), Utc::now()).unwrap();
    let forged = seal_markdown(&LineBackend, "Altered finding.", &ExportOptions::default(), Utc::now()).unwrap();
    assert!(matches!(
        verify_sealed(&LineBackend, &forged.unsealed, &sealed.sealed).unwrap(),
        Verification::Mismatch { .. }
    ));
}

// ── Logo ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_non_png_logo_is_rejected_and_previous_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogoStore::new(dir.path().join("state.json"));

    let logo_path = dir.path().join("logo.png");
    std::fs::write(&logo_path, png(12, 6)).unwrap();
    let stored = store.set_from_file(&logo_path).await.unwrap();

    let gif_path = dir.path().join("logo.gif");
    std::fs::write(&gif_path, b"GIF89a\x01\x00\x01\x00").unwrap();
    let err = store.set_from_file(&gif_path).await.unwrap_err();
    assert!(matches!(err, VerumError::UnsupportedLogoFormat { .. }));
    assert!(err.to_string().starts_with("Please upload a PNG file for the logo"));

    assert_eq!(store.load().await.unwrap(), Some(stored));
}

#[tokio::test]
async fn test_stored_logo_is_laid_out_on_export() {
    let dir = tempfile::tempdir().unwrap();
    let store = LogoStore::new(dir.path().join("state.json"));
    let stored = store.set_png(Path::new("logo.png"), &png(40, 20)).await.unwrap();

    let options = ExportOptions {
        logo: Some(stored.to_image().unwrap()),
        ..ExportOptions::default()
    };
    let layout = verum_omnis::pipeline::layout::ReportLayout::build(
        "T",
        "body",
        options.mode,
        options.brightness,
        options.logo.clone(),
    );
    assert!(layout.logo.is_some());
}

// ── pdfium (E2E_ENABLED) ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_pdfium_export_and_verify() {
    e2e_skip_unless_enabled!();

    let markdown = "# Executive Summary\n\nThe deposit was never returned.\n\n\
| Date | Event |\n|------|-------|\n| 1 May | Lease signed |\n| 2 June | Deposit withheld |\n\n\
- Landlord ignored three letters\n- Photos show no damage\n";
    let dir = output_dir();
    let outcome = export_pdf(
        markdown,
        &dir,
        ExportOptions {
            keep_unsealed: true,
            ..ExportOptions::default()
        },
    )
    .await
    .expect("export_pdf() should succeed");

    let sealed = std::fs::read(&outcome.path).unwrap();
    assert!(sealed.starts_with(b"%PDF"));
    let unsealed_path = outcome.unsealed_path.clone().unwrap();
    assert!(outcome.seal.matches(&std::fs::read(&unsealed_path).unwrap()));

    match verify_export(&unsealed_path, &outcome.path).await.unwrap() {
        Verification::Match { seal } => assert_eq!(seal.digest, outcome.seal.digest),
        other => panic!("expected a matching seal, got {other:?}"),
    }
    println!("Sealed: {} ({})", outcome.path.display(), outcome.seal.digest);
}

#[tokio::test]
async fn test_pdfium_long_report_spans_pages() {
    e2e_skip_unless_enabled!();

    let markdown = (1..=300)
        .map(|i| format!("{i}. Entry {i} of the evidence log, recorded and cross-checked."))
        .collect::<Vec<_>>()
        .join("\n");
    let outcome = export_pdf(&markdown, &output_dir(), ExportOptions::default())
        .await
        .unwrap();
    assert!(outcome.page_count > 1, "expected several pages, got {}", outcome.page_count);
}

// ── Live model (E2E_ENABLED + GEMINI_API_KEY) ────────────────────────────────

#[tokio::test]
async fn test_live_gemini_text_analysis() {
    e2e_skip_unless_live!();

    let evidence = vec![text(
        "messages.txt",
        "Mon 09:14 A: I'll transfer the 500 by Friday.\nSat 11:02 B: Nothing arrived.\nSat 11:40 A: I never promised that.",
    )];
    let out = analyze(
        "Was a payment promised, and was the promise kept?",
        evidence,
        false,
        &AnalysisConfig::default(),
    )
    .await
    .expect("analyze() should succeed");

    let md = &out.report.markdown;
    assert!(!md.trim().is_empty());
    assert!(md.ends_with('\n'));
    assert!(md.lines().any(|l| l.starts_with('#')), "expected headings");
    println!("{md}");
}
