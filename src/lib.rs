//! # verum-omnis
//!
//! Forensic analysis of evidence files with a hosted language model, rendered
//! to Markdown/HTML and exported as a hash-sealed PDF report.
//!
//! ## Why this crate?
//!
//! The analysis itself is delegated to the model. What this crate pins down
//! is everything around that single call: which model variant a given mix of
//! evidence gets, the exact order of the request parts, what happens when the
//! call fails, and how the exported report is sealed so its content can be
//! checked later.
//!
//! ## Pipeline Overview
//!
//! ```text
//! prompt + evidence
//!  │
//!  ├─ 1. Evidence  images / PDFs → base64 inline data, text → labelled transcript
//!  ├─ 2. Compose   image → fast model; thinking or PDF → pro model + budget
//!  ├─ 3. Model     one call, no retries; failure message surfaced verbatim
//!  ├─ 4. Tidy      strip wrapper fences, normalise whitespace
//!  ├─ 5. Render    Markdown → HTML (plain fallback never fails)
//!  └─ 6. Seal      A4 layout → SHA-256 over pre-stamp bytes → stamp last page
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use verum_omnis::{analyze, export_pdf, AnalysisConfig, EvidenceFile, ExportOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from GEMINI_API_KEY (or API_KEY) at call time
//!     let config = AnalysisConfig::default();
//!     let evidence = vec![EvidenceFile::detect("chat.txt", b"He said he'd pay on Friday.".to_vec())];
//!     let output = analyze("Was the payment promised?", evidence, false, &config).await?;
//!     println!("{}", output.report.markdown);
//!
//!     let export = export_pdf(&output.report.markdown, Path::new("."), ExportOptions::default()).await?;
//!     eprintln!("sealed {} with {}", export.path.display(), export.seal.digest);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `verum` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## Model Selection
//!
//! | Evidence | Thinking toggle | Model | Reasoning budget |
//! |----------|-----------------|-------|------------------|
//! | any image | any | `gemini-2.5-flash` | none |
//! | PDF, no image | any | `gemini-2.5-pro` | 32768 |
//! | text only / none | on | `gemini-2.5-pro` | 32768 |
//! | text only / none | off | `gemini-2.5-flash` | none |
//!
//! ## What the seal proves
//!
//! The digest is computed over the PDF bytes *before* the seal lines are
//! drawn. It authenticates that pre-stamp document, not the final file; see
//! [`pipeline::seal`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod logo;
pub mod pipeline;
pub mod prompts;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, export_html, export_pdf, load_inputs, plan, seal_markdown, submit, unsealed_path_for,
    verify_export, write_html, write_sealed, AnalysisOutput, ExportOptions, ExportOutcome,
    PartSummary, RequestPlan,
};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, Backend};
pub use error::{EvidenceWarning, VerumError};
pub use logo::{LogoStore, StoredLogo};
pub use pipeline::evidence::EvidenceFile;
pub use pipeline::layout::ContentMode;
pub use pipeline::model::{ModelClient, Report};
pub use pipeline::render::Brightness;
pub use pipeline::seal::{PdfBackend, Seal, SealedReport, Verification};
pub use state::{AppState, Phase};
