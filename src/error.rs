//! Error types for the verum-omnis library.
//!
//! Two distinct types reflect two distinct outcomes:
//!
//! * [`VerumError`]: **Fatal**: the current operation (submission, export,
//!   logo update) stops and nothing partial is kept. Every variant is terminal;
//!   nothing is retried automatically.
//!
//! * [`EvidenceWarning`]: **Non-fatal**: an evidence file was skipped while
//!   encoding. The submission still goes ahead with the remaining parts, but
//!   the caller is told what was left out instead of losing it silently.

use std::path::PathBuf;
use thiserror::Error;

/// Message surfaced when a model failure carries no message of its own.
pub const GENERIC_CALL_FAILURE: &str = "An error occurred while processing your request.";

/// All fatal errors returned by the verum-omnis library.
#[derive(Debug, Error)]
pub enum VerumError {
    // ── Submission errors ─────────────────────────────────────────────────
    /// Neither a prompt nor any evidence file was supplied.
    #[error("Please provide a case description or upload evidence files.")]
    InputValidation,

    /// A submission was started while another one is still outstanding.
    #[error("An analysis is already in progress; wait for it to finish.")]
    SubmissionInFlight,

    /// The external model call failed (network, auth, quota, malformed reply).
    #[error("{message}")]
    ExternalCall { message: String },

    /// The configured provider cannot be used (missing API key etc.).
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Evidence / input errors ───────────────────────────────────────────
    /// Evidence or logo file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Reading an evidence file failed after it was opened.
    #[error("Failed to read evidence '{name}': {reason}")]
    EvidenceReadFailed { name: String, reason: String },

    /// An evidence URL could not be downloaded.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    // ── Logo errors ───────────────────────────────────────────────────────
    /// The logo upload was not a PNG image; the stored logo is unchanged.
    #[error("Please upload a PNG file for the logo (got {mime} from '{path}').")]
    UnsupportedLogoFormat { path: PathBuf, mime: String },

    /// The persisted state file could not be read or written.
    #[error("State store error at '{path}': {reason}")]
    StateStore { path: PathBuf, reason: String },

    // ── Export errors ─────────────────────────────────────────────────────
    /// Export was requested but no report is held.
    #[error("There is no report to export; run an analysis first.")]
    NoReport,

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or install libpdfium where the\n\
system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    /// pdfium rejected a document operation.
    #[error("PDF {stage} failed: {detail}")]
    PdfRenderFailed { stage: &'static str, detail: String },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VerumError {
    /// Wrap a model failure, substituting the generic message when empty.
    pub fn external_call(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            VerumError::ExternalCall {
                message: GENERIC_CALL_FAILURE.to_string(),
            }
        } else {
            VerumError::ExternalCall { message }
        }
    }
}

/// A non-fatal problem with a single evidence file.
///
/// Returned next to the encoded parts so the caller can show it; the
/// submission continues without the file.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum EvidenceWarning {
    /// The file's MIME type is neither image/*, application/pdf nor text/*.
    #[error("Evidence '{name}' was skipped: unsupported type {mime}")]
    UnsupportedMime { name: String, mime: String },
}
