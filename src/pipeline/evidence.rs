//! Evidence loading and encoding: file bytes → inline request parts.
//!
//! The model API accepts binary evidence inline as base64 alongside its MIME
//! type, and plain text as ordinary text parts. Which of the two a file
//! becomes depends only on its declared MIME type:
//!
//! | MIME type | Part |
//! |-----------|------|
//! | `image/*`, `application/pdf` | `inlineData { mimeType, data: base64 }` |
//! | `text/*` | text wrapped in a `--- Evidence File: <name> ---` delimiter |
//! | anything else | no part; an [`EvidenceWarning`] is returned instead |
//!
//! No size cap is applied: the provider is the only judge of payload size.

use crate::error::{EvidenceWarning, VerumError};
use crate::pipeline::compose::RequestPart;
use crate::prompts::evidence_transcript;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A user-supplied evidence file. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceFile {
    name: String,
    mime: String,
    bytes: Vec<u8>,
}

impl EvidenceFile {
    /// Create an evidence file with an explicit MIME type.
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into().trim().to_ascii_lowercase(),
            bytes,
        }
    }

    /// Create an evidence file, guessing the MIME type from name and content.
    pub fn detect(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime = guess_mime(&name, &bytes);
        Self::new(name, mime, bytes)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> EvidenceKind {
        EvidenceKind::of(&self.mime)
    }
}

/// How an evidence file is treated, derived from its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceKind {
    Image,
    Pdf,
    Text,
    Unsupported,
}

impl EvidenceKind {
    pub fn of(mime: &str) -> Self {
        if mime.starts_with("image/") {
            EvidenceKind::Image
        } else if mime == "application/pdf" {
            EvidenceKind::Pdf
        } else if mime.starts_with("text/") {
            EvidenceKind::Text
        } else {
            EvidenceKind::Unsupported
        }
    }
}

/// Result of encoding a whole evidence list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedEvidence {
    /// Parts in the same order as the input files (skipped files leave no gap).
    pub parts: Vec<RequestPart>,
    /// One entry per skipped file.
    pub warnings: Vec<EvidenceWarning>,
}

/// Encode one evidence file.
///
/// Returns `Err` with a warning when the MIME type is unsupported; that
/// outcome is never fatal to a submission.
pub fn encode_file(file: &EvidenceFile) -> Result<RequestPart, EvidenceWarning> {
    match file.kind() {
        EvidenceKind::Image | EvidenceKind::Pdf => {
            let data = STANDARD.encode(file.bytes());
            debug!(
                "Encoded '{}' ({}) → {} bytes base64",
                file.name(),
                file.mime(),
                data.len()
            );
            Ok(RequestPart::inline(file.mime(), data))
        }
        EvidenceKind::Text => {
            let text = String::from_utf8_lossy(file.bytes());
            debug!("Transcribed '{}' → {} chars", file.name(), text.len());
            Ok(RequestPart::text(evidence_transcript(file.name(), &text)))
        }
        EvidenceKind::Unsupported => {
            warn!(
                "Skipping evidence '{}': unsupported type {}",
                file.name(),
                file.mime()
            );
            Err(EvidenceWarning::UnsupportedMime {
                name: file.name().to_string(),
                mime: file.mime().to_string(),
            })
        }
    }
}

/// Encode every evidence file, preserving upload order.
pub fn encode_all(files: &[EvidenceFile]) -> EncodedEvidence {
    let mut encoded = EncodedEvidence::default();
    for file in files {
        match encode_file(file) {
            Ok(part) => encoded.parts.push(part),
            Err(warning) => encoded.warnings.push(warning),
        }
    }
    encoded
}

// ── Loading ──────────────────────────────────────────────────────────────

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load an evidence file from a local path or an HTTP/HTTPS URL.
pub async fn load_evidence(input: &str, timeout_secs: u64) -> Result<EvidenceFile, VerumError> {
    if is_url(input) {
        download_evidence(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a local file fully, mapping the common failures to typed errors.
pub async fn read_local(path: &Path) -> Result<EvidenceFile, VerumError> {
    let bytes = read_bytes(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let file = EvidenceFile::detect(name, bytes);
    debug!(
        "Loaded evidence {} ({}, {} bytes)",
        path.display(),
        file.mime(),
        file.bytes().len()
    );
    Ok(file)
}

pub(crate) async fn read_bytes(path: &Path) -> Result<Vec<u8>, VerumError> {
    tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => VerumError::FileNotFound {
            path: PathBuf::from(path),
        },
        std::io::ErrorKind::PermissionDenied => VerumError::PermissionDenied {
            path: PathBuf::from(path),
        },
        _ => VerumError::EvidenceReadFailed {
            name: path.display().to_string(),
            reason: e.to_string(),
        },
    })
}

/// Download evidence into memory. MIME comes from `Content-Type` when the
/// server sends a specific one, else from the URL and content.
async fn download_evidence(url: &str, timeout_secs: u64) -> Result<EvidenceFile, VerumError> {
    info!("Downloading evidence: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| VerumError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| VerumError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(VerumError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|v| !v.is_empty() && v != "application/octet-stream");

    let bytes = response
        .bytes()
        .await
        .map_err(|e| VerumError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?
        .to_vec();

    let name = url_file_name(url);
    let file = match content_type {
        Some(mime) => EvidenceFile::new(name, mime, bytes),
        None => EvidenceFile::detect(name, bytes),
    };
    debug!("Downloaded {} bytes ({})", file.bytes().len(), file.mime());
    Ok(file)
}

fn url_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .find(|segment| !segment.is_empty() && !segment.contains(':'))
        .unwrap_or("download")
        .to_string()
}

// ── MIME detection ───────────────────────────────────────────────────────

/// Guess a MIME type from the file extension, falling back to magic bytes.
pub fn guess_mime(name: &str, bytes: &[u8]) -> String {
    mime_from_extension(name)
        .or_else(|| sniff_mime(bytes))
        .unwrap_or("application/octet-stream")
        .to_string()
}

fn mime_from_extension(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "htm" | "html" => "text/html",
        "xml" => "text/xml",
        "json" => "application/json",
        "zip" => "application/zip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    };
    Some(mime)
}

/// Identify a handful of formats from their leading bytes.
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
    if bytes.starts_with(PNG) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.starts_with(b"%PDF") {
        Some("application/pdf")
    } else {
        None
    }
}
