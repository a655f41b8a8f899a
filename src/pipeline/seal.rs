//! Report sealing: digest the unsealed document, then stamp the digest on it.
//!
//! The procedure is strictly ordered:
//!
//! 1. The backend serialises the laid-out report (title, logo, content) to
//!    PDF bytes: the **pre-stamp document**.
//! 2. SHA-256 over exactly those bytes gives the hex digest.
//! 3. Two lines are stamped at the bottom of the last page:
//!    `Cryptographic Seal (SHA-256): <64 hex>` and `Generated: <ISO-8601>`.
//! 4. The stamped document is saved as `Verum-Omnis-Report-<epoch-ms>.pdf`.
//!
//! The seal therefore authenticates the pre-stamp content, not the final
//! file. Anyone holding the pre-stamp bytes can recompute the digest and
//! compare it with the stamped one ([`verify_sealed`]); the stamped file on
//! its own cannot be checked against its own seal.

use crate::error::VerumError;
use crate::pipeline::layout::{seal_runs, PageGeometry, ReportLayout, TextRun};
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

/// Label preceding the digest in the stamp.
pub const SEAL_LABEL: &str = "Cryptographic Seal (SHA-256)";

/// Document backend: lays out pages, stamps them, reads them back.
///
/// The pdfium implementation lives in [`crate::pipeline::pdf`]; tests use
/// in-memory fakes.
pub trait PdfBackend {
    /// Serialise the unsealed document.
    fn paginate(&self, layout: &ReportLayout) -> Result<Vec<u8>, VerumError>;

    /// Draw `runs` on the last page of `unsealed` and serialise the result.
    fn stamp(
        &self,
        unsealed: &[u8],
        geometry: &PageGeometry,
        runs: &[TextRun],
    ) -> Result<Vec<u8>, VerumError>;

    /// Extract the text of the last page of a document.
    fn last_page_text(&self, document: &[u8]) -> Result<String, VerumError>;
}

/// Lowercase hex SHA-256 of `bytes`, two characters per byte.
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `Verum-Omnis-Report-<epoch-ms>.pdf`
pub fn export_filename(at: DateTime<Utc>) -> String {
    format!("Verum-Omnis-Report-{}.pdf", at.timestamp_millis())
}

/// Digest plus generation time, as embedded in the exported document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seal {
    pub digest: String,
    pub generated_at: DateTime<Utc>,
}

impl Seal {
    /// Seal the given pre-stamp bytes.
    pub fn compute(pre_stamp: &[u8], generated_at: DateTime<Utc>) -> Self {
        Self {
            digest: digest_hex(pre_stamp),
            generated_at,
        }
    }

    /// ISO-8601 UTC timestamp with milliseconds, e.g. `2026-10-18T09:30:00.000Z`.
    pub fn timestamp(&self) -> String {
        self.generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// The stamped text, one entry per line.
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("{SEAL_LABEL}: {}", self.digest),
            format!("Generated: {}", self.timestamp()),
        ]
    }

    /// Whether `pre_stamp` hashes to this seal's digest.
    pub fn matches(&self, pre_stamp: &[u8]) -> bool {
        digest_hex(pre_stamp) == self.digest
    }

    /// Find a seal in extracted document text.
    ///
    /// The stamp is drawn after the report content, so the last digest line
    /// wins and the timestamp is read from the text following it.
    pub fn parse(text: &str) -> Option<Self> {
        let caps = RE_DIGEST.captures_iter(text).last()?;
        let digest = caps[1].to_string();
        let tail = &text[caps.get(0)?.end()..];
        let generated_at = RE_GENERATED
            .captures(tail)
            .and_then(|caps| DateTime::parse_from_rfc3339(&caps[1]).ok())?
            .with_timezone(&Utc);
        Some(Self {
            digest,
            generated_at,
        })
    }
}

static RE_DIGEST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Cryptographic Seal \(SHA-256\):\s*([0-9a-f]{64})").unwrap()
});

static RE_GENERATED: Lazy<Regex> = Lazy::new(|| Regex::new(r"Generated:\s*(\S+)").unwrap());

/// Output of the sealing procedure.
#[derive(Debug, Clone)]
pub struct SealedReport {
    pub filename: String,
    pub seal: Seal,
    pub page_count: usize,
    /// The exact bytes the digest was computed over.
    pub unsealed: Vec<u8>,
    /// The stamped document to persist.
    pub sealed: Vec<u8>,
}

/// Run the digest-before-stamp procedure.
pub fn seal_document<B: PdfBackend + ?Sized>(
    backend: &B,
    layout: &ReportLayout,
    now: DateTime<Utc>,
) -> Result<SealedReport, VerumError> {
    let unsealed = backend.paginate(layout)?;
    let seal = Seal::compute(&unsealed, now);
    debug!(
        "Pre-stamp document: {} bytes, {} pages, digest {}",
        unsealed.len(),
        layout.page_count(),
        seal.digest
    );

    let runs = seal_runs(&layout.geometry, &seal.lines());
    let sealed = backend.stamp(&unsealed, &layout.geometry, &runs)?;
    let filename = export_filename(now);
    info!("Sealed report {} ({} bytes)", filename, sealed.len());

    Ok(SealedReport {
        filename,
        seal,
        page_count: layout.page_count(),
        unsealed,
        sealed,
    })
}

/// Result of checking a sealed document against its pre-stamp bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Verification {
    /// Recomputed digest equals the stamped one.
    Match { seal: Seal },
    /// The pre-stamp bytes do not hash to the stamped digest.
    Mismatch { embedded: Seal, recomputed: String },
    /// No seal text was found on the last page.
    NoSeal,
}

/// Recompute the digest over `unsealed` and compare it with the seal
/// stamped on the last page of `sealed`.
pub fn verify_sealed<B: PdfBackend + ?Sized>(
    backend: &B,
    unsealed: &[u8],
    sealed: &[u8],
) -> Result<Verification, VerumError> {
    let text = backend.last_page_text(sealed)?;
    let Some(embedded) = Seal::parse(&text) else {
        return Ok(Verification::NoSeal);
    };
    let recomputed = digest_hex(unsealed);
    if recomputed == embedded.digest {
        Ok(Verification::Match { seal: embedded })
    } else {
        Ok(Verification::Mismatch {
            embedded,
            recomputed,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pipeline::layout::ContentMode;
    use crate::pipeline::render::Brightness;
    use chrono::TimeZone;

    /// Backend that "renders" to a text serialisation of the layout.
    pub(crate) struct TextBackend;

    impl PdfBackend for TextBackend {
        fn paginate(&self, layout: &ReportLayout) -> Result<Vec<u8>, VerumError> {
            let mut out = b"%PDF-text\n".to_vec();
            for (i, page) in layout.pages.iter().enumerate() {
                out.extend(format!("--- page {} ---\n", i + 1).bytes());
                for run in &page.runs {
                    out.extend(format!("{}@{:.1}:{}\n", run.gray, run.baseline, run.text).bytes());
                }
            }
            Ok(out)
        }

        fn stamp(
            &self,
            unsealed: &[u8],
            _geometry: &PageGeometry,
            runs: &[TextRun],
        ) -> Result<Vec<u8>, VerumError> {
            let mut out = unsealed.to_vec();
            for run in runs {
                out.extend(format!("{}\n", run.text).bytes());
            }
            Ok(out)
        }

        fn last_page_text(&self, document: &[u8]) -> Result<String, VerumError> {
            let text = String::from_utf8_lossy(document);
            Ok(text.rsplit("--- page").next().unwrap_or_default().to_string())
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
    }

    fn layout(md: &str) -> ReportLayout {
        ReportLayout::build("Verum Omnis - Forensic Report", md, ContentMode::Markdown, Brightness::default(), None)
    }

    #[test]
    fn digest_is_lowercase_zero_padded_hex() {
        assert_eq!(
            digest_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let d = digest_hex(b"abc");
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn filename_uses_epoch_millis() {
        assert_eq!(export_filename(at()), "Verum-Omnis-Report-1792315800000.pdf");
    }

    #[test]
    fn lines_follow_stamp_format() {
        let seal = Seal::compute(b"doc", at());
        let lines = seal.lines();
        assert_eq!(lines[0], format!("Cryptographic Seal (SHA-256): {}", digest_hex(b"doc")));
        assert_eq!(lines[1], "Generated: 2026-10-18T09:30:00.000Z");
    }

    #[test]
    fn seal_round_trips_over_pre_stamp_bytes() {
        let sealed = seal_document(&TextBackend, &layout("# Summary\nFindings."), at()).unwrap();
        assert_eq!(sealed.seal.digest, digest_hex(&sealed.unsealed));
        assert!(sealed.seal.matches(&sealed.unsealed));
        // The stamp is not covered by its own digest.
        assert!(!sealed.seal.matches(&sealed.sealed));
        assert!(sealed.sealed.starts_with(&sealed.unsealed));
    }

    #[test]
    fn verify_accepts_untouched_and_rejects_tampered() {
        let sealed = seal_document(&TextBackend, &layout("Timeline"), at()).unwrap();
        let ok = verify_sealed(&TextBackend, &sealed.unsealed, &sealed.sealed).unwrap();
        assert_eq!(ok, Verification::Match { seal: sealed.seal.clone() });

        let mut tampered = sealed.unsealed.clone();
        tampered.push(b'!');
        match verify_sealed(&TextBackend, &tampered, &sealed.sealed).unwrap() {
            Verification::Mismatch { embedded, recomputed } => {
                assert_eq!(embedded.digest, sealed.seal.digest);
                assert_ne!(recomputed, embedded.digest);
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn verify_without_seal_reports_none() {
        let doc = TextBackend.paginate(&layout("x")).unwrap();
        assert_eq!(verify_sealed(&TextBackend, &doc, &doc).unwrap(), Verification::NoSeal);
    }

    #[test]
    fn parse_tolerates_extraction_whitespace() {
        let digest = digest_hex(b"x");
        let text = format!("junk\r\nCryptographic Seal (SHA-256):  {digest}\r\nGenerated: 2026-10-18T09:30:00.000Z\r\n");
        let seal = Seal::parse(&text).unwrap();
        assert_eq!(seal.digest, digest);
        assert_eq!(seal.generated_at, at());
    }

    #[test]
    fn parse_rejects_short_digest() {
        assert!(Seal::parse("Cryptographic Seal (SHA-256): abc123\nGenerated: 2026-10-18T09:30:00.000Z").is_none());
    }

    #[test]
    fn report_text_resembling_the_stamp_does_not_hide_the_seal() {
        let md = "Conclusion.\n\nGenerated: by the claimant's accountant";
        let sealed = seal_document(&TextBackend, &layout(md), at()).unwrap();
        let ok = verify_sealed(&TextBackend, &sealed.unsealed, &sealed.sealed).unwrap();
        assert_eq!(ok, Verification::Match { seal: sealed.seal.clone() });
    }

    #[test]
    fn parse_prefers_the_last_digest_line() {
        let quoted = digest_hex(b"quoted");
        let real = digest_hex(b"real");
        let text = format!(
            "Cryptographic Seal (SHA-256): {quoted}\nGenerated: 2020-01-01T00:00:00.000Z\n\
             Cryptographic Seal (SHA-256): {real}\nGenerated: 2026-10-18T09:30:00.000Z\n"
        );
        let seal = Seal::parse(&text).unwrap();
        assert_eq!(seal.digest, real);
        assert_eq!(seal.generated_at, at());
    }
}
