//! Persisted company logo.
//!
//! The logo lives in a small JSON state file under a single key,
//! `companyLogo`, as a `data:image/png;base64,...` URL. It is read when a
//! report is exported (and drawn on the first page before sealing), written
//! when a new logo is set and removed when it is cleared.
//!
//! Only PNG uploads are accepted. Anything else fails with
//! [`VerumError::UnsupportedLogoFormat`] and the stored logo is left exactly
//! as it was.

use crate::config::AnalysisConfig;
use crate::error::VerumError;
use crate::pipeline::evidence::{guess_mime, read_bytes, sniff_mime};
use crate::pipeline::layout::LogoImage;
use base64::{engine::general_purpose::STANDARD, Engine};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Key of the logo entry in the state file.
pub const LOGO_KEY: &str = "companyLogo";

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(rename = "companyLogo", default, skip_serializing_if = "Option::is_none")]
    company_logo: Option<String>,
    /// Keys written by other versions are carried through untouched.
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

/// A stored logo, held as its data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLogo {
    data_url: String,
}

impl StoredLogo {
    fn from_png(png: &[u8]) -> Self {
        Self {
            data_url: format!("{DATA_URL_PREFIX}{}", STANDARD.encode(png)),
        }
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    /// Raw PNG bytes.
    pub fn png_bytes(&self) -> Result<Vec<u8>, VerumError> {
        let payload = self
            .data_url
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| VerumError::Internal("stored logo is not a PNG data URL".into()))?;
        STANDARD
            .decode(payload)
            .map_err(|e| VerumError::Internal(format!("stored logo is not valid base64: {e}")))
    }

    /// Decode into the image the PDF backend draws.
    pub fn to_image(&self) -> Result<LogoImage, VerumError> {
        let png = self.png_bytes()?;
        let (width_px, height_px) = png_dimensions(&png)
            .map_err(|reason| VerumError::Internal(format!("stored logo does not decode: {reason}")))?;
        Ok(LogoImage {
            png,
            width_px,
            height_px,
        })
    }
}

fn png_dimensions(bytes: &[u8]) -> Result<(u32, u32), String> {
    let image = image::load_from_memory_with_format(bytes, ImageFormat::Png).map_err(|e| e.to_string())?;
    Ok((image.width(), image.height()))
}

/// Accept `bytes` only if both the declared type (from the file name) and
/// the content are PNG.
pub fn validate_png(path: &Path, bytes: &[u8]) -> Result<(u32, u32), VerumError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let declared = guess_mime(&name, bytes);
    let sniffed = sniff_mime(bytes);

    if declared != "image/png" || sniffed != Some("image/png") {
        let mime = if declared != "image/png" {
            declared
        } else {
            sniffed.unwrap_or("application/octet-stream").to_string()
        };
        return Err(VerumError::UnsupportedLogoFormat {
            path: path.to_path_buf(),
            mime,
        });
    }

    png_dimensions(bytes).map_err(|reason| {
        debug!("Logo {} has a PNG signature but does not decode: {}", path.display(), reason);
        VerumError::UnsupportedLogoFormat {
            path: path.to_path_buf(),
            mime: "image/png (corrupt)".into(),
        }
    })
}

/// Reads and writes the logo entry of the state file.
#[derive(Debug, Clone)]
pub struct LogoStore {
    path: PathBuf,
}

impl LogoStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the state file location resolved from `config`.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, VerumError> {
        Ok(Self::new(config.state_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_error(&self, reason: impl ToString) -> VerumError {
        VerumError::StateStore {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    async fn read_state(&self) -> Result<StateFile, VerumError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| self.store_error(e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateFile::default()),
            Err(e) => Err(self.store_error(e)),
        }
    }

    async fn write_state(&self, state: &StateFile) -> Result<(), VerumError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.store_error(e))?;
            }
        }
        let json = serde_json::to_vec_pretty(state).map_err(|e| self.store_error(e))?;
        // Write then rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.store_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.store_error(e))
    }

    /// The stored logo, if any.
    pub async fn load(&self) -> Result<Option<StoredLogo>, VerumError> {
        let state = self.read_state().await?;
        match state.company_logo {
            Some(url) if url.starts_with(DATA_URL_PREFIX) => Ok(Some(StoredLogo { data_url: url })),
            Some(_) => {
                warn!("Ignoring stored logo in {}: not a PNG data URL", self.path.display());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Replace the logo with the PNG at `path`.
    ///
    /// # Errors
    /// [`VerumError::UnsupportedLogoFormat`] when the file is not a PNG; the
    /// previously stored logo is kept.
    pub async fn set_from_file(&self, path: &Path) -> Result<StoredLogo, VerumError> {
        let bytes = read_bytes(path).await?;
        self.set_png(path, &bytes).await
    }

    /// Replace the logo with already-loaded bytes named by `path`.
    pub async fn set_png(&self, path: &Path, bytes: &[u8]) -> Result<StoredLogo, VerumError> {
        let (w, h) = validate_png(path, bytes)?;
        let logo = StoredLogo::from_png(bytes);

        let mut state = self.read_state().await?;
        state.company_logo = Some(logo.data_url.clone());
        self.write_state(&state).await?;
        info!("Stored logo {} ({}x{} px) in {}", path.display(), w, h, self.path.display());
        Ok(logo)
    }

    /// Remove the logo. Returns whether one was stored.
    pub async fn clear(&self) -> Result<bool, VerumError> {
        let mut state = self.read_state().await?;
        let had = state.company_logo.take().is_some();
        if had {
            self.write_state(&state).await?;
            info!("Cleared logo from {}", self.path.display());
        }
        Ok(had)
    }
}
