//! Configuration types for evidence analysis and report export.
//!
//! Every knob lives in [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. The model-selection policy itself is fixed (see
//! [`crate::pipeline::compose::select_model`]); configuration only names the
//! two model variants it chooses between and the reasoning budget it attaches.

use crate::error::VerumError;
use crate::pipeline::model::ModelClient;
use crate::pipeline::render::Brightness;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default fast model variant, used whenever images are present.
pub const DEFAULT_FAST_MODEL: &str = "gemini-2.5-flash";

/// Default heavy model variant, used for thinking mode or PDF evidence.
pub const DEFAULT_PRO_MODEL: &str = "gemini-2.5-pro";

/// Reasoning budget attached to heavy-variant requests.
pub const DEFAULT_THINKING_BUDGET: u32 = 32768;

/// Default Gemini REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Environment variable overriding the directory of the persisted state file.
pub const STATE_DIR_ENV: &str = "VERUM_STATE_DIR";

/// File name of the persisted state inside the state directory.
pub const STATE_FILE_NAME: &str = "state.json";

/// Configuration for an analysis submission and its export.
///
/// Built via [`AnalysisConfig::builder()`] or [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use verum_omnis::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .pro_model("gemini-2.5-pro")
///     .brightness(80)
///     .build()
///     .unwrap();
/// assert_eq!(config.thinking_budget, 32768);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Model used when any image is present, or when no deeper reasoning is needed.
    pub fast_model: String,

    /// Model used for thinking mode or PDF evidence (without images).
    pub pro_model: String,

    /// `thinkingConfig.thinkingBudget` attached to heavy-variant requests.
    pub thinking_budget: u32,

    /// Custom system instruction. If None, uses the built-in report template.
    pub system_instruction: Option<String>,

    /// How the model is reached when no pre-built `client` is supplied.
    pub backend: Backend,

    /// Pre-constructed model client. Takes precedence over `backend`.
    pub client: Option<Arc<dyn ModelClient>>,

    /// API credential. If None, read from `GEMINI_API_KEY` then `API_KEY` at call time.
    pub api_key: Option<String>,

    /// Base URL of the Gemini REST API.
    pub api_base: String,

    /// Per-call timeout in seconds. Default: None.
    ///
    /// A submission is a single best-effort attempt; by default it runs until
    /// the provider answers or fails.
    pub api_timeout_secs: Option<u64>,

    /// Timeout for downloading evidence given as a URL. Default: 120.
    pub download_timeout_secs: u64,

    /// Text brightness applied to rendered and exported reports. Default: 100.
    pub brightness: Brightness,

    /// Directory holding `state.json` (the stored logo). If None, uses
    /// `VERUM_STATE_DIR`, then the platform data directory.
    pub state_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            pro_model: DEFAULT_PRO_MODEL.to_string(),
            thinking_budget: DEFAULT_THINKING_BUDGET,
            system_instruction: None,
            backend: Backend::default(),
            client: None,
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            api_timeout_secs: None,
            download_timeout_secs: 120,
            brightness: Brightness::default(),
            state_dir: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("fast_model", &self.fast_model)
            .field("pro_model", &self.pro_model)
            .field("thinking_budget", &self.thinking_budget)
            .field("backend", &self.backend)
            .field("client", &self.client.as_ref().map(|_| "<dyn ModelClient>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("brightness", &self.brightness)
            .field("state_dir", &self.state_dir)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the API credential: explicit config, then `GEMINI_API_KEY`, then `API_KEY`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| non_empty_env("GEMINI_API_KEY"))
            .or_else(|| non_empty_env("API_KEY"))
    }

    /// Location of the persisted state file.
    ///
    /// # Errors
    /// [`VerumError::StateStore`] when no directory is configured and the
    /// platform has no data directory.
    pub fn state_file(&self) -> Result<PathBuf, VerumError> {
        let dir = match &self.state_dir {
            Some(dir) => dir.clone(),
            None => match non_empty_env(STATE_DIR_ENV) {
                Some(dir) => PathBuf::from(dir),
                None => dirs::data_dir()
                    .map(|d| d.join("verum-omnis"))
                    .ok_or_else(|| VerumError::StateStore {
                        path: PathBuf::from(STATE_FILE_NAME),
                        reason: format!("no data directory on this platform; set {STATE_DIR_ENV}"),
                    })?,
            },
        };
        Ok(dir.join(STATE_FILE_NAME))
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn fast_model(mut self, model: impl Into<String>) -> Self {
        self.config.fast_model = model.into();
        self
    }

    pub fn pro_model(mut self, model: impl Into<String>) -> Self {
        self.config.pro_model = model.into();
        self
    }

    pub fn thinking_budget(mut self, budget: u32) -> Self {
        self.config.thinking_budget = budget;
        self
    }

    pub fn system_instruction(mut self, text: impl Into<String>) -> Self {
        self.config.system_instruction = Some(text.into());
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn client(mut self, client: Arc<dyn ModelClient>) -> Self {
        self.config.client = Some(client);
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn brightness(mut self, value: u8) -> Self {
        self.config.brightness = Brightness::new(value);
        self
    }

    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.state_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, VerumError> {
        let c = &self.config;
        if c.fast_model.trim().is_empty() || c.pro_model.trim().is_empty() {
            return Err(VerumError::InvalidConfig(
                "Model names must not be empty".into(),
            ));
        }
        if c.thinking_budget == 0 {
            return Err(VerumError::InvalidConfig(
                "Thinking budget must be ≥ 1".into(),
            ));
        }
        if !(c.api_base.starts_with("http://") || c.api_base.starts_with("https://")) {
            return Err(VerumError::InvalidConfig(format!(
                "API base must be an HTTP/HTTPS URL, got '{}'",
                c.api_base
            )));
        }
        if let Backend::Provider(name) = &c.backend {
            if name.trim().is_empty() {
                return Err(VerumError::InvalidConfig(
                    "Provider name must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which transport carries the request to the model.
///
/// | Backend | Reasoning budget | Inline PDFs |
/// |---------|------------------|-------------|
/// | `Gemini` | sent as `thinkingConfig` | yes |
/// | `Provider(name)` | not transmissible, logged | as image attachments |
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backend {
    /// Direct Gemini `generateContent` REST call. (default)
    #[default]
    Gemini,
    /// Any provider known to `edgequake_llm::ProviderFactory` (e.g. "openai").
    Provider(String),
}
