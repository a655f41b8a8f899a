//! The external model call.
//!
//! A submission issues exactly one call. On success the returned text becomes
//! the [`Report`]; on any failure the error message is surfaced verbatim (or
//! [`crate::error::GENERIC_CALL_FAILURE`] when there is none) and nothing
//! partial is kept. There are no retries and, unless configured, no timeout.
//!
//! Transports implement [`ModelClient`]:
//!
//! * [`GeminiClient`]: direct `generateContent` REST call. The instruction
//!   travels as `systemInstruction` and the reasoning budget as
//!   `generationConfig.thinkingConfig`.
//! * [`ProviderClient`]: any provider from `edgequake_llm::ProviderFactory`.
//!   Evidence is forwarded as image attachments; reasoning budgets have no
//!   equivalent there and are dropped with a log line.

use crate::config::{AnalysisConfig, Backend};
use crate::error::VerumError;
use crate::pipeline::compose::{ComposedRequest, RequestPart};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Markdown report returned by the model. Held until the next submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub markdown: String,
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

/// A transport able to answer a composed request with Markdown text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Short transport name for logs.
    fn name(&self) -> &str;

    /// Issue the request once and return the model's text.
    async fn generate(&self, request: &ComposedRequest) -> Result<String, VerumError>;
}

/// Send the request once and wrap the answer as a [`Report`].
pub async fn submit_once(
    client: &dyn ModelClient,
    request: &ComposedRequest,
) -> Result<Report, VerumError> {
    let start = Instant::now();
    info!("Calling {} via {}", request.model(), client.name());

    match client.generate(request).await {
        Ok(markdown) => {
            debug!(
                "Model answered with {} chars in {:?}",
                markdown.len(),
                start.elapsed()
            );
            Ok(Report {
                markdown,
                model: request.model().to_string(),
                generated_at: Utc::now(),
            })
        }
        Err(e) => {
            warn!("Model call failed after {:?}: {}", start.elapsed(), e);
            Err(match e {
                VerumError::ExternalCall { .. } | VerumError::ProviderNotConfigured { .. } => e,
                other => VerumError::external_call(other.to_string()),
            })
        }
    }
}

/// Resolve the client, from most-specific to least-specific:
///
/// 1. **Pre-built client** (`config.client`), used as-is.
/// 2. **`Backend::Provider(name)`**, created through the provider factory at call time.
/// 3. **`Backend::Gemini`**, which needs an API key from config or environment.
pub fn resolve_client(config: &AnalysisConfig) -> Result<Arc<dyn ModelClient>, VerumError> {
    if let Some(ref client) = config.client {
        return Ok(Arc::clone(client));
    }
    match &config.backend {
        Backend::Provider(name) => Ok(Arc::new(ProviderClient::new(name.clone()))),
        Backend::Gemini => Ok(Arc::new(GeminiClient::from_config(config)?)),
    }
}

// ── Gemini REST ──────────────────────────────────────────────────────────

/// Direct client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl GeminiClient {
    /// Build a client from config, resolving the API key now.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, VerumError> {
        let api_key = config
            .resolve_api_key()
            .ok_or_else(|| VerumError::ProviderNotConfigured {
                provider: "gemini".into(),
                hint: "Set GEMINI_API_KEY (or API_KEY), or pass --api-key.".into(),
            })?;

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.api_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| VerumError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base, model)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &ComposedRequest) -> Result<String, VerumError> {
        let response = self
            .http
            .post(self.endpoint(request.model()))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| VerumError::external_call(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| VerumError::external_call(e.to_string()))?;

        if !status.is_success() {
            return Err(VerumError::external_call(error_message(status.as_u16(), &body)));
        }

        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| VerumError::external_call(format!("Malformed model response: {e}")))?;
        parsed.into_text()
    }
}

/// JSON body of a `generateContent` call.
pub fn request_body(request: &ComposedRequest) -> serde_json::Value {
    let config = request.config();
    let mut body = serde_json::json!({
        "contents": [{ "role": "user", "parts": request.content_parts() }],
        "systemInstruction": { "parts": [{ "text": config.system_instruction }] },
    });
    if let Some(thinking) = config.thinking_config {
        body["generationConfig"] = serde_json::json!({ "thinkingConfig": thinking });
    }
    body
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl GenerateContentResponse {
    /// Concatenate the answer text of the first candidate, skipping thought parts.
    fn into_text(self) -> Result<String, VerumError> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        let Some(candidate) = self.candidates.into_iter().next() else {
            return Err(VerumError::external_call(match block_reason {
                Some(reason) => format!("The request was blocked by the model: {reason}"),
                None => "The model returned no candidates.".to_string(),
            }));
        };

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            return Err(VerumError::external_call(format!(
                "The model returned an empty response (finish reason: {}).",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(text)
    }
}

fn error_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ if body.trim().is_empty() => format!("HTTP {status}"),
        _ => format!("HTTP {status}: {}", body.trim()),
    }
}

// ── edgequake-llm providers ──────────────────────────────────────────────

/// Adapter over `edgequake_llm` providers (OpenAI, Anthropic, Ollama, …).
///
/// The provider is instantiated per call because the model name depends on
/// the evidence of each submission.
pub struct ProviderClient {
    provider_name: String,
}

impl ProviderClient {
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
        }
    }
}

/// Split the content parts into the single user turn a chat provider expects.
pub(crate) fn chat_user_turn(parts: &[RequestPart]) -> (String, Vec<ImageData>) {
    let mut text = Vec::new();
    let mut images = Vec::new();
    for part in parts {
        match part {
            RequestPart::Text(t) => text.push(t.as_str()),
            RequestPart::InlineData(inline) => {
                images.push(ImageData::new(inline.data.clone(), inline.mime_type.clone()))
            }
        }
    }
    (text.join("\n"), images)
}

#[async_trait]
impl ModelClient for ProviderClient {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn generate(&self, request: &ComposedRequest) -> Result<String, VerumError> {
        let provider = ProviderFactory::create_llm_provider(&self.provider_name, request.model())
            .map_err(|e| VerumError::ProviderNotConfigured {
                provider: self.provider_name.clone(),
                hint: format!("{e}"),
            })?;

        if let Some(budget) = request.selection().thinking_budget() {
            warn!(
                "Provider '{}' has no reasoning-budget setting; budget {} not sent",
                self.provider_name, budget
            );
        }

        let (text, images) = chat_user_turn(request.content_parts());
        let messages = vec![
            ChatMessage::system(request.config().system_instruction.as_str()),
            ChatMessage::user_with_images(&text, images),
        ];
        let options = CompletionOptions::default();

        let response = provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| VerumError::external_call(e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.provider_name, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}
