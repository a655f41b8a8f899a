//! Request composition: choose the model variant and order the parts.
//!
//! ## Model selection
//!
//! The policy is a three-way branch in which images take strict precedence:
//!
//! | Evidence | Thinking flag | Variant | Reasoning budget |
//! |----------|---------------|---------|------------------|
//! | any image | any | fast | none |
//! | PDF, no image | any | heavy | attached |
//! | neither | set | heavy | attached |
//! | neither | unset | fast | none |
//!
//! ## Part order
//!
//! `[instruction, user prompt, evidence₁, evidence₂, …]`, evidence in the
//! order it was added. Nothing is sent from here; the result is a plain value.

use crate::config::AnalysisConfig;
use crate::error::{EvidenceWarning, VerumError};
use crate::pipeline::evidence::{encode_all, EvidenceFile, EvidenceKind};
use crate::prompts::{user_prompt, SYSTEM_INSTRUCTION};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One entry of the request's content list.
///
/// Serialises to the provider's wire shape: `{"text": …}` or
/// `{"inlineData": {"mimeType": …, "data": …}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestPart {
    Text(String),
    InlineData(InlineData),
}

/// Base64 payload tagged with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

impl RequestPart {
    pub fn text(text: impl Into<String>) -> Self {
        RequestPart::Text(text.into())
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        RequestPart::InlineData(InlineData {
            mime_type: mime_type.into(),
            data: data.into(),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestPart::Text(t) => Some(t),
            RequestPart::InlineData(_) => None,
        }
    }
}

/// What the evidence set contains, as far as model selection cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceProfile {
    pub has_image: bool,
    pub has_pdf: bool,
}

impl EvidenceProfile {
    pub fn of(files: &[EvidenceFile]) -> Self {
        Self {
            has_image: files.iter().any(|f| f.kind() == EvidenceKind::Image),
            has_pdf: files.iter().any(|f| f.kind() == EvidenceKind::Pdf),
        }
    }
}

/// Outcome of the model-selection policy.
///
/// `Heavy` can only be produced by [`select_model`] for an image-free
/// evidence set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSelection {
    /// Fast variant, no reasoning budget. `thinking_overridden` is set when
    /// the user asked for thinking mode but images forced this variant.
    Fast { thinking_overridden: bool },
    /// Heavy variant with an elevated reasoning budget.
    Heavy { thinking_budget: u32 },
}

impl ModelSelection {
    pub fn model_name<'a>(&self, config: &'a AnalysisConfig) -> &'a str {
        match self {
            ModelSelection::Fast { .. } => &config.fast_model,
            ModelSelection::Heavy { .. } => &config.pro_model,
        }
    }

    pub fn thinking_enabled(&self) -> bool {
        matches!(self, ModelSelection::Heavy { .. })
    }

    pub fn thinking_budget(&self) -> Option<u32> {
        match self {
            ModelSelection::Fast { .. } => None,
            ModelSelection::Heavy { thinking_budget } => Some(*thinking_budget),
        }
    }
}

/// Apply the selection policy.
pub fn select_model(profile: EvidenceProfile, think_more: bool, thinking_budget: u32) -> ModelSelection {
    if profile.has_image {
        ModelSelection::Fast {
            thinking_overridden: think_more,
        }
    } else if think_more || profile.has_pdf {
        ModelSelection::Heavy { thinking_budget }
    } else {
        ModelSelection::Fast {
            thinking_overridden: false,
        }
    }
}

/// `thinkingConfig` block of the request configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: u32,
}

/// Request configuration: the fixed instruction plus the optional budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub system_instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// A fully assembled, not yet sent, model request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedRequest {
    model: String,
    selection: ModelSelection,
    config: GenerationConfig,
    parts: Vec<RequestPart>,
}

impl ComposedRequest {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn selection(&self) -> ModelSelection {
        self.selection
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// All parts: instruction, user prompt, then evidence in upload order.
    pub fn parts(&self) -> &[RequestPart] {
        &self.parts
    }

    /// Parts after the leading instruction, i.e. what goes in `contents`
    /// when the instruction travels as `systemInstruction`.
    pub fn content_parts(&self) -> &[RequestPart] {
        &self.parts[1..]
    }
}

/// Composer output: the request plus any evidence that was skipped.
#[derive(Debug, Clone)]
pub struct Composition {
    pub request: ComposedRequest,
    pub warnings: Vec<EvidenceWarning>,
}

/// Build the model request for a submission.
///
/// # Errors
/// [`VerumError::InputValidation`] when the prompt is blank and no evidence
/// file was supplied.
pub fn compose_request(
    prompt: &str,
    evidence: &[EvidenceFile],
    think_more: bool,
    config: &AnalysisConfig,
) -> Result<Composition, VerumError> {
    if prompt.trim().is_empty() && evidence.is_empty() {
        return Err(VerumError::InputValidation);
    }

    let profile = EvidenceProfile::of(evidence);
    let selection = select_model(profile, think_more, config.thinking_budget);
    let model = selection.model_name(config).to_string();

    info!(
        "Selected model {} (reasoning budget: {})",
        model,
        selection
            .thinking_budget()
            .map(|b| b.to_string())
            .unwrap_or_else(|| "none".into())
    );
    if let ModelSelection::Fast {
        thinking_overridden: true,
    } = selection
    {
        info!("Thinking mode ignored: image evidence requires the fast model");
    }

    let instruction = config
        .system_instruction
        .clone()
        .unwrap_or_else(|| SYSTEM_INSTRUCTION.to_string());

    let encoded = encode_all(evidence);
    let mut parts = Vec::with_capacity(encoded.parts.len() + 2);
    parts.push(RequestPart::text(instruction.clone()));
    parts.push(RequestPart::text(user_prompt(prompt)));
    parts.extend(encoded.parts);

    Ok(Composition {
        request: ComposedRequest {
            model,
            selection,
            config: GenerationConfig {
                system_instruction: instruction,
                thinking_config: selection
                    .thinking_budget()
                    .map(|thinking_budget| ThinkingConfig { thinking_budget }),
            },
            parts,
        },
        warnings: encoded.warnings,
    })
}
