//! Application state as a plain value with pure transitions.
//!
//! Every user action maps to a method that consumes the state and returns
//! the next one; nothing here performs I/O. Front-ends (the `verum` CLI, or
//! any other surface) own a single `AppState` and feed it through these
//! transitions, running the model call themselves between
//! [`AppState::begin_submit`] and [`AppState::finish_submit`].
//!
//! ```text
//!            begin_submit            finish_submit(Ok)
//!   Idle ─────────────────▶ Loading ─────────────────▶ Idle + report
//!     ▲                        │
//!     └────────────────────────┘ finish_submit(Err) → Idle + error
//! ```
//!
//! While `Loading`, a second `begin_submit` fails with
//! [`VerumError::SubmissionInFlight`] and leaves the state untouched.

use crate::config::AnalysisConfig;
use crate::error::{EvidenceWarning, VerumError};
use crate::pipeline::compose::{compose_request, ComposedRequest};
use crate::pipeline::evidence::EvidenceFile;
use crate::pipeline::model::Report;
use crate::pipeline::render::Brightness;
use serde::{Deserialize, Serialize};

/// Whether a submission is outstanding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Idle,
    Loading,
}

/// Everything a front-end shows, in one serialisable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub prompt: String,
    /// Evidence in the order it was added.
    pub files: Vec<EvidenceFile>,
    pub think_more: bool,
    pub brightness: Brightness,
    pub phase: Phase,
    /// The last successful report. Cleared when a new submission starts.
    pub report: Option<Report>,
    /// Message for the alert region.
    pub error: Option<String>,
    /// Evidence skipped by the last submission.
    pub warnings: Vec<EvidenceWarning>,
}

impl AppState {
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn set_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Append files after the ones already held.
    pub fn add_files(mut self, files: impl IntoIterator<Item = EvidenceFile>) -> Self {
        self.files.extend(files);
        self
    }

    /// Remove the file at `index`; out-of-range indices are ignored.
    pub fn remove_file(mut self, index: usize) -> Self {
        if index < self.files.len() {
            self.files.remove(index);
        }
        self
    }

    pub fn set_thinking(mut self, think_more: bool) -> Self {
        self.think_more = think_more;
        self
    }

    pub fn set_brightness(mut self, value: u8) -> Self {
        self.brightness = Brightness::new(value);
        self
    }

    /// Show an error without changing anything else (e.g. a rejected logo).
    pub fn show_error(mut self, error: &VerumError) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn clear_error(mut self) -> Self {
        self.error = None;
        self
    }

    /// Start a submission: validate, compose the request and enter `Loading`.
    ///
    /// # Errors
    /// * [`VerumError::SubmissionInFlight`] while another submission is loading.
    /// * [`VerumError::InputValidation`] when the prompt is blank and no
    ///   evidence is held. Record it with [`AppState::show_error`].
    pub fn begin_submit(&self, config: &AnalysisConfig) -> Result<(Self, ComposedRequest), VerumError> {
        if self.is_loading() {
            return Err(VerumError::SubmissionInFlight);
        }
        let composition = compose_request(&self.prompt, &self.files, self.think_more, config)?;

        let mut next = self.clone();
        next.phase = Phase::Loading;
        next.report = None;
        next.error = None;
        next.warnings = composition.warnings;
        Ok((next, composition.request))
    }

    /// End the outstanding submission with the model's outcome.
    ///
    /// A failure leaves no report behind.
    pub fn finish_submit(mut self, outcome: Result<Report, VerumError>) -> Self {
        self.phase = Phase::Idle;
        match outcome {
            Ok(report) => {
                self.report = Some(report);
                self.error = None;
            }
            Err(e) => {
                self.report = None;
                self.error = Some(e.to_string());
            }
        }
        self
    }
}
