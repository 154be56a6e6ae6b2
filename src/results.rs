use serde::Serialize;

use crate::dispatch::DispatchFailure;
use crate::error::ChatlistError;

/// Prefix of every failed result's text. Export and display code can detect
/// failures with [`is_error_text`] without knowing provider details.
pub const ERROR_MARKER: &str = "Error: ";

pub fn is_error_text(text: &str) -> bool {
    text.starts_with(ERROR_MARKER)
}

/// Terminal state of one provider's dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    MissingCredential,
    NetworkFailure,
    Timeout,
    NonJsonResponse,
    UpstreamError,
    HttpStatusError,
    UnexpectedError,
}

/// One provider's outcome for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelResult {
    /// Exactly the configured display name, used later to find the provider id.
    pub provider_display_name: String,
    pub response_text: String,
    pub selected: bool,
    pub status: ResultStatus,
}

impl ModelResult {
    pub fn success(provider_display_name: &str, text: String) -> Self {
        Self {
            provider_display_name: provider_display_name.to_owned(),
            response_text: text,
            selected: false,
            status: ResultStatus::Success,
        }
    }

    pub fn failure(provider_display_name: &str, failure: &DispatchFailure) -> Self {
        Self {
            provider_display_name: provider_display_name.to_owned(),
            response_text: format!("{ERROR_MARKER}{failure}"),
            selected: false,
            status: failure.status(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status != ResultStatus::Success
    }
}

/// Results of the latest dispatch, held until the next one replaces them.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    prompt: String,
    results: Vec<ModelResult>,
}

impl ResultSet {
    pub fn new(prompt: &str, results: Vec<ModelResult>) -> Self {
        Self {
            prompt: prompt.to_owned(),
            results,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn as_slice(&self) -> &[ModelResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ModelResult> {
        self.results.get(index)
    }

    /// Flip the selection of the result at `index`; returns the new state.
    pub fn toggle(&mut self, index: usize) -> Result<bool, ChatlistError> {
        let result = self
            .results
            .get_mut(index)
            .ok_or(ChatlistError::NoSuchResult(index))?;
        result.selected = !result.selected;
        Ok(result.selected)
    }

    pub fn selected(&self) -> impl Iterator<Item = &ModelResult> {
        self.results.iter().filter(|r| r.selected)
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_error()).count()
    }
}
