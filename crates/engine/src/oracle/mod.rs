//! Intent oracle seam: turns free text into an [`IntentRequest`].
//!
//! Two implementations ship with the crate: [`KeywordOracle`], a
//! deterministic offline parser, and [`LlmOracle`], which prompts a chat
//! model for JSON. The router calls an oracle exactly once per fresh turn
//! and never on a resume.

use async_trait::async_trait;
use easel_core::SceneSummary;

use crate::intent::IntentRequest;

mod keyword;
mod llm;

pub use keyword::KeywordOracle;
#[cfg(feature = "llm")]
pub use llm::OpenAiCompatClient;
pub use llm::{LlmClient, LlmError, LlmOracle, Message};

/// Why an oracle could not classify a request.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// The text is not something the oracle can map to an intent.
    #[error("could not understand '{0}'")]
    Unrecognized(String),

    /// The model kept answering with unusable JSON.
    #[error("no valid intent after {attempts} attempts: {last_error}")]
    InvalidResponse { attempts: usize, last_error: String },

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Classifies one user message against the current scene.
#[async_trait]
pub trait IntentOracle: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        scene: &SceneSummary,
    ) -> Result<IntentRequest, OracleError>;
}

/// Strip markdown code fences from a model response.
pub(crate) fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();

    if let Some(stripped) = trimmed.strip_prefix("```json") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(stripped) = trimmed.strip_prefix("```") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }

    trimmed
}

/// Parse a model response into an intent request.
///
/// The error string is fed back to the model on retry, so it names the
/// problem rather than the serde internals where possible.
pub(crate) fn parse_intent(response: &str) -> Result<IntentRequest, String> {
    let json_str = strip_code_fences(response);
    let value: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| format!("Failed to parse JSON: {}", e))?;
    if value.get("intent").and_then(|v| v.as_str()).is_none() {
        return Err("Response missing string 'intent' field".to_string());
    }
    serde_json::from_value(value).map_err(|e| format!("Invalid intent parameters: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn parse_intent_accepts_fenced_json() {
        let req = parse_intent("```json\n{\"intent\": \"query\"}\n```").unwrap();
        assert_eq!(req.intent(), Intent::Query);
    }

    #[test]
    fn parse_intent_reports_missing_field() {
        let err = parse_intent("{\"kind\": \"circle\"}").unwrap_err();
        assert!(err.contains("intent"), "{err}");
        let err = parse_intent("not json").unwrap_err();
        assert!(err.starts_with("Failed to parse JSON"), "{err}");
        let err = parse_intent("{\"intent\": \"create\"}").unwrap_err();
        assert!(err.starts_with("Invalid intent parameters"), "{err}");
    }
}
