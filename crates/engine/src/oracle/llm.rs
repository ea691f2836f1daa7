//! LLM-backed oracle: LlmOracle, LlmClient trait, OpenAiCompatClient.

use async_trait::async_trait;
use easel_core::SceneSummary;
use serde::{Deserialize, Serialize};

use super::{parse_intent, IntentOracle, OracleError};
use crate::intent::IntentRequest;

/// Error type for LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Network or HTTP error.
    #[error("LLM network error: {0}")]
    NetworkError(String),
    /// The API returned an error response.
    #[error("LLM API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    /// The response body could not be read.
    #[error("LLM parse error: {0}")]
    ParseError(String),
}

/// A message in an LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Message {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Trait for calling an LLM to get a text completion.
///
/// Implementations handle the specifics of the provider API. The oracle
/// handles prompt construction and response parsing.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: Vec<Message>, model: &str) -> Result<String, LlmError>;
}

/// An oracle that asks a chat model to emit the intent JSON directly.
pub struct LlmOracle {
    pub client: Box<dyn LlmClient>,
    /// System prompt override. If empty, the built-in prompt is used.
    pub system_prompt: String,
    pub model: String,
    /// Maximum number of retries on invalid responses.
    pub max_retries: usize,
}

impl LlmOracle {
    pub fn new(client: Box<dyn LlmClient>, model: String) -> Self {
        Self {
            client,
            system_prompt: String::new(),
            model,
            max_retries: 2,
        }
    }

    fn default_system_prompt() -> String {
        r#"You classify requests for a 3D scene editor that holds triangles, squares and circles.

Respond with exactly one JSON object whose "intent" field is one of
"create", "delete", "modify", "query" or "none".

create: {"intent": "create", "kind": "triangle|square|circle",
         "spec": {"side_length": n} | {"radius": n} | {"sides": [a, b, c]} | {"size": n} | {"vertices": [[x,y,z], ...]},
         "position": [x, y, z], "color": "red|#rrggbb",
         "near": {"point": [x, y, z], "radius": n, "kind": "circle"}}
         Only "kind" is required. Use "near" when the user asks to place it next to existing shapes.

delete: {"intent": "delete", "target": TARGET}
modify: {"intent": "modify", "target": TARGET,
         "changes": {"size": n, "scale": f, "color": "blue", "translate": [dx, dy, dz]}}

TARGET is one of:
  {"by": "id", "id": "..."}
  {"by": "all_of_kind", "kind": "circle"}
  {"by": "kind", "kind": "circle"}                       (the single circle)
  {"by": "last_created", "kind": "square", "offset": 0, "count": 1}
  {"by": "nearest_to_point", "point": [x, y, z], "radius": n, "kind": "circle", "count": 1}
  {"by": "nearest_to_reference", "kind": "triangle", "reference_kind": "circle",
   "reference_color": "red", "count": 2}

query: {"intent": "query", "mode": "count|list", "kind": "circle", "color": "red"}

none: {"intent": "none", "reply": "<short clarification>"} for greetings or anything
that is not a scene edit or question about the scene.

Respond only with valid JSON. Do not include markdown fences or other text."#
            .to_string()
    }

    fn build_user_message(text: &str, scene: &SceneSummary) -> String {
        format!(
            "Current scene: {}.\nUser request: {}",
            scene.describe(),
            text
        )
    }
}

#[async_trait]
impl IntentOracle for LlmOracle {
    async fn classify(
        &self,
        text: &str,
        scene: &SceneSummary,
    ) -> Result<IntentRequest, OracleError> {
        let system_prompt = if self.system_prompt.is_empty() {
            Self::default_system_prompt()
        } else {
            self.system_prompt.clone()
        };

        let mut messages = vec![
            Message::new("system", system_prompt),
            Message::new("user", Self::build_user_message(text, scene)),
        ];

        let mut attempt = 0;
        loop {
            // Network/API errors are returned immediately; retrying won't help.
            let response = self.client.complete(messages.clone(), &self.model).await?;

            match parse_intent(&response) {
                Ok(request) => {
                    tracing::debug!(intent = %request.intent(), attempt, "llm classified request");
                    return Ok(request);
                }
                Err(parse_error) => {
                    if attempt >= self.max_retries {
                        tracing::warn!(
                            max_retries = self.max_retries,
                            error = %parse_error,
                            "llm oracle retries exhausted"
                        );
                        return Err(OracleError::InvalidResponse {
                            attempts: attempt + 1,
                            last_error: parse_error,
                        });
                    }
                    attempt += 1;
                    messages.push(Message::new("assistant", response));
                    messages.push(Message::new(
                        "user",
                        format!(
                            "Your response was invalid: {}. Please try again, responding with valid JSON only.",
                            parse_error
                        ),
                    ));
                }
            }
        }
    }
}

// -- OpenAiCompatClient (feature-gated) --

#[cfg(feature = "llm")]
/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiCompatClient {
    pub api_key: String,
    /// Base URL up to and including the API version, e.g.
    /// `https://api.openai.com/v1`.
    pub base_url: String,
    pub temperature: f64,
}

#[cfg(feature = "llm")]
impl OpenAiCompatClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: 0.0,
        }
    }
}

#[cfg(feature = "llm")]
#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn complete(&self, messages: Vec<Message>, model: &str) -> Result<String, LlmError> {
        let api_key = self.api_key.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "temperature": self.temperature,
            "messages": messages,
        });

        // ureq is blocking; keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let agent = ureq::Agent::new_with_defaults();
            let response = agent
                .post(&url)
                .header("authorization", &format!("Bearer {}", api_key))
                .header("content-type", "application/json")
                .send_json(body);

            match response {
                Ok(resp) => {
                    let json: serde_json::Value = resp.into_body().read_json().map_err(|e| {
                        LlmError::ParseError(format!("Failed to parse completion response: {}", e))
                    })?;
                    json["choices"]
                        .as_array()
                        .and_then(|arr| arr.first())
                        .and_then(|c| c["message"]["content"].as_str())
                        .map(|s| s.to_string())
                        .ok_or_else(|| {
                            LlmError::ParseError("No message content in completion response".to_string())
                        })
                }
                Err(ureq::Error::StatusCode(status)) => Err(LlmError::ApiError {
                    status,
                    message: format!("{} returned HTTP {}", url, status),
                }),
                Err(e) => Err(LlmError::NetworkError(e.to_string())),
            }
        })
        .await
        .map_err(|e| LlmError::NetworkError(format!("Task join error: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::Intent;
    use std::collections::BTreeMap;

    /// Mock LLM client that pops responses from a queue.
    struct MockLlmClient {
        responses: std::sync::Mutex<Vec<Result<String, LlmError>>>,
        captured_messages: std::sync::Arc<std::sync::Mutex<Vec<Vec<Message>>>>,
    }

    impl MockLlmClient {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses),
                captured_messages: Default::default(),
            }
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete(&self, messages: Vec<Message>, _model: &str) -> Result<String, LlmError> {
            self.captured_messages.lock().unwrap().push(messages);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::NetworkError("no more mock responses".into()));
            }
            responses.remove(0)
        }
    }

    fn empty_scene() -> SceneSummary {
        SceneSummary::from_counts(BTreeMap::new())
    }

    #[tokio::test]
    async fn valid_response_first_try() {
        let client = MockLlmClient::new(vec![Ok(
            r#"{"intent": "create", "kind": "circle", "spec": {"radius": 3}}"#.into(),
        )]);
        let oracle = LlmOracle::new(Box::new(client), "test-model".into());
        let req = oracle.classify("draw a circle", &empty_scene()).await.unwrap();
        assert_eq!(req.intent(), Intent::Create);
    }

    #[tokio::test]
    async fn invalid_then_valid_retries_with_correction() {
        let client = MockLlmClient::new(vec![
            Ok("I think you want a circle".into()),
            Ok("```json\n{\"intent\": \"query\"}\n```".into()),
        ]);
        let captured = client.captured_messages.clone();
        let oracle = LlmOracle::new(Box::new(client), "test-model".into());
        let req = oracle.classify("how many?", &empty_scene()).await.unwrap();
        assert_eq!(req.intent(), Intent::Query);

        let calls = captured.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let retry = &calls[1];
        assert_eq!(retry.len(), 4);
        assert_eq!(retry[2].role, "assistant");
        assert!(retry[3].content.starts_with("Your response was invalid"));
        assert!(calls[0][1].content.contains("the scene is empty"));
    }

    #[tokio::test]
    async fn retries_exhausted() {
        let client = MockLlmClient::new(vec![
            Ok("nope".into()),
            Ok("nope".into()),
            Ok("nope".into()),
        ]);
        let oracle = LlmOracle::new(Box::new(client), "test-model".into());
        let err = oracle.classify("??", &empty_scene()).await.unwrap_err();
        assert!(matches!(err, OracleError::InvalidResponse { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn network_error_not_retried() {
        let client = MockLlmClient::new(vec![
            Err(LlmError::NetworkError("connection refused".into())),
            Ok(r#"{"intent": "none"}"#.into()),
        ]);
        let oracle = LlmOracle::new(Box::new(client), "test-model".into());
        let err = oracle.classify("hi", &empty_scene()).await.unwrap_err();
        assert!(matches!(err, OracleError::Llm(LlmError::NetworkError(_))));
    }
}
