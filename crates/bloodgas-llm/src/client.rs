//! Model client seam.
//!
//! [`ModelClient`] is the only suspending operation in a request. The
//! gateway and orchestrator depend on the trait; [`GeminiClient`] talks to
//! the Generative Language API and [`MockModelClient`] serves canned text.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value};
use thiserror::Error;

use bloodgas_core::{BloodGasError, BloodGasResult};

use crate::config::{GenerationBudget, ServiceConfig};

/// Failures talking to the model service.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP transport error: {0}")]
    Http(reqwest::Error),

    #[error("Model service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Model service response was not JSON")]
    InvalidResponse,

    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Model response contained no candidate text")]
    EmptyCandidate,

    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the API key.
        LlmError::Http(e.without_url())
    }
}

impl From<LlmError> for BloodGasError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Http(inner) => BloodGasError::Upstream {
                status: inner.status().map(|s| s.as_u16()),
                message: format!("transport failure: {inner}"),
            },
            LlmError::Status { status, message } => BloodGasError::Upstream {
                status: Some(status),
                message,
            },
            LlmError::InvalidResponse => BloodGasError::Upstream {
                status: None,
                message: "model service response was not JSON".into(),
            },
            LlmError::Timeout(budget) => BloodGasError::Timeout {
                budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            },
            LlmError::EmptyCandidate => BloodGasError::Upstream {
                status: None,
                message: "model returned no text".into(),
            },
            LlmError::MissingCredential(msg) => BloodGasError::Configuration(msg),
        }
    }
}

/// An image attached inline to a request, already base64 encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: BASE64.encode(bytes),
        }
    }
}

/// One model call: optional system instructions, the user prompt, an
/// optional image and the generation budget.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub image: Option<InlineImage>,
    pub budget: GenerationBudget,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>, budget: GenerationBudget) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            image: None,
            budget,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }
}

/// Text generation backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one generation and return the first candidate's text.
    async fn generate(&self, request: &ModelRequest) -> Result<String, LlmError>;

    /// Identifier reported in results.
    fn model_name(&self) -> &str;
}

/// Client for the Generative Language `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    /// Fails with a configuration error when the config carries no credential.
    pub fn new(config: &ServiceConfig) -> BloodGasResult<Self> {
        Self::with_http_client(config, reqwest::Client::new())
    }

    pub fn with_http_client(config: &ServiceConfig, http: reqwest::Client) -> BloodGasResult<Self> {
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key()?.to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// Build the `generateContent` request body.
pub fn build_request_body(request: &ModelRequest) -> Value {
    let mut parts = vec![json!({ "text": request.prompt })];
    if let Some(image) = &request.image {
        parts.push(json!({
            "inline_data": {
                "mime_type": image.mime_type,
                "data": image.data,
            }
        }));
    }

    let mut generation_config = json!({
        "temperature": request.budget.temperature,
        "maxOutputTokens": request.budget.max_output_tokens,
        "topP": 0.9,
    });
    if request.budget.json_mode {
        generation_config["responseMimeType"] = json!("application/json");
    }

    let mut body = json!({
        "contents": [{ "parts": parts }],
        "generationConfig": generation_config,
    });
    if let Some(system) = &request.system {
        body["system_instruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

/// `error.message` from a service payload, if the payload reports an error.
pub fn error_message(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    let message = match error {
        Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified model service error")
            .to_string(),
    };
    Some(message)
}

/// Text of the first part carrying text in the first candidate.
pub fn candidate_text(payload: &Value) -> Option<String> {
    payload
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?
        .iter()
        .find_map(|part| part.get("text").and_then(Value::as_str))
        .map(str::to_string)
}

fn transport_error(e: reqwest::Error, budget: Duration) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout(budget)
    } else {
        LlmError::from(e)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate(&self, request: &ModelRequest) -> Result<String, LlmError> {
        let budget = request.budget.timeout;
        tracing::debug!(
            model = %self.model,
            prompt_chars = request.prompt.len(),
            has_image = request.image.is_some(),
            max_output_tokens = request.budget.max_output_tokens,
            "Sending generateContent request"
        );

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .timeout(budget)
            .json(&build_request_body(request))
            .send()
            .await
            .map_err(|e| transport_error(e, budget))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, budget))?;
        let payload: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = payload
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            tracing::warn!(status = status.as_u16(), "Model service returned an error status");
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let payload = payload.ok_or(LlmError::InvalidResponse)?;
        if let Some(message) = error_message(&payload) {
            tracing::warn!(status = status.as_u16(), "Model service reported an error in its body");
            return Err(LlmError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let text = candidate_text(&payload).ok_or(LlmError::EmptyCandidate)?;
        tracing::debug!(response_chars = text.len(), "Received candidate text");
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Canned reply for [`MockModelClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Text(String),
    Failure { status: u16, message: String },
    Empty,
}

/// Mock client for testing without a model service.
///
/// Replies are served in order; once exhausted the last one repeats.
pub struct MockModelClient {
    model: String,
    replies: Mutex<VecDeque<MockReply>>,
    last: Mutex<Option<MockReply>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockModelClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            replies: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(MockReply::Text(text.into()))
    }

    pub fn with_failure(self, status: u16, message: impl Into<String>) -> Self {
        self.push(MockReply::Failure {
            status,
            message: message.into(),
        })
    }

    pub fn with_empty_reply(self) -> Self {
        self.push(MockReply::Empty)
    }

    /// Sleep before replying, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn push(self, reply: MockReply) -> Self {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn next_reply(&self) -> Option<MockReply> {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        if let Some(reply) = next {
            *last = Some(reply);
        }
        last.clone()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn generate(&self, request: &ModelRequest) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next_reply() {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Failure { status, message }) => Err(LlmError::Status { status, message }),
            Some(MockReply::Empty) | None => Err(LlmError::EmptyCandidate),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
