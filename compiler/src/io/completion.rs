//! Completion service abstraction.
//!
//! The [`CompletionService`] trait decouples the gateway from the transport
//! that actually reaches the language model. Production uses
//! [`HttpCompletionService`]; tests use scripted services that return
//! predetermined results without touching the network.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ServiceError;

/// Wire request for a text completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub best_of: u32,
}

/// Wire response; only the first choice is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
}

impl CompletionResponse {
    /// Text of the first choice, unmodified.
    pub fn into_first_text(self) -> Result<String, ServiceError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or(ServiceError::NoChoices)
    }
}

/// Abstraction over completion backends. One call, no retries.
pub trait CompletionService {
    fn create(&self, request: &CompletionRequest) -> Result<CompletionResponse, ServiceError>;
}

/// Blocking HTTP client for an OpenAI-compatible `/completions` endpoint.
pub struct HttpCompletionService {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
}

impl HttpCompletionService {
    /// `base_url` is the API root (e.g. `https://api.openai.com/v1`).
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            endpoint: format!("{}/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl CompletionService for HttpCompletionService {
    #[instrument(skip_all, fields(model = %request.model, prompt_bytes = request.prompt.len()))]
    fn create(&self, request: &CompletionRequest) -> Result<CompletionResponse, ServiceError> {
        debug!(endpoint = %self.endpoint, "sending completion request");
        let result = self
            .agent
            .post(&self.endpoint)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .send_json(request);

        match result {
            Ok(response) => response
                .into_json::<CompletionResponse>()
                .map_err(|err| ServiceError::MalformedResponse(err.to_string())),
            Err(ureq::Error::Status(429, response)) => Err(ServiceError::RateLimited(
                response.into_string().unwrap_or_default(),
            )),
            Err(ureq::Error::Status(code, response)) => Err(ServiceError::Status {
                code,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(ServiceError::Transport(transport.to_string()))
            }
        }
    }
}
