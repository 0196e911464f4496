//! Inference engine port.
//!
//! The engine is the external process that performs generation. The batch
//! orchestrator drives it through this trait; forwarders talk to it over
//! plain HTTP instead and do not need it.

use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{BatchItem, TokenOutput};

/// Sampling parameters accepted by the engine's generation interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    /// -1 considers all tokens.
    pub top_k: i32,
    pub top_p: f32,
    /// Number of log probabilities to return per token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<u32>,
    pub skip_special_tokens: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guided_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guided_regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guided_choice: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guided_grammar: Option<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            max_tokens: 16,
            temperature: 1.0,
            stop: None,
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            top_k: -1,
            top_p: 1.0,
            logprobs: None,
            skip_special_tokens: true,
            guided_json: None,
            guided_regex: None,
            guided_choice: None,
            guided_grammar: None,
        }
    }
}

impl SamplingParams {
    /// Guided decoding constraints are mutually exclusive.
    pub fn validate(&self) -> Result<(), EngineError> {
        let guided = [
            self.guided_json.is_some(),
            self.guided_regex.is_some(),
            self.guided_choice.is_some(),
            self.guided_grammar.is_some(),
        ];
        if guided.iter().filter(|set| **set).count() > 1 {
            return Err(EngineError::Rejected(
                "only one of guided_json, guided_regex, guided_choice or guided_grammar may be set"
                    .into(),
            ));
        }
        Ok(())
    }
}

/// One generation request submitted to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Identity used for abort and for correlating outputs.
    pub request_id: String,
    pub prompt: String,
    pub params: SamplingParams,
}

/// One incremental output from a generation stream.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineOutput {
    /// Cumulative generated text so far.
    pub text: String,
    pub num_prompt_tokens: u32,
    /// Number of tokens generated so far.
    pub num_completion_tokens: u32,
    /// Top log probabilities of the most recent token, when requested.
    pub logprobs: Option<Vec<TokenOutput>>,
    /// Set on the terminal output of the stream.
    pub finished: bool,
}

/// Stream of incremental engine outputs for one request.
pub type EngineStream = BoxStream<'static, Result<EngineOutput, EngineError>>;

/// Error name the engine reports once its generation loop has died
/// (`AsyncEngineDeadError` and friends).
pub const ENGINE_DEAD_MARKER: &str = "EngineDeadError";

/// Whether an engine error body reports a dead engine.
#[must_use]
pub fn reports_dead_engine(body: &str) -> bool {
    body.contains(ENGINE_DEAD_MARKER)
}

/// Errors reported by the engine port.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Connection refused, timeout or broken stream.
    #[error("Engine transport error: {0}")]
    Transport(String),

    /// The engine answered with a non-success status.
    #[error("Engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The engine's reply could not be decoded.
    #[error("Failed to decode engine response: {0}")]
    Decode(String),

    /// The request was rejected before reaching the engine.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The engine reports itself unusable. The process must exit.
    #[error("Engine is dead: {0}")]
    Dead(String),
}

impl EngineError {
    /// Classify a non-success engine reply.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        if reports_dead_engine(&body) {
            Self::Dead(body)
        } else {
            Self::Status { status, body }
        }
    }

    /// Whether this error requires the process to terminate.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Dead(_))
    }

    /// Suggested HTTP status code for surfacing this error.
    #[must_use]
    pub const fn suggested_status_code(&self) -> u16 {
        match self {
            Self::Rejected(_) => 400,
            Self::Status { status, .. } => *status,
            Self::Transport(_) | Self::Decode(_) => 502,
            Self::Dead(_) => 503,
        }
    }
}

/// Port for driving the inference engine.
#[async_trait]
pub trait EngineClient: Send + Sync + fmt::Debug {
    /// Check the engine is ready to accept requests.
    async fn check_health(&self) -> Result<(), EngineError>;

    /// Start a generation and return its incremental output stream.
    ///
    /// Dropping the stream releases the underlying connection.
    async fn generate(&self, request: GenerateRequest) -> Result<EngineStream, EngineError>;

    /// Abort an in-flight generation by request id.
    async fn abort(&self, request_id: &str) -> Result<(), EngineError>;

    /// Run one per-request (OpenAI-shaped) completion to its terminal
    /// response, with `model` as the served model name.
    async fn complete(&self, item: &BatchItem, model: &str) -> Result<Value, EngineError>;
}
