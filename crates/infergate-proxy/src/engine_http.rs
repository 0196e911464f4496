//! HTTP implementation of the engine port.
//!
//! Generations go through the engine's `/stream` route, which emits one
//! SSE event per step carrying the text delta, running token counts and
//! optional log probabilities. Per-request batch items go through the
//! OpenAI-shaped completion routes.
//!
//! Health checks treat a refused connection as "not up yet". Generation
//! and completion calls treat it, and any reply naming a dead engine, as
//! [`EngineError::Dead`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;
use infergate_core::{
    BatchItem, EngineClient, EngineError, EngineOutput, EngineStream, GenerateRequest,
    TokenOutput,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::sse::decode_events;

const STREAM_ROUTE: &str = "/stream";
const DEFAULT_HEALTH_ROUTE: &str = "/health";

type Inflight = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Engine client speaking the local engine's HTTP interface.
#[derive(Debug, Clone)]
pub struct HttpEngineClient {
    client: Client,
    base_url: String,
    health_route: String,
    inflight: Inflight,
}

impl HttpEngineClient {
    /// `base_url` is scheme, host and port, without a trailing slash.
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            health_route: DEFAULT_HEALTH_ROUTE.to_string(),
            inflight: Arc::default(),
        }
    }

    #[must_use]
    pub fn with_health_route(mut self, route: impl Into<String>) -> Self {
        self.health_route = route.into();
        self
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }

    /// Number of generations currently registered for abort.
    pub fn inflight(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One `/stream` event.
#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    text: String,
    #[serde(default)]
    count_prompt_tokens: u32,
    #[serde(default)]
    count_output_tokens: u32,
    /// Token id to log probability for the latest token, sampled token
    /// first.
    #[serde(default)]
    log_probs: Option<Map<String, Value>>,
    #[serde(default)]
    finished: bool,
}

/// Removes a generation from the abort registry when its stream is dropped.
struct InflightGuard {
    request_id: String,
    inflight: Inflight,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.request_id);
    }
}

/// Engine request body for `/stream`.
fn stream_body(request: &GenerateRequest) -> Result<Value, EngineError> {
    let Value::Object(params) =
        serde_json::to_value(&request.params).map_err(|e| EngineError::Rejected(e.to_string()))?
    else {
        return Err(EngineError::Rejected("sampling params must be an object".into()));
    };
    let mut body = Map::with_capacity(params.len() + 2);
    body.insert("prompt".to_string(), Value::String(request.prompt.clone()));
    body.insert("stream".to_string(), Value::Bool(true));
    for (key, value) in params {
        let key = if key == "max_tokens" {
            "max_new_tokens".to_string()
        } else {
            key
        };
        body.insert(key, value);
    }
    Ok(Value::Object(body))
}

/// Keeps the engine's key order. Non-numeric log probabilities are a
/// decode error.
fn to_tokens(log_probs: Map<String, Value>) -> Result<Vec<TokenOutput>, EngineError> {
    log_probs
        .into_iter()
        .map(|(token, log_prob)| {
            let log_prob = log_prob.as_f64().ok_or_else(|| {
                EngineError::Decode(format!("log probability for token {token} is not a number"))
            })?;
            Ok(TokenOutput { token, log_prob })
        })
        .collect()
}

async fn status_error(response: reqwest::Response) -> EngineError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    EngineError::from_status(status, body)
}

/// A refused connection after the engine reported healthy means the engine
/// process is gone.
fn send_error(err: &reqwest::Error) -> EngineError {
    if err.is_connect() {
        EngineError::Dead(err.to_string())
    } else {
        EngineError::Transport(err.to_string())
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn check_health(&self) -> Result<(), EngineError> {
        let response = self
            .client
            .get(self.url(&self.health_route))
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(response).await)
        }
    }

    async fn generate(&self, request: GenerateRequest) -> Result<EngineStream, EngineError> {
        request.params.validate()?;
        let body = stream_body(&request)?;

        let response = self
            .client
            .post(self.url(STREAM_ROUTE))
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let token = CancellationToken::new();
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request.request_id.clone(), token.clone());
        let guard = InflightGuard {
            request_id: request.request_id,
            inflight: Arc::clone(&self.inflight),
        };

        let mut text = String::new();
        let outputs = decode_events(response.bytes_stream())
            .take_until(token.cancelled_owned())
            .map(move |event| {
                let _registered = &guard;
                let data = event.map_err(|e| EngineError::Transport(e.to_string()))?;
                let event: StreamEvent =
                    serde_json::from_str(&data).map_err(|e| EngineError::Decode(e.to_string()))?;
                let logprobs = event.log_probs.map(to_tokens).transpose()?;
                text.push_str(&event.text);
                Ok(EngineOutput {
                    text: text.clone(),
                    num_prompt_tokens: event.count_prompt_tokens,
                    num_completion_tokens: event.count_output_tokens,
                    logprobs,
                    finished: event.finished,
                })
            });
        Ok(outputs.boxed())
    }

    async fn abort(&self, request_id: &str) -> Result<(), EngineError> {
        let token = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_id);
        match token {
            Some(token) => {
                debug!(request_id, "Aborting generation");
                token.cancel();
            }
            None => debug!(request_id, "Abort for unknown or finished generation"),
        }
        Ok(())
    }

    async fn complete(&self, item: &BatchItem, model: &str) -> Result<Value, EngineError> {
        let response = self
            .client
            .post(self.url(item.kind().route()))
            .json(&item.engine_body(model))
            .send()
            .await
            .map_err(|e| send_error(&e))?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infergate_core::SamplingParams;

    #[test]
    fn stream_body_renames_max_tokens_and_sets_stream() {
        let request = GenerateRequest {
            request_id: "r1".into(),
            prompt: "hi".into(),
            params: SamplingParams {
                max_tokens: 8,
                logprobs: Some(1),
                ..SamplingParams::default()
            },
        };
        let body = stream_body(&request).unwrap();
        assert_eq!(body["prompt"], "hi");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_new_tokens"], 8);
        assert_eq!(body["logprobs"], 1);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn log_probs_keep_engine_order() {
        let Value::Object(log_probs) = serde_json::json!({"907": -0.1, "12": -2.0, "455": -3.5})
        else {
            unreachable!()
        };
        let tokens = to_tokens(log_probs).unwrap();
        let order: Vec<&str> = tokens.iter().map(|t| t.token.as_str()).collect();
        assert_eq!(order, ["907", "12", "455"]);
        assert!((tokens[0].log_prob + 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn non_numeric_log_prob_is_a_decode_error() {
        let Value::Object(log_probs) = serde_json::json!({"1": "high"}) else {
            unreachable!()
        };
        assert!(matches!(to_tokens(log_probs), Err(EngineError::Decode(_))));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = HttpEngineClient::new(Client::new(), "http://localhost:5005/");
        assert_eq!(client.url("/stream"), "http://localhost:5005/stream");
    }
}
