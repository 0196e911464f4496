//! Streaming forwarding to the local engine.
//!
//! The engine answers with an SSE stream of JSON chunks. Each chunk is
//! wrapped as `{"result": ...}` and yielded as soon as it is decoded.
//! Hooks are not run here; the caller owns any dispatch at stream end.

use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, TryStreamExt, future};
use infergate_core::{ConfigError, EnvelopePolicy, ForwarderConfig, InferenceRequest, wrap_result};
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info};

use crate::error::ForwardError;
use crate::readiness::{READINESS_POLL_INTERVAL, wait_for_engine_ready};
use crate::sse::decode_events;

/// Lazy, single-pass sequence of wrapped result chunks.
///
/// Dropping it closes the engine connection.
pub type ChunkStream = BoxStream<'static, Result<Value, ForwardError>>;

/// Forwards single requests to the engine and relays its event stream.
#[derive(Debug, Clone)]
pub struct StreamingForwarder {
    client: Client,
    predict_url: String,
    policy: EnvelopePolicy,
}

impl StreamingForwarder {
    /// Build a streaming forwarder without waiting for the engine.
    pub fn new(client: Client, config: &ForwarderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            client,
            predict_url: config.predict_url(),
            policy: config.envelope_policy(),
        })
    }

    /// Validate the configuration, apply environment overrides and block
    /// until the engine reports ready.
    pub async fn load(client: Client, mut config: ForwarderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        config.log_summary();
        wait_for_engine_ready(&client, &config.healthcheck_url(), READINESS_POLL_INTERVAL).await;
        config.apply_env(|name| std::env::var(name).ok())?;
        info!(
            unwrap = config.model_engine_unwrap,
            serialize_results_as_string = config.serialize_results_as_string,
            "Streaming forwarder ready"
        );
        Self::new(client, &config)
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    /// Open the engine stream for one payload.
    ///
    /// Resolves once the engine has answered with a success status; chunks
    /// are then decoded on demand. A non-success status is a transport
    /// failure, or a dead engine when the reply says so. A broken stream or
    /// an undecodable chunk ends the sequence with an error after any chunks
    /// already yielded.
    pub async fn forward(
        &self,
        payload: &Value,
        call_override: Option<bool>,
    ) -> Result<ChunkStream, ForwardError> {
        InferenceRequest::parse(payload)?;
        let envelope = self.policy.resolve(payload, call_override);
        info!(url = %self.predict_url, "Accepted request, opening engine stream");

        let response = self
            .client
            .post(&self.predict_url)
            .header("accept", "text/event-stream")
            .json(&envelope.body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.predict_url, "Failed to reach engine: {e}");
                ForwardError::from_send(&self.predict_url, &e)
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.bytes().await.unwrap_or_default();
            error!(url = %self.predict_url, status, "Engine refused stream");
            return Err(
                ForwardError::dead_reply(&self.predict_url, status, &body).unwrap_or_else(|| {
                    ForwardError::Transport {
                        url: self.predict_url.clone(),
                        reason: format!("status {status}: {}", String::from_utf8_lossy(&body)),
                    }
                }),
            );
        }

        let url = self.predict_url.clone();
        let chunk_url = url.clone();
        let as_string = envelope.serialize_as_string;
        let chunks = decode_events(response.bytes_stream())
            .map_err(move |e| ForwardError::from_sse(&url, e))
            .and_then(move |data| future::ready(decode_chunk(&chunk_url, &data, as_string)));

        // Stop after the first error so nothing follows a terminal marker.
        Ok(stop_after_error(chunks).boxed())
    }
}

fn decode_chunk(url: &str, data: &str, as_string: bool) -> Result<Value, ForwardError> {
    let chunk: Value = serde_json::from_str(data).map_err(|e| ForwardError::InvalidResponse {
        url: url.to_string(),
        reason: format!("undecodable stream chunk: {e}"),
    })?;
    Ok(wrap_result(chunk, as_string)?)
}

fn stop_after_error<S>(stream: S) -> impl Stream<Item = Result<Value, ForwardError>>
where
    S: Stream<Item = Result<Value, ForwardError>> + Send + 'static,
{
    futures_util::stream::unfold((stream.boxed(), false), |(mut inner, failed)| async move {
        if failed {
            return None;
        }
        let item = inner.next().await?;
        let failed = item.is_err();
        Some((item, (inner, failed)))
    })
}
