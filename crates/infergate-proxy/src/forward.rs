//! Synchronous forwarding to the local engine.
//!
//! One request in, one engine POST, one (optionally wrapped) result out.
//! Hooks run exactly once for every engine call that produced a JSON
//! reply, and never for validation, transport or dead-engine failures.

use std::sync::Arc;

use infergate_core::{
    ConfigError, EnvelopePolicy, ForwarderConfig, HookInvocation, InferenceRequest, wrap_result,
};
use infergate_hooks::HookDispatcher;
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info};

use crate::error::ForwardError;
use crate::readiness::{READINESS_POLL_INTERVAL, wait_for_engine_ready};

/// What a sync forward hands back to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ForwardOutcome {
    /// The result body alone.
    Bare(Value),
    /// The result body with the engine's HTTP status.
    WithStatus { status: u16, body: Value },
}

impl ForwardOutcome {
    pub const fn body(&self) -> &Value {
        match self {
            Self::Bare(body) | Self::WithStatus { body, .. } => body,
        }
    }

    /// Engine status to return, when status forwarding is on.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Bare(_) => None,
            Self::WithStatus { status, .. } => Some(*status),
        }
    }

    pub fn into_body(self) -> Value {
        match self {
            Self::Bare(body) | Self::WithStatus { body, .. } => body,
        }
    }
}

/// Forwards single requests to the engine's predict route.
#[derive(Debug)]
pub struct Forwarder {
    client: Client,
    predict_url: String,
    policy: EnvelopePolicy,
    wrap_response: bool,
    forward_http_status: bool,
    hooks: Arc<HookDispatcher>,
}

impl Forwarder {
    /// Build a forwarder without waiting for the engine.
    pub fn new(
        client: Client,
        config: &ForwarderConfig,
        hooks: Arc<HookDispatcher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            client,
            predict_url: config.predict_url(),
            policy: config.envelope_policy(),
            wrap_response: config.wrap_response,
            forward_http_status: config.forward_http_status,
            hooks,
        })
    }

    /// Validate the configuration, apply environment overrides, log the
    /// resolved endpoints and block until the engine reports ready.
    pub async fn load(
        client: Client,
        mut config: ForwarderConfig,
        hooks: Arc<HookDispatcher>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        config.log_summary();
        wait_for_engine_ready(&client, &config.healthcheck_url(), READINESS_POLL_INTERVAL).await;
        config.apply_env(|name| std::env::var(name).ok())?;
        info!(
            unwrap = config.model_engine_unwrap,
            serialize_results_as_string = config.serialize_results_as_string,
            "Sync forwarder ready"
        );
        Self::new(client, &config, hooks)
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    /// Forward one payload and run hooks on the produced result.
    ///
    /// `call_override` forces the string/raw result mode for this call.
    /// `task_id` is passed through to the hooks as the correlation id.
    pub async fn forward(
        &self,
        payload: &Value,
        call_override: Option<bool>,
        task_id: Option<&str>,
    ) -> Result<ForwardOutcome, ForwardError> {
        let request = InferenceRequest::parse(payload)?;
        let envelope = self.policy.resolve(payload, call_override);
        info!(keys = ?body_keys(&envelope.body), task_id = ?task_id, "Accepted request, forwarding");

        let response = self
            .client
            .post(&self.predict_url)
            .json(&envelope.body)
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.predict_url, "Failed to reach engine: {e}");
                ForwardError::from_send(&self.predict_url, &e)
            })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| ForwardError::Transport {
            url: self.predict_url.clone(),
            reason: e.to_string(),
        })?;
        if !(200..300).contains(&status)
            && let Some(dead) = ForwardError::dead_reply(&self.predict_url, status, &bytes)
        {
            error!(url = %self.predict_url, status, "Engine reports itself dead");
            return Err(dead);
        }
        let raw: Value = serde_json::from_slice(&bytes).map_err(|e| {
            error!(url = %self.predict_url, status, "Engine reply is not JSON: {e}");
            ForwardError::InvalidResponse {
                url: self.predict_url.clone(),
                reason: e.to_string(),
            }
        })?;
        log_reply(&raw, status);

        let result = if self.wrap_response {
            wrap_result(raw, envelope.serialize_as_string)?
        } else {
            raw
        };

        self.hooks
            .dispatch(HookInvocation::new(&request, &result, task_id))
            .await;

        Ok(if self.forward_http_status {
            ForwardOutcome::WithStatus {
                status,
                body: result,
            }
        } else {
            ForwardOutcome::Bare(result)
        })
    }
}

fn body_keys(body: &Value) -> Vec<&str> {
    body.as_object()
        .map(|map| map.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

fn log_reply(reply: &Value, status: u16) {
    match reply {
        Value::Object(map) => {
            info!(status, keys = ?map.keys().collect::<Vec<_>>(), "Got response from engine");
        }
        Value::Array(items) => info!(status, len = items.len(), "Got response from engine"),
        other => info!(status, response = %other, "Got response from engine"),
    }
}
