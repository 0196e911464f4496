//! Forwarding errors.

use infergate_core::{RequestError, reports_dead_engine};
use thiserror::Error;

use crate::sse::SseError;

/// Errors surfaced by the sync and streaming forwarders.
///
/// Validation failures never reach the engine. Transport and response
/// failures are hard failures and are not retried here.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The request body is not JSON.
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    /// The payload does not match the request schema.
    #[error(transparent)]
    Validation(#[from] RequestError),

    /// The engine is gone or reports itself dead. The worker must exit.
    #[error("Engine at {url} is dead: {reason}")]
    EngineDead { url: String, reason: String },

    /// The worker could not be initialized.
    #[error("Worker unavailable: {0}")]
    Unavailable(String),

    /// The engine could not be reached, or it refused the stream.
    #[error("Failed to reach engine at {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The engine replied with something that is not JSON.
    #[error("Invalid response from engine at {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    /// The result could not be wrapped in its envelope.
    #[error("Failed to wrap result: {0}")]
    Envelope(#[from] serde_json::Error),
}

impl ForwardError {
    /// Client errors are the caller's fault and must not be retried as-is.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::MalformedBody(_) | Self::Validation(_))
    }

    #[must_use]
    pub const fn is_engine_dead(&self) -> bool {
        matches!(self, Self::EngineDead { .. })
    }

    /// Suggested HTTP status code for this error.
    #[must_use]
    pub const fn suggested_status_code(&self) -> u16 {
        match self {
            Self::MalformedBody(_) => 400,
            Self::Validation(e) => e.suggested_status_code(),
            Self::Transport { .. } | Self::InvalidResponse { .. } => 502,
            Self::EngineDead { .. } | Self::Unavailable(_) => 503,
            Self::Envelope(_) => 500,
        }
    }

    /// Classify a request that never got a reply.
    ///
    /// Forwarders only run once the engine has reported ready, so a refused
    /// connection means the engine process is gone.
    pub(crate) fn from_send(url: &str, err: &reqwest::Error) -> Self {
        if err.is_connect() {
            Self::EngineDead {
                url: url.to_string(),
                reason: err.to_string(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Classify a non-success reply body, when it reports a dead engine.
    pub(crate) fn dead_reply(url: &str, status: u16, body: &[u8]) -> Option<Self> {
        let body = String::from_utf8_lossy(body);
        reports_dead_engine(&body).then(|| Self::EngineDead {
            url: url.to_string(),
            reason: format!("status {status}: {body}"),
        })
    }

    pub(crate) fn from_sse(url: &str, err: SseError) -> Self {
        Self::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
