//! Wire types for the front surface.

use serde::{Deserialize, Serialize};

use crate::error::ForwardError;

/// Error body returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail within an error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
            },
        }
    }
}

impl From<&ForwardError> for ErrorResponse {
    fn from(err: &ForwardError) -> Self {
        let error_type = match err {
            ForwardError::MalformedBody(_) | ForwardError::Validation(_) => {
                "invalid_request_error"
            }
            ForwardError::Transport { .. } | ForwardError::InvalidResponse { .. } => {
                "upstream_error"
            }
            ForwardError::EngineDead { .. } => "engine_dead",
            ForwardError::Unavailable(_) | ForwardError::Envelope(_) => "server_error",
        };
        Self::new(err.to_string(), error_type)
    }
}

/// Query parameters accepted by the forwarding routes.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ForwardQuery {
    /// Call-level override of the result serialization mode.
    pub serialize_results_as_string: Option<bool>,
}
