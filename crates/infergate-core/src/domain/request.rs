//! Inference request parsing and validation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Credentials attached to a callback delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CallbackAuth {
    /// No credentials.
    None,
    /// `Authorization: Bearer <token>`.
    Bearer { token: String },
    /// HTTP basic auth.
    Basic { username: String, password: String },
}

/// Client-side validation failures. These never reach the engine.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The payload is not a JSON object.
    #[error("Request payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A recognised field has the wrong shape.
    #[error("Invalid request field: {0}")]
    InvalidField(String),

    /// More than one input source was supplied.
    #[error("Only one of url, args or cloudpickle may be provided")]
    ConflictingInputs,
}

impl RequestError {
    /// Suggested HTTP status code for this error.
    #[must_use]
    pub const fn suggested_status_code(&self) -> u16 {
        400
    }
}

/// Recognised top-level keys of a predict request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
struct PredictFields {
    url: Option<String>,
    args: Option<Value>,
    cloudpickle: Option<String>,
    callback_url: Option<String>,
    callback_auth: Option<CallbackAuth>,
}

/// One generation request as received at the API boundary.
///
/// Immutable once parsed: the original payload is kept verbatim so the
/// hook dispatcher sees exactly what the caller sent, and the recognised
/// routing fields are extracted once up front.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceRequest {
    payload: Map<String, Value>,
    fields: PredictFields,
}

impl InferenceRequest {
    /// Parse and validate a JSON payload.
    ///
    /// Unknown keys are preserved. Recognised keys must have the right type
    /// and at most one of `url`, `args` and `cloudpickle` may be present.
    pub fn parse(payload: &Value) -> Result<Self, RequestError> {
        let Value::Object(map) = payload else {
            return Err(RequestError::NotAnObject(json_kind(payload)));
        };

        let fields: PredictFields = serde_json::from_value(payload.clone())
            .map_err(|e| RequestError::InvalidField(e.to_string()))?;

        let sources = [
            fields.url.is_some(),
            fields.args.is_some(),
            fields.cloudpickle.is_some(),
        ];
        if sources.iter().filter(|set| **set).count() > 1 {
            return Err(RequestError::ConflictingInputs);
        }

        Ok(Self {
            payload: map.clone(),
            fields,
        })
    }

    /// Per-request callback URL, overriding the endpoint default.
    pub fn callback_url(&self) -> Option<&str> {
        self.fields.callback_url.as_deref()
    }

    /// Per-request callback credentials, overriding the endpoint default.
    pub const fn callback_auth(&self) -> Option<&CallbackAuth> {
        self.fields.callback_auth.as_ref()
    }

    /// The payload as a JSON value, for logging and hook records.
    pub fn to_value(&self) -> Value {
        Value::Object(self.payload.clone())
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
