//! Post-inference hook identifiers and invocation tuple.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::request::InferenceRequest;

/// Kinds of post-inference hook an endpoint may enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Emit a billing record to the billing queue.
    Billing,
    /// Deliver the result to a callback URL.
    Callback,
    /// Append a durable inference event to the event log.
    Logging,
}

impl HookKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Callback => "callback",
            Self::Logging => "logging",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "billing" => Ok(Self::Billing),
            "callback" => Ok(Self::Callback),
            "logging" => Ok(Self::Logging),
            other => Err(format!("Unknown post-inference hook: {other}")),
        }
    }
}

/// Everything a hook needs about one completed request.
#[derive(Debug, Clone, Copy)]
pub struct HookInvocation<'a> {
    /// The request as received.
    pub request: &'a InferenceRequest,
    /// The result handed back to the caller (wrapped or raw).
    pub result: &'a Value,
    /// Correlation id (task id), if the caller has one.
    pub task_id: Option<&'a str>,
}

impl<'a> HookInvocation<'a> {
    pub const fn new(
        request: &'a InferenceRequest,
        result: &'a Value,
        task_id: Option<&'a str>,
    ) -> Self {
        Self {
            request,
            result,
            task_id,
        }
    }
}
