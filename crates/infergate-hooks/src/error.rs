//! Hook error types.

use infergate_core::SinkError;
use thiserror::Error;

/// Failure of a single hook. Logged by the dispatcher, never propagated.
#[derive(Debug, Error)]
pub enum HookError {
    /// Callback delivery failed at the transport level (including timeout).
    #[error("Callback delivery to {url} failed: {reason}")]
    CallbackTransport { url: String, reason: String },

    /// Callback receiver answered with a non-success status.
    #[error("Callback receiver {url} returned status {status}")]
    CallbackStatus { url: String, status: u16 },

    /// A sink (billing queue, event log) rejected the record.
    #[error(transparent)]
    Sink(#[from] SinkError),
}
