//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the dispatch core expects from the
//! inference engine, hook sinks and the metrics gateway. They contain no
//! transport details.
//!
//! # Design Rules
//!
//! - No `reqwest` or `axum` types in any signature
//! - All ports are object-safe and `Send + Sync` so they can live behind
//!   `Arc<dyn ...>` in the worker context

pub mod billing;
pub mod engine;
pub mod event_storage;
pub mod metrics;
pub mod progress;

use thiserror::Error;

pub use billing::{BillingQueue, BillingRecord};
pub use engine::{
    ENGINE_DEAD_MARKER, EngineClient, EngineError, EngineOutput, EngineStream, GenerateRequest,
    SamplingParams, reports_dead_engine,
};
pub use event_storage::{EventStorage, InferenceEvent};
pub use metrics::{BatchCompletionsMetric, MetricsGateway};
pub use progress::{BatchProgress, ProgressSink};

/// Failure of a side-channel sink (billing queue, event log, progress file).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not be reached or written.
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    /// The record could not be encoded.
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
