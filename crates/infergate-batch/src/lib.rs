//! Batch completion jobs for infergate.
//!
//! A job fans its items out to the engine concurrently and writes one
//! JSON array ordered by submission index, `null` for items that failed.
//! Two content schemas are supported: a flat list of prompts sharing one
//! set of sampling parameters, and a list of individually parameterised
//! chat or completion requests.

#![deny(unsafe_code)]

mod error;
mod job;
mod metrics;
mod orchestrator;
mod output;
mod progress;
mod runner;

pub use error::BatchError;
pub use job::{
    BatchContent, BatchJobConfig, BatchModelConfig, DEFAULT_MODEL_WEIGHTS_FOLDER,
    ENV_MODEL_WEIGHTS_FOLDER, FlatBatch, model_weights_folder,
};
pub use metrics::TracingMetricsGateway;
pub use orchestrator::{BatchOrchestrator, BatchOutcome};
pub use output::write_output;
pub use progress::{CompositeProgressSink, FileProgressSink, NoopProgressSink};
pub use runner::{BatchReport, run_job};
