//! Core domain types and port definitions for infergate.
//!
//! This crate has no HTTP, filesystem or runtime dependencies. Adapters
//! (`infergate-proxy`, `infergate-batch`, `infergate-hooks`) depend on it and
//! implement or consume the traits in [`ports`].

pub mod config;
pub mod domain;
pub mod envelope;
pub mod ports;

// Re-export commonly used types for convenience
pub use config::{
    CallbackAuthConfig, ConfigError, ENV_SERIALIZE_RESULTS_AS_STRING, EndpointConfig,
    ForwarderConfig, apply_overrides, parse_bool_flag,
};
pub use domain::{
    BatchItem, BatchItemKind, BatchSlot, CallbackAuth, CompletionOutput, HookInvocation, HookKind,
    InferenceRequest, RequestError, SlotError, SlotTable, TokenOutput,
};
pub use envelope::{
    Envelope, EnvelopePolicy, KEY_SERIALIZE_RESULTS_AS_STRING, to_spaced_json, wrap_result,
};
pub use ports::{
    BatchCompletionsMetric, BatchProgress, BillingQueue, BillingRecord, ENGINE_DEAD_MARKER,
    EngineClient, EngineError, EngineOutput, EngineStream, EventStorage, GenerateRequest,
    InferenceEvent, MetricsGateway, ProgressSink, SamplingParams, SinkError, reports_dead_engine,
};
