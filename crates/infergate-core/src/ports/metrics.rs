//! Metrics gateway port.

use serde::Serialize;

/// Emitted once per batch job, after its output document is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchCompletionsMetric {
    /// Served model name.
    pub model: String,
    pub use_tool: bool,
    pub num_prompt_tokens: u64,
    pub num_completion_tokens: u64,
    /// Whether the model was loaded from a checkpoint.
    pub is_finetuned: bool,
}

/// Destination for inference metrics.
///
/// Emission is fire-and-forget: implementations swallow their own
/// failures so a metrics outage never fails a job.
pub trait MetricsGateway: Send + Sync {
    fn emit_batch_completions(&self, metric: &BatchCompletionsMetric);
}
