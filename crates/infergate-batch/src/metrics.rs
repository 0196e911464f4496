//! Metrics gateway that records through `tracing`.

use infergate_core::{BatchCompletionsMetric, MetricsGateway};
use serde_json::Value;
use tracing::info;

/// Logs each metric on the `metrics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsGateway;

impl MetricsGateway for TracingMetricsGateway {
    fn emit_batch_completions(&self, metric: &BatchCompletionsMetric) {
        info!(
            target: "metrics",
            model = %metric.model,
            use_tool = metric.use_tool,
            num_prompt_tokens = metric.num_prompt_tokens,
            num_completion_tokens = metric.num_completion_tokens,
            is_finetuned = metric.is_finetuned,
            "batch completions"
        );
    }
}

/// Prompt and completion token totals from OpenAI-shaped `usage` blocks.
/// Replies without usage count as zero.
pub(crate) fn usage_totals<'a>(replies: impl Iterator<Item = &'a Value>) -> (u64, u64) {
    replies.fold((0, 0), |(prompt, completion), reply| {
        let usage = &reply["usage"];
        (
            prompt + usage["prompt_tokens"].as_u64().unwrap_or(0),
            completion + usage["completion_tokens"].as_u64().unwrap_or(0),
        )
    })
}
