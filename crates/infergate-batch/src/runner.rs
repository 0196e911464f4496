//! End-to-end batch job execution.

use std::path::PathBuf;
use std::sync::Arc;

use infergate_core::{BatchCompletionsMetric, EngineClient, MetricsGateway, ProgressSink};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::BatchError;
use crate::job::{BatchContent, BatchJobConfig};
use crate::metrics::usage_totals;
use crate::orchestrator::BatchOrchestrator;
use crate::output::write_output;

/// Summary of a completed batch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub schema: &'static str,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: bool,
    pub output_path: PathBuf,
}

/// Load the job's content, run it, write the output document, emit the
/// batch completions metric, then mark progress finished.
///
/// Item failures and a deadline expiry still produce an output document.
/// Only configuration errors, I/O failures and a dead engine return `Err`.
pub async fn run_job(
    config: &BatchJobConfig,
    engine: Arc<dyn EngineClient>,
    progress: Arc<dyn ProgressSink>,
    metrics: &dyn MetricsGateway,
    weights_folder: &str,
) -> Result<BatchReport, BatchError> {
    config.validate()?;
    let content = config.load_content().await?;
    let schema = content.schema();
    let total = content.len();
    let orchestrator = BatchOrchestrator::new(engine, Arc::clone(&progress), config.deadline())
        .with_max_parallel(config.max_parallel);

    let model = config.served_model_name(weights_folder);
    let (succeeded, timed_out, (num_prompt_tokens, num_completion_tokens)) = match &content {
        BatchContent::Flat(batch) => {
            let outcome = orchestrator.run_flat(batch).await?;
            write_output(&config.output_data_path, &outcome.results).await?;
            let tokens = outcome.results.iter().flatten().fold((0, 0), |(p, c), out| {
                (
                    p + u64::from(out.num_prompt_tokens),
                    c + u64::from(out.num_completion_tokens),
                )
            });
            (outcome.succeeded(), outcome.timed_out, tokens)
        }
        BatchContent::PerRequest(items) => {
            let outcome = orchestrator.run_per_request(items, &model).await?;
            write_output(&config.output_data_path, &outcome.results).await?;
            let tokens = usage_totals(outcome.results.iter().flatten());
            (outcome.succeeded(), outcome.timed_out, tokens)
        }
    };

    metrics.emit_batch_completions(&BatchCompletionsMetric {
        model,
        use_tool: false,
        num_prompt_tokens,
        num_completion_tokens,
        is_finetuned: config.model_cfg.checkpoint_path.is_some(),
    });

    if let Err(e) = progress.finish(total).await {
        warn!(error = %e, "Failed to mark batch progress finished");
    }

    let report = BatchReport {
        schema,
        total,
        succeeded,
        failed: total - succeeded,
        timed_out,
        output_path: config.output_data_path.clone(),
    };
    info!(
        schema,
        total,
        succeeded,
        failed = report.failed,
        timed_out,
        output = %report.output_path.display(),
        "Batch job complete"
    );
    Ok(report)
}
