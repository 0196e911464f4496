//! `infergate batch`.

use std::sync::Arc;

use infergate_batch::{
    BatchError, BatchReport, CompositeProgressSink, FileProgressSink, TracingMetricsGateway,
    model_weights_folder, run_job,
};
use infergate_core::ProgressSink;
use infergate_runtime::{FatalHandler, PrewarmMode, ReadinessMarker, WorkerGuard};
use reqwest::Client;

use crate::bootstrap::{BatchInitializer, load_batch_job};
use crate::commands::BatchArgs;
use crate::error::CliError;
use crate::progress::BarProgressSink;

/// Progress sinks selected by the arguments.
pub fn progress_sinks(args: &BatchArgs) -> CompositeProgressSink {
    let mut sinks: Vec<Arc<dyn ProgressSink>> = Vec::new();
    if let Some(path) = &args.progress_file {
        sinks.push(Arc::new(FileProgressSink::new(path)));
    }
    if !args.no_progress_bar {
        sinks.push(Arc::new(BarProgressSink::new()));
    }
    CompositeProgressSink::new(sinks)
}

pub async fn execute(args: BatchArgs, fatal: &FatalHandler) -> Result<BatchReport, CliError> {
    let job = load_batch_job(&args.job, &args.set)?;

    let guard = WorkerGuard::new(
        BatchInitializer {
            http: Client::new(),
            engine_url: args.engine_url.clone(),
            endpoint_config: None,
        },
        ReadinessMarker::in_memory(),
    );
    guard.start(PrewarmMode::Eager).await?;
    let context = guard.ensure_initialized().await?;

    let progress = Arc::new(progress_sinks(&args));
    let result = run_job(
        &job,
        Arc::clone(&context.engine),
        progress,
        &TracingMetricsGateway,
        &model_weights_folder(),
    )
    .await;

    if let Err(BatchError::EngineDead(e)) = &result {
        fatal.check(e);
    }
    let report = result?;
    println!(
        "{} of {} items succeeded{}; output written to {}",
        report.succeeded,
        report.total,
        if report.timed_out { " (deadline reached)" } else { "" },
        report.output_path.display()
    );
    Ok(report)
}
