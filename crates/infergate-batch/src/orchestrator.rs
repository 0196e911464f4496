//! Concurrent fan-out with index-ordered fan-in.
//!
//! Every item runs as its own task against the engine. Results are
//! recorded in whatever order they finish and read back by index, so the
//! output document never depends on completion order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use infergate_core::{
    BatchItem, CompletionOutput, EngineClient, EngineError, GenerateRequest, ProgressSink,
    SlotTable,
};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::BatchError;
use crate::job::FlatBatch;

/// Ordered results of one orchestrated batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    /// One entry per submitted item, `None` where the item failed or never
    /// finished.
    pub results: Vec<Option<T>>,
    /// Whether the deadline cut the batch short.
    pub timed_out: bool,
}

impl<T> BatchOutcome<T> {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

/// Runs batches against one engine and reports progress to one sink.
#[derive(Clone)]
pub struct BatchOrchestrator {
    engine: Arc<dyn EngineClient>,
    progress: Arc<dyn ProgressSink>,
    max_parallel: Option<usize>,
    deadline: Duration,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("engine", &self.engine)
            .field("max_parallel", &self.max_parallel)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    pub fn new(
        engine: Arc<dyn EngineClient>,
        progress: Arc<dyn ProgressSink>,
        deadline: Duration,
    ) -> Self {
        Self {
            engine,
            progress,
            max_parallel: None,
            deadline,
        }
    }

    /// Cap the number of items in flight at once.
    #[must_use]
    pub const fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Run a flat batch through the streaming generation interface.
    pub async fn run_flat(
        &self,
        batch: &FlatBatch,
    ) -> Result<BatchOutcome<CompletionOutput>, BatchError> {
        let params = batch.sampling_params();
        let want_tokens = batch.return_token_log_probs;
        let request_ids: Vec<String> = batch
            .prompts
            .iter()
            .map(|_| Uuid::new_v4().to_string())
            .collect();

        self.fan_out(batch.prompts.len(), &request_ids, |index| {
            let engine = Arc::clone(&self.engine);
            let request = GenerateRequest {
                request_id: request_ids[index].clone(),
                prompt: batch.prompts[index].clone(),
                params: params.clone(),
            };
            async move { generate_one(engine.as_ref(), request, want_tokens).await }
        })
        .await
    }

    /// Run per-request items through the completion routes.
    pub async fn run_per_request(
        &self,
        items: &[BatchItem],
        model: &str,
    ) -> Result<BatchOutcome<Value>, BatchError> {
        self.fan_out(items.len(), &[], |index| {
            let engine = Arc::clone(&self.engine);
            let item = items[index].clone();
            let model = model.to_string();
            async move { engine.complete(&item, &model).await }
        })
        .await
    }

    async fn fan_out<T, F, Fut>(
        &self,
        total: usize,
        request_ids: &[String],
        mut make_task: F,
    ) -> Result<BatchOutcome<T>, BatchError>
    where
        T: Send + 'static,
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
    {
        info!(
            total,
            max_parallel = ?self.max_parallel,
            deadline_secs = self.deadline.as_secs(),
            "Starting batch"
        );

        let semaphore = self.max_parallel.map(|n| Arc::new(Semaphore::new(n)));
        let mut tasks = JoinSet::new();
        for index in 0..total {
            let task = make_task(index);
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                (index, task.await)
            });
        }

        let mut slots = SlotTable::new(total);
        let mut completed = 0;
        let mut timed_out = false;
        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { break };
                    completed += 1;
                    let recorded = match joined {
                        Ok((index, Ok(value))) => {
                            debug!(index, "Batch item finished");
                            slots.fill(index, value)
                        }
                        Ok((index, Err(e))) if e.is_fatal() => {
                            error!(index, error = %e, "Engine died, abandoning batch");
                            tasks.abort_all();
                            return Err(BatchError::EngineDead(e));
                        }
                        Ok((index, Err(e))) => {
                            warn!(index, error = %e, "Batch item failed");
                            slots.fail(index)
                        }
                        Err(e) => {
                            // Index is lost with the task; its slot stays empty.
                            warn!(error = %e, "Batch task did not complete");
                            Ok(())
                        }
                    };
                    if let Err(e) = recorded {
                        warn!(error = %e, "Ignoring duplicate batch result");
                    }
                    if let Err(e) = self.progress.report(completed, total).await {
                        warn!(error = %e, "Failed to report batch progress");
                    }
                }
                () = &mut deadline => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            let pending = slots.pending();
            warn!(
                pending = pending.len(),
                total, "Batch deadline reached, aborting unfinished items"
            );
            tasks.abort_all();
            for index in pending {
                if let Some(request_id) = request_ids.get(index)
                    && let Err(e) = self.engine.abort(request_id).await
                {
                    warn!(index, request_id = %request_id, error = %e, "Failed to abort generation");
                }
            }
        }

        let outcome = BatchOutcome {
            results: slots.into_ordered(),
            timed_out,
        };
        info!(
            total,
            succeeded = outcome.succeeded(),
            failed = outcome.failed(),
            timed_out,
            "Batch finished"
        );
        Ok(outcome)
    }
}

/// Drive one generation to its terminal output.
///
/// Per-step log probabilities are collected only when requested, every
/// entry of each step in the engine's order. Token counts come from the
/// finished output as reported by the engine.
async fn generate_one(
    engine: &dyn EngineClient,
    request: GenerateRequest,
    want_tokens: bool,
) -> Result<CompletionOutput, EngineError> {
    let request_id = request.request_id.clone();
    let mut outputs = engine.generate(request).await?;
    let mut tokens = want_tokens.then(Vec::new);

    while let Some(output) = outputs.next().await {
        let output = output?;
        if let (Some(tokens), Some(step)) = (tokens.as_mut(), output.logprobs) {
            tokens.extend(step);
        }
        if output.finished {
            return Ok(CompletionOutput {
                text: output.text,
                num_prompt_tokens: output.num_prompt_tokens,
                num_completion_tokens: output.num_completion_tokens,
                tokens,
            });
        }
    }
    Err(EngineError::Decode(format!(
        "generation {request_id} ended without a final output"
    )))
}
