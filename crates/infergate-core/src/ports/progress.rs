//! Batch progress reporting port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::SinkError;

/// Progress document polled by external callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Percentage complete, 0 to 100.
    pub progress: f64,
    pub finished: bool,
}

impl BatchProgress {
    /// Progress for `completed` out of `total` items. An empty batch is
    /// 100% complete.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(completed: usize, total: usize, finished: bool) -> Self {
        let progress = if total == 0 {
            100.0
        } else {
            (completed.min(total) as f64 / total as f64) * 100.0
        };
        Self { progress, finished }
    }
}

/// Receives `completed / total` updates from the batch orchestrator.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Report that `completed` of `total` items have reached a terminal state.
    async fn report(&self, completed: usize, total: usize) -> Result<(), SinkError>;

    /// Report that the output document has been written.
    async fn finish(&self, total: usize) -> Result<(), SinkError>;
}
