//! Progress sinks for batch jobs.
//!
//! The orchestrator reports `completed / total` after every slot. Sinks
//! decide where that goes: a JSON file polled by an external supervisor,
//! a terminal bar (in the CLI), or nowhere.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use infergate_core::{BatchProgress, ProgressSink, SinkError};

/// A sink that ignores all updates.
///
/// Use this when progress reporting is not needed (tests, one-off runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

#[async_trait]
impl ProgressSink for NoopProgressSink {
    async fn report(&self, _completed: usize, _total: usize) -> Result<(), SinkError> {
        Ok(())
    }

    async fn finish(&self, _total: usize) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes `{"progress": <0..100>, "finished": <bool>}` to a local file.
///
/// Each update goes to a sibling temp file first and is renamed into
/// place, so readers never observe a half-written document.
#[derive(Debug, Clone)]
pub struct FileProgressSink {
    path: PathBuf,
}

impl FileProgressSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write(&self, progress: BatchProgress) -> Result<(), SinkError> {
        let body = serde_json::to_vec(&progress)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressSink for FileProgressSink {
    async fn report(&self, completed: usize, total: usize) -> Result<(), SinkError> {
        self.write(BatchProgress::from_counts(completed, total, false))
            .await
    }

    async fn finish(&self, total: usize) -> Result<(), SinkError> {
        self.write(BatchProgress::from_counts(total, total, true))
            .await
    }
}

/// Fans every update out to several sinks.
///
/// All sinks are called even if an earlier one fails; the first error is
/// returned.
#[derive(Clone, Default)]
pub struct CompositeProgressSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl CompositeProgressSink {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl ProgressSink for CompositeProgressSink {
    async fn report(&self, completed: usize, total: usize) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.report(completed, total).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    async fn finish(&self, total: usize) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.finish(total).await {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn read(path: &Path) -> Value {
        serde_json::from_str(&tokio::fs::read_to_string(path).await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn file_sink_writes_percentage_then_finished() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileProgressSink::new(dir.path().join("progress.json"));

        sink.report(1, 4).await.unwrap();
        assert_eq!(read(sink.path()).await, json!({"progress": 25.0, "finished": false}));

        sink.finish(4).await.unwrap();
        assert_eq!(read(sink.path()).await, json!({"progress": 100.0, "finished": true}));
        assert!(!dir.path().join("progress.json.tmp").exists());
    }

    #[tokio::test]
    async fn file_sink_reports_missing_directory() {
        let sink = FileProgressSink::new("/nonexistent-dir/progress.json");
        assert!(matches!(sink.report(0, 1).await, Err(SinkError::Io(_))));
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl ProgressSink for Counting {
        async fn report(&self, _completed: usize, _total: usize) -> Result<(), SinkError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn finish(&self, _total: usize) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn composite_keeps_going_after_a_failing_sink() {
        let counting = Arc::new(Counting::default());
        let composite = CompositeProgressSink::new(vec![
            Arc::new(FileProgressSink::new("/nonexistent-dir/progress.json")),
            counting.clone(),
        ]);

        assert!(composite.report(1, 2).await.is_err());
        assert_eq!(counting.0.load(Ordering::SeqCst), 1);
        assert_eq!(composite.len(), 2);
    }
}
