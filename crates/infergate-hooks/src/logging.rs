//! Durable inference event hook and a JSON-lines event store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use infergate_core::{
    EndpointConfig, EventStorage, HookInvocation, HookKind, InferenceEvent, SinkError,
};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::dispatcher::PostInferenceHook;
use crate::error::HookError;

/// Appends one [`InferenceEvent`] per completed request.
pub struct LoggingHook {
    endpoint_id: Option<String>,
    endpoint_name: String,
    bundle_id: Option<String>,
    labels: BTreeMap<String, String>,
    storage: Arc<dyn EventStorage>,
}

impl LoggingHook {
    pub fn new(config: &EndpointConfig, storage: Arc<dyn EventStorage>) -> Self {
        Self {
            endpoint_id: config.endpoint_id.clone(),
            endpoint_name: config.endpoint_name.clone(),
            bundle_id: config.bundle_id.clone(),
            labels: config.labels.clone(),
            storage,
        }
    }
}

#[async_trait]
impl PostInferenceHook for LoggingHook {
    fn kind(&self) -> HookKind {
        HookKind::Logging
    }

    async fn run(&self, invocation: HookInvocation<'_>) -> Result<(), HookError> {
        let event = InferenceEvent {
            request_id: invocation.task_id.map(str::to_string),
            endpoint_id: self.endpoint_id.clone(),
            endpoint_name: self.endpoint_name.clone(),
            bundle_id: self.bundle_id.clone(),
            labels: self.labels.clone(),
            request: invocation.request.to_value(),
            response: invocation.result.clone(),
            timestamp: Utc::now(),
        };
        self.storage.put(&event).await?;
        Ok(())
    }
}

/// Event store appending one JSON document per line to a local file.
///
/// Writes are serialized through a mutex so concurrent requests never
/// interleave partial lines.
#[derive(Debug)]
pub struct JsonlEventStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlEventStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventStorage for JsonlEventStorage {
    async fn put(&self, event: &InferenceEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
