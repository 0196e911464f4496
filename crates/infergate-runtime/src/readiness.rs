//! Readiness marker.
//!
//! Readiness is published two ways: a marker file for external probes and
//! an in-process `watch` flag that the HTTP front surface serves at
//! `/readyz`. Both flip exactly once, from not ready to ready.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::info;

use crate::error::WorkerError;

/// Environment variable overriding the marker file location.
pub const ENV_READYZ_PATH: &str = "READYZ_PATH";

pub const DEFAULT_READYZ_PATH: &str = "/tmp/readyz";

const READY_CONTENTS: &str = "READY";

#[derive(Debug)]
pub struct ReadinessMarker {
    path: Option<PathBuf>,
    ready: watch::Sender<bool>,
}

impl ReadinessMarker {
    /// Marker backed by a file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            path: Some(path.into()),
            ready,
        }
    }

    /// Marker with no file; only the in-process flag flips.
    pub fn in_memory() -> Self {
        let (ready, _) = watch::channel(false);
        Self { path: None, ready }
    }

    /// Marker at `READYZ_PATH`, or the default location.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(ENV_READYZ_PATH).unwrap_or_else(|_| DEFAULT_READYZ_PATH.to_string()),
        )
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Receiver that observes the readiness flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Write the marker file, then flip the flag.
    ///
    /// Repeated calls are harmless.
    pub async fn mark_ready(&self) -> Result<(), WorkerError> {
        if self.is_ready() {
            return Ok(());
        }
        if let Some(path) = &self.path {
            tokio::fs::write(path, READY_CONTENTS)
                .await
                .map_err(|source| WorkerError::Readiness {
                    path: path.clone(),
                    source,
                })?;
        }
        self.ready.send_replace(true);
        info!(path = ?self.path, "Worker marked ready");
        Ok(())
    }
}
