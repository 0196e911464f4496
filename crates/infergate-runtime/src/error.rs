//! Worker lifecycle errors.

use std::path::PathBuf;

use infergate_core::{ConfigError, EngineError};
use thiserror::Error;

/// Errors raised while bringing a worker up. Every variant is fatal.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Engine unavailable during initialization: {0}")]
    Engine(#[from] EngineError),

    /// The readiness marker file could not be written.
    #[error("Failed to write readiness marker {}: {source}", path.display())]
    Readiness {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker initialization failed: {0}")]
    Init(String),
}

impl WorkerError {
    /// Process exit code for this failure (sysexits.h where one fits).
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78,
            Self::Readiness { .. } => 74,
            Self::Engine(_) | Self::Init(_) => 1,
        }
    }
}
