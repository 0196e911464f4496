//! Batch job errors.

use std::path::PathBuf;

use infergate_core::{BatchItemKind, ConfigError, EngineError};
use thiserror::Error;

/// Errors that abort a whole batch job.
///
/// Individual item failures are not errors at this level; they become
/// `null` slots in the output document.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The batch content does not match either schema.
    #[error("Invalid batch content: {0}")]
    InvalidContent(String),

    /// A per-request batch mixes chat and plain completion items.
    #[error("Batch item {index} is a {found:?} request but the batch started with {expected:?}")]
    MixedShapes {
        index: usize,
        expected: BatchItemKind,
        found: BatchItemKind,
    },

    /// Reading input or writing output failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    /// The engine reported itself unusable mid-batch.
    #[error("Engine died during batch: {0}")]
    EngineDead(EngineError),
}

impl BatchError {
    /// Whether the job was rejected before any engine call was made.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::InvalidContent(_) | Self::MixedShapes { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
