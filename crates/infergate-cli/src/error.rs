//! CLI error type and exit codes.

use infergate_batch::BatchError;
use infergate_core::ConfigError;
use infergate_runtime::WorkerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    /// Binding or running the HTTP server failed.
    #[error("Server error: {0}")]
    Server(String),
}

impl CliError {
    /// Map error to an exit code (sysexits.h where one fits).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78,
            Self::Worker(e) => e.exit_code(),
            Self::Batch(e) if e.is_config_error() => 78,
            Self::Batch(BatchError::Io { .. }) => 74,
            Self::Batch(_) | Self::Server(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        assert_eq!(CliError::Config(ConfigError::Invalid("x".into())).exit_code(), 78);
        assert_eq!(
            CliError::Batch(BatchError::InvalidContent("x".into())).exit_code(),
            78
        );
        assert_eq!(CliError::Server("bind".into()).exit_code(), 1);
        assert_eq!(
            CliError::Worker(WorkerError::Init("x".into())).exit_code(),
            1
        );
    }
}
