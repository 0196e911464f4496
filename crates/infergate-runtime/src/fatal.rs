//! Fatal engine handling.
//!
//! A dead engine cannot recover in-process. The worker terminates so its
//! supervisor can restart it.

use std::fmt;
use std::sync::Arc;

use infergate_core::EngineError;
use tracing::error;

/// Exit code used when the engine dies.
pub const ENGINE_DEAD_EXIT_CODE: i32 = 1;

/// How the process terminates.
pub trait ProcessExit: Send + Sync {
    fn exit(&self, code: i32, reason: &str);
}

/// Terminates the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdProcessExit;

impl ProcessExit for StdProcessExit {
    fn exit(&self, code: i32, reason: &str) {
        error!(code, reason, "Terminating worker");
        std::process::exit(code);
    }
}

#[derive(Clone)]
pub struct FatalHandler {
    exit: Arc<dyn ProcessExit>,
}

impl fmt::Debug for FatalHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FatalHandler").finish_non_exhaustive()
    }
}

impl Default for FatalHandler {
    fn default() -> Self {
        Self::new(Arc::new(StdProcessExit))
    }
}

impl FatalHandler {
    pub fn new(exit: Arc<dyn ProcessExit>) -> Self {
        Self { exit }
    }

    /// Terminate if `err` reports a dead engine.
    ///
    /// Returns whether the error was fatal. With the default exit this
    /// never returns `true`.
    pub fn check(&self, err: &EngineError) -> bool {
        if !err.is_fatal() {
            return false;
        }
        error!(error = %err, "Engine is dead");
        self.terminate(ENGINE_DEAD_EXIT_CODE, &err.to_string());
        true
    }

    /// Terminate unconditionally, for failures outside the engine such as
    /// a failed worker initialization.
    pub fn terminate(&self, code: i32, reason: &str) {
        self.exit.exit(code, reason);
    }
}
