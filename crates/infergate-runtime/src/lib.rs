//! Worker lifecycle for infergate.
//!
//! - [`WorkerGuard`]: one initialization per process, shared context after
//! - [`ReadinessMarker`]: marker file plus in-process readiness flag
//! - [`FatalHandler`]: terminates the process when the engine dies

#![deny(unsafe_code)]

mod error;
mod fatal;
mod guard;
mod readiness;

pub use error::WorkerError;
pub use fatal::{ENGINE_DEAD_EXIT_CODE, FatalHandler, ProcessExit, StdProcessExit};
pub use guard::{ENV_PREWARM, Initializer, NamedContext, PrewarmMode, WorkerContext, WorkerGuard};
pub use readiness::{DEFAULT_READYZ_PATH, ENV_READYZ_PATH, ReadinessMarker};
