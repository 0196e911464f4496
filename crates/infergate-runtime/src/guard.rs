//! One-time worker initialization.
//!
//! The engine handle and hook dispatcher are built once per process and
//! shared read-only by every request afterwards. `WorkerGuard` owns that
//! one-shot construction: any number of callers may race on
//! [`WorkerGuard::ensure_initialized`], exactly one runs the initializer.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use infergate_core::{ConfigError, EndpointConfig, EngineClient, parse_bool_flag};
use infergate_hooks::HookDispatcher;
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::WorkerError;
use crate::readiness::ReadinessMarker;

/// Environment variable selecting eager initialization at startup.
pub const ENV_PREWARM: &str = "PREWARM";

/// Shared per-process dependencies handed to every request.
#[derive(Clone)]
pub struct WorkerContext {
    pub engine: Arc<dyn EngineClient>,
    pub endpoint: EndpointConfig,
    pub hooks: Arc<HookDispatcher>,
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("engine", &self.engine)
            .field("endpoint", &self.endpoint.endpoint_name)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Builds the worker context. Runs at most once per [`WorkerGuard`].
///
/// Most initializers return [`WorkerContext`]; adapters that need more
/// per-process state wrap it in their own context type.
#[async_trait]
pub trait Initializer: Send + Sync {
    type Context: Send + Sync + 'static;

    async fn initialize(&self) -> Result<Self::Context, WorkerError>;
}

/// Endpoint name for initialization logs.
pub trait NamedContext {
    fn endpoint_name(&self) -> &str;
}

impl NamedContext for WorkerContext {
    fn endpoint_name(&self) -> &str {
        &self.endpoint.endpoint_name
    }
}

/// When the worker initializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrewarmMode {
    /// Initialize at startup; ready only once that finishes.
    Eager,
    /// Ready at startup; the first request pays for initialization.
    #[default]
    Lazy,
}

impl PrewarmMode {
    pub const fn from_flag(prewarm: bool) -> Self {
        if prewarm { Self::Eager } else { Self::Lazy }
    }

    /// Mode from `PREWARM`; unset means lazy.
    pub fn from_env() -> Result<Self, ConfigError> {
        let flag = parse_bool_flag(ENV_PREWARM, std::env::var(ENV_PREWARM).ok())?;
        Ok(Self::from_flag(flag.unwrap_or(false)))
    }
}

pub struct WorkerGuard<I: Initializer> {
    initializer: I,
    context: OnceCell<Arc<I::Context>>,
    marker: ReadinessMarker,
    eager: AtomicBool,
}

impl<I: Initializer> fmt::Debug for WorkerGuard<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerGuard")
            .field("initialized", &self.context.initialized())
            .field("marker", &self.marker)
            .finish_non_exhaustive()
    }
}

impl<I> WorkerGuard<I>
where
    I: Initializer,
    I::Context: NamedContext,
{
    pub fn new(initializer: I, marker: ReadinessMarker) -> Self {
        Self {
            initializer,
            context: OnceCell::new(),
            marker,
            eager: AtomicBool::new(false),
        }
    }

    pub const fn marker(&self) -> &ReadinessMarker {
        &self.marker
    }

    pub fn is_initialized(&self) -> bool {
        self.context.initialized()
    }

    /// Process-start entry point.
    ///
    /// Eager mode initializes now and marks ready afterwards. Lazy mode
    /// marks ready immediately and leaves initialization to the first
    /// request.
    pub async fn start(&self, mode: PrewarmMode) -> Result<(), WorkerError> {
        match mode {
            PrewarmMode::Eager => {
                self.eager.store(true, Ordering::SeqCst);
                self.ensure_initialized().await?;
            }
            PrewarmMode::Lazy => {
                info!("Not prewarming, deferring initialization to first request");
                self.marker.mark_ready().await?;
            }
        }
        Ok(())
    }

    /// Return the shared context, initializing it on first use.
    ///
    /// Concurrent callers wait for the single in-flight initialization. A
    /// failed initialization is not cached; callers treat it as fatal.
    pub async fn ensure_initialized(&self) -> Result<Arc<I::Context>, WorkerError> {
        self.context
            .get_or_try_init(|| async {
                let context = self.initializer.initialize().await?;
                self.marker.mark_ready().await?;
                if self.eager.load(Ordering::SeqCst) {
                    info!(endpoint = context.endpoint_name(), "Initialized worker at startup");
                } else {
                    info!(endpoint = context.endpoint_name(), "Late initialized worker");
                }
                Ok::<_, WorkerError>(Arc::new(context))
            })
            .await
            .map(Arc::clone)
    }
}
