//! Hook dispatcher.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use infergate_core::{
    BillingQueue, ConfigError, EndpointConfig, EventStorage, HookInvocation, HookKind,
};
use tracing::{debug, error, info};

use crate::billing::BillingHook;
use crate::callback::{CallbackHook, DEFAULT_CALLBACK_TIMEOUT};
use crate::error::HookError;
use crate::logging::LoggingHook;

/// A single post-inference side effect.
#[async_trait]
pub trait PostInferenceHook: Send + Sync {
    fn kind(&self) -> HookKind;

    async fn run(&self, invocation: HookInvocation<'_>) -> Result<(), HookError>;
}

/// Sinks and clients the built-in hooks need.
#[derive(Clone)]
pub struct HookDeps {
    pub billing_queue: Arc<dyn BillingQueue>,
    pub event_storage: Arc<dyn EventStorage>,
    pub http: reqwest::Client,
    /// Upper bound on a single callback delivery.
    pub callback_timeout: Duration,
}

impl HookDeps {
    pub fn new(billing_queue: Arc<dyn BillingQueue>, event_storage: Arc<dyn EventStorage>) -> Self {
        Self {
            billing_queue,
            event_storage,
            http: reqwest::Client::new(),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
        }
    }
}

/// Which hooks ran and which failed during one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub succeeded: Vec<HookKind>,
    pub failed: Vec<HookKind>,
}

impl DispatchReport {
    pub const fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs the configured hooks for a completed request.
///
/// Read-only after construction and shared by all concurrent requests of a
/// worker. Callers invoke [`HookDispatcher::dispatch`] exactly once per
/// completed request.
pub struct HookDispatcher {
    hooks: Vec<Box<dyn PostInferenceHook>>,
}

impl fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookDispatcher")
            .field(
                "hooks",
                &self.hooks.iter().map(|h| h.kind()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl HookDispatcher {
    /// A dispatcher that runs nothing.
    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Build from explicit hooks, run in the given order.
    pub fn new(hooks: Vec<Box<dyn PostInferenceHook>>) -> Self {
        Self { hooks }
    }

    /// Build the hooks named in the endpoint configuration.
    ///
    /// Unknown hook names and hooks missing required settings are rejected
    /// here, before any request is served.
    pub fn from_config(config: &EndpointConfig, deps: &HookDeps) -> Result<Self, ConfigError> {
        let mut hooks: Vec<Box<dyn PostInferenceHook>> = Vec::new();
        for kind in config.hook_kinds()? {
            let hook: Box<dyn PostInferenceHook> = match kind {
                HookKind::Billing => {
                    let queue = config.billing_queue.clone().ok_or_else(|| {
                        ConfigError::Invalid("billing hook requires billing_queue".into())
                    })?;
                    Box::new(BillingHook::new(
                        config,
                        queue,
                        Arc::clone(&deps.billing_queue),
                    ))
                }
                HookKind::Callback => Box::new(CallbackHook::new(
                    deps.http.clone(),
                    config.default_callback_url.clone(),
                    config.default_callback_auth.clone(),
                    deps.callback_timeout,
                )),
                HookKind::Logging => {
                    Box::new(LoggingHook::new(config, Arc::clone(&deps.event_storage)))
                }
            };
            hooks.push(hook);
        }
        info!(
            endpoint = %config.endpoint_name,
            hooks = ?hooks.iter().map(|h| h.kind().as_str()).collect::<Vec<_>>(),
            "Post-inference hooks configured"
        );
        Ok(Self { hooks })
    }

    pub fn kinds(&self) -> Vec<HookKind> {
        self.hooks.iter().map(|h| h.kind()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every configured hook in order.
    ///
    /// Never fails: each hook error is logged and recorded in the report.
    pub async fn dispatch(&self, invocation: HookInvocation<'_>) -> DispatchReport {
        let mut report = DispatchReport::default();
        for hook in &self.hooks {
            let kind = hook.kind();
            let start = Instant::now();
            match hook.run(invocation).await {
                Ok(()) => {
                    debug!(
                        hook = %kind,
                        task_id = ?invocation.task_id,
                        elapsed_ms = start.elapsed().as_millis(),
                        "Post-inference hook completed"
                    );
                    report.succeeded.push(kind);
                }
                Err(e) => {
                    error!(
                        hook = %kind,
                        task_id = ?invocation.task_id,
                        error = %e,
                        "Post-inference hook failed"
                    );
                    report.failed.push(kind);
                }
            }
        }
        report
    }
}
