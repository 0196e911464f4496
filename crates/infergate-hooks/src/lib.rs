//! Post-inference hooks.
//!
//! The [`HookDispatcher`] runs the hooks an endpoint enables, in order,
//! after a request has completed. Hooks are a side channel: every failure
//! is logged and swallowed, and one failing hook never stops the others.

#![deny(unsafe_code)]

mod billing;
mod callback;
mod dispatcher;
mod error;
mod logging;

pub use billing::{BillingHook, TracingBillingQueue};
pub use callback::{CallbackHook, DEFAULT_CALLBACK_TIMEOUT};
pub use dispatcher::{DispatchReport, HookDeps, HookDispatcher, PostInferenceHook};
pub use error::HookError;
pub use logging::{JsonlEventStorage, LoggingHook};
