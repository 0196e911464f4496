//! Forwarding layer between callers and the local inference engine.
//!
//! [`Forwarder`] relays one request and runs post-inference hooks on the
//! result. [`StreamingForwarder`] relays the engine's event stream chunk by
//! chunk. [`HttpEngineClient`] implements the engine port over the engine's
//! HTTP routes for the batch orchestrator. [`serve`] puts both forwarders
//! behind an Axum router, fetched per request from a [`ForwarderSource`].
#![deny(unsafe_code)]

pub mod engine_http;
pub mod error;
pub mod forward;
pub mod models;
pub mod readiness;
pub mod server;
pub mod sse;
pub mod stream;

pub use engine_http::HttpEngineClient;
pub use error::ForwardError;
pub use forward::{ForwardOutcome, Forwarder};
pub use readiness::{READINESS_POLL_INTERVAL, check_engine_ready, wait_for_engine_ready};
pub use server::{AppState, ForwarderSource, Forwarders, TASK_ID_HEADER, router, serve};
pub use sse::{SseError, decode_events};
pub use stream::{ChunkStream, StreamingForwarder};
