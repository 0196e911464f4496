//! Domain types shared by every forwarding path.
//!
//! These are pure value types: no I/O, no runtime handles.

mod batch;
mod hook;
mod request;

pub use batch::{
    BatchItem, BatchItemKind, BatchSlot, CompletionOutput, SlotError, SlotTable, TokenOutput,
};
pub use hook::{HookInvocation, HookKind};
pub use request::{CallbackAuth, InferenceRequest, RequestError};
