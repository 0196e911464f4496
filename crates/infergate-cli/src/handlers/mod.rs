//! Command handlers.

pub mod batch;
pub mod serve;
