//! infergate command-line adapter.
//!
//! `serve` runs the forwarding server; `batch` runs one batch job against
//! the local engine and exits.

#![deny(unsafe_code)]

// Used by the main.rs binary
use anyhow as _;
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod progress;

pub use commands::{BatchArgs, Commands, ServeArgs};
pub use error::CliError;
pub use parser::Cli;
