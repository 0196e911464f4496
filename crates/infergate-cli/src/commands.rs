//! Subcommand definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the forwarding server in front of the local engine
    Serve(ServeArgs),
    /// Run one batch completion job and exit
    Batch(BatchArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "INFERGATE_LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: String,

    /// Sync forwarder config (JSON)
    #[arg(long, env = "INFERGATE_FORWARDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Streaming forwarder config (JSON)
    #[arg(long, env = "INFERGATE_STREAM_CONFIG")]
    pub stream_config: Option<PathBuf>,

    /// Sync forwarder override, `key.path=value` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Streaming forwarder override, `key.path=value` (repeatable)
    #[arg(long = "stream-set", value_name = "KEY=VALUE")]
    pub stream_set: Vec<String>,

    /// Endpoint identity and hook configuration (JSON)
    #[arg(long, env = "ENDPOINT_CONFIG_PATH")]
    pub endpoint_config: Option<PathBuf>,

    /// File the logging hook appends inference events to
    #[arg(long, env = "INFERGATE_EVENT_LOG", default_value = "inference-events.jsonl")]
    pub event_log: PathBuf,

    /// Readiness marker file [default: $READYZ_PATH or /tmp/readyz]
    #[arg(long)]
    pub readyz_path: Option<PathBuf>,

    /// Initialize before reporting ready [default: $PREWARM]
    #[arg(long)]
    pub prewarm: bool,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// Batch job file (JSON)
    pub job: PathBuf,

    /// Job override, `key.path=value` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Base URL of the local engine
    #[arg(long, env = "INFERGATE_ENGINE_URL", default_value = "http://localhost:5005")]
    pub engine_url: String,

    /// Write `{progress, finished}` to this file after every item
    #[arg(long, env = "INFERGATE_PROGRESS_FILE")]
    pub progress_file: Option<PathBuf>,

    /// Disable the terminal progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}
