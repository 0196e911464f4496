//! `infergate serve`.

use std::sync::Arc;

use infergate_proxy::{AppState, serve};
use infergate_runtime::{FatalHandler, PrewarmMode, ReadinessMarker, WorkerGuard};
use reqwest::Client;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bootstrap::{ServeInitializer, ServeWorker, load_forwarder_config};
use crate::commands::ServeArgs;
use crate::error::CliError;

/// Build the worker for `args`. Nothing is initialized yet.
pub fn worker(args: &ServeArgs, fatal: FatalHandler) -> Result<ServeWorker, CliError> {
    let sync = load_forwarder_config(args.config.as_deref(), &args.set, false)?;
    let streaming = load_forwarder_config(args.stream_config.as_deref(), &args.stream_set, true)?;
    let marker = args
        .readyz_path
        .clone()
        .map_or_else(ReadinessMarker::from_env, ReadinessMarker::new);

    let guard = WorkerGuard::new(
        ServeInitializer {
            http: Client::new(),
            sync,
            streaming,
            endpoint_config: args.endpoint_config.clone(),
            event_log: args.event_log.clone(),
        },
        marker,
    );
    Ok(ServeWorker::new(guard, fatal))
}

pub async fn execute(args: ServeArgs, fatal: FatalHandler) -> Result<(), CliError> {
    let mode = if args.prewarm {
        PrewarmMode::Eager
    } else {
        PrewarmMode::from_env()?
    };
    let worker = Arc::new(worker(&args, fatal)?);
    // Eager initializes here; lazy leaves it to the first request.
    worker.guard().start(mode).await?;

    let listener = TcpListener::bind(&args.listen)
        .await
        .map_err(|e| CliError::Server(format!("failed to bind {}: {e}", args.listen)))?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
        }
        shutdown.cancel();
    });

    let ready = worker.guard().marker().subscribe();
    let state = AppState::new(worker, ready);
    serve(listener, state, cancel)
        .await
        .map_err(|e| CliError::Server(e.to_string()))
}
