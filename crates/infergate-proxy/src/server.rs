//! Axum HTTP server in front of the forwarders.
//!
//! Routes:
//! - `POST /predict`: sync forward, hooks run before the response
//! - `POST /stream`: SSE relay of wrapped engine chunks
//! - `GET /readyz`: 503 until the readiness flag is set, 200 after
//! - `GET /healthz`: liveness
//!
//! The forwarding routes fetch their forwarders from a [`ForwarderSource`]
//! on every request, so the first request may pay for worker
//! initialization.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ForwardError;
use crate::forward::{ForwardOutcome, Forwarder};
use crate::models::{ErrorResponse, ForwardQuery};
use crate::stream::{ChunkStream, StreamingForwarder};

/// Header carrying the caller's correlation id, passed to hooks.
pub const TASK_ID_HEADER: &str = "x-request-id";

/// Loaded forwarders, shared by every request.
#[derive(Debug, Clone)]
pub struct Forwarders {
    pub sync: Arc<Forwarder>,
    pub streaming: Arc<StreamingForwarder>,
}

/// Hands the forwarding routes their forwarders.
#[async_trait]
pub trait ForwarderSource: Send + Sync {
    /// Forwarders for one request, building them on first use if needed.
    async fn forwarders(&self) -> Result<Forwarders, ForwardError>;

    /// Called with every error that reports a dead engine.
    fn engine_dead(&self, err: &ForwardError) {
        error!("Engine is dead: {err}");
    }
}

#[async_trait]
impl ForwarderSource for Forwarders {
    async fn forwarders(&self) -> Result<Forwarders, ForwardError> {
        Ok(self.clone())
    }
}

/// Shared application state for the server.
#[derive(Clone)]
pub struct AppState {
    source: Arc<dyn ForwarderSource>,
    /// Flips to `true` once the worker is ready to accept requests.
    ready: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(source: Arc<dyn ForwarderSource>, ready: watch::Receiver<bool>) -> Self {
        Self { source, ready }
    }

    fn fail(&self, err: &ForwardError) -> Response {
        if err.is_engine_dead() {
            self.source.engine_dead(err);
        }
        error_response(err)
    }
}

/// Build the router without binding it.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness))
        .route("/predict", post(predict))
        .route("/stream", post(stream))
        .with_state(state)
}

/// Run the server on a pre-bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!("Forwarding server listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Forwarding server shut down");
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn readiness(State(state): State<AppState>) -> Response {
    if *state.ready.borrow() {
        (StatusCode::OK, "READY").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY").into_response()
    }
}

fn task_id(headers: &HeaderMap) -> String {
    headers
        .get(TASK_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string)
}

/// Parse the request body and fetch the forwarders.
async fn prepare(state: &AppState, body: &[u8]) -> Result<(Value, Forwarders), ForwardError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|e| ForwardError::MalformedBody(e.to_string()))?;
    let forwarders = state.source.forwarders().await?;
    Ok((payload, forwarders))
}

async fn predict(
    State(state): State<AppState>,
    Query(query): Query<ForwardQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let task_id = task_id(&headers);
    debug!(task_id = %task_id, "POST /predict");

    let (payload, forwarders) = match prepare(&state, &body).await {
        Ok(prepared) => prepared,
        Err(e) => return state.fail(&e),
    };
    match forwarders
        .sync
        .forward(&payload, query.serialize_results_as_string, Some(&task_id))
        .await
    {
        Ok(ForwardOutcome::Bare(body)) => Json(body).into_response(),
        Ok(ForwardOutcome::WithStatus { status, body }) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(body)).into_response()
        }
        Err(e) => state.fail(&e),
    }
}

async fn stream(
    State(state): State<AppState>,
    Query(query): Query<ForwardQuery>,
    body: Bytes,
) -> Response {
    debug!("POST /stream");
    let (payload, forwarders) = match prepare(&state, &body).await {
        Ok(prepared) => prepared,
        Err(e) => return state.fail(&e),
    };
    match forwarders
        .streaming
        .forward(&payload, query.serialize_results_as_string)
        .await
    {
        Ok(chunks) => sse_response(chunks),
        Err(e) => state.fail(&e),
    }
}

/// Relay chunks as SSE. A failure mid-stream becomes a final `error` event.
fn sse_response(chunks: ChunkStream) -> Response {
    let body = chunks.map(|item| {
        let frame = match item {
            Ok(chunk) => format!("data: {chunk}\n\n"),
            Err(e) => {
                error!("Stream terminated: {e}");
                let detail = serde_json::to_string(&ErrorResponse::from(&e))
                    .unwrap_or_else(|_| "{}".to_string());
                format!("event: error\ndata: {detail}\n\n")
            }
        };
        Ok::<_, std::io::Error>(Bytes::from(frame))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn error_response(err: &ForwardError) -> Response {
    if err.is_client_error() {
        debug!("Rejected request: {err}");
    } else {
        error!("Forwarding failed: {err}");
    }
    let status =
        StatusCode::from_u16(err.suggested_status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(ErrorResponse::from(err))).into_response()
}
