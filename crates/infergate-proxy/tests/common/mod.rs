//! Fake local engine and counting hooks shared by the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use tokio::sync::oneshot;

use infergate_core::{ForwarderConfig, HookInvocation, HookKind};
use infergate_hooks::{HookDispatcher, HookError, PostInferenceHook};

/// What the fake engine saw.
#[derive(Clone, Default)]
pub struct EngineLog {
    pub bodies: Arc<Mutex<Vec<Value>>>,
    /// Fires when a long-running stream body is dropped by the server.
    pub stream_dropped: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl EngineLog {
    pub fn calls(&self) -> usize {
        self.bodies.lock().unwrap().len()
    }

    pub fn last_body(&self) -> Value {
        self.bodies.lock().unwrap().last().cloned().unwrap()
    }
}

/// What the engine answers once its generation loop has died.
pub const DEAD_REPLY: (StatusCode, &str) = (
    StatusCode::INTERNAL_SERVER_ERROR,
    "AsyncEngineDeadError: Background loop has errored already.",
);

/// Reply chosen by the `mode` key of the forwarded body.
async fn predict(State(log): State<EngineLog>, Json(body): Json<Value>) -> Response {
    log.bodies.lock().unwrap().push(body.clone());
    match body.get("mode").and_then(Value::as_str) {
        Some("unprocessable") => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": "bad"}))).into_response()
        }
        Some("not_json") => (StatusCode::OK, "oops").into_response(),
        Some("dead") => DEAD_REPLY.into_response(),
        _ => Json(json!({"text": "ok"})).into_response(),
    }
}

fn sse(frames: Vec<&'static str>) -> Response {
    let body = stream::iter(frames).map(|f| Ok::<_, std::io::Error>(Bytes::from_static(f.as_bytes())));
    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(body))
        .unwrap()
}

/// Drops the sender when the server drops the response body.
struct DropSignal(Option<oneshot::Sender<()>>);

impl Drop for DropSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

async fn stream_route(State(log): State<EngineLog>, Json(body): Json<Value>) -> Response {
    log.bodies.lock().unwrap().push(body.clone());
    match body.get("mode").and_then(Value::as_str) {
        Some("refuse") => (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response(),
        Some("dead") => DEAD_REPLY.into_response(),
        Some("broken") => sse(vec!["data: {\"token\": 1}\n\n", "data: not json\n\n", "data: {\"token\": 3}\n\n"]),
        Some("endless") => {
            let signal = DropSignal(log.stream_dropped.lock().unwrap().take());
            let first = stream::once(async { Bytes::from_static(b"data: {\"token\": 0}\n\n") });
            let pings = stream::unfold((), |()| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Some((Bytes::from_static(b": ping\n\n"), ()))
            });
            let body = first.chain(pings).map(move |b| {
                let _held = &signal;
                Ok::<_, std::io::Error>(b)
            });
            Response::builder()
                .header("content-type", "text/event-stream")
                .body(Body::from_stream(body))
                .unwrap()
        }
        _ => sse(vec![
            ": comment\n\n",
            "data:{\"token\": 1}\n\n",
            "data: {\"token\": 2}\n\n",
            "data: {\"token\": 3, \"finished\": true}\n\n",
        ]),
    }
}

/// Start the fake engine on an ephemeral port.
pub async fn spawn_engine(log: EngineLog) -> SocketAddr {
    let app = Router::new()
        .route("/readyz", get(|| async { StatusCode::OK }))
        .route("/predict", post(predict))
        .route("/stream", post(stream_route))
        .with_state(log);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn sync_config(addr: SocketAddr) -> ForwarderConfig {
    ForwarderConfig {
        user_port: addr.port(),
        ..ForwarderConfig::default()
    }
}

pub fn stream_config(addr: SocketAddr) -> ForwarderConfig {
    ForwarderConfig {
        user_port: addr.port(),
        predict_route: "/stream".into(),
        ..ForwarderConfig::streaming()
    }
}

/// Hook that counts invocations and remembers the last result.
pub struct CountingHook {
    pub count: Arc<AtomicUsize>,
    pub last: Arc<Mutex<Option<(Value, Option<String>)>>>,
}

#[async_trait]
impl PostInferenceHook for CountingHook {
    fn kind(&self) -> HookKind {
        HookKind::Logging
    }

    async fn run(&self, invocation: HookInvocation<'_>) -> Result<(), HookError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some((
            invocation.result.clone(),
            invocation.task_id.map(str::to_string),
        ));
        Ok(())
    }
}

pub struct Counted {
    pub dispatcher: Arc<HookDispatcher>,
    pub count: Arc<AtomicUsize>,
    pub last: Arc<Mutex<Option<(Value, Option<String>)>>>,
}

impl Counted {
    pub fn calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

pub fn counting_dispatcher() -> Counted {
    let count = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(None));
    let dispatcher = HookDispatcher::new(vec![Box::new(CountingHook {
        count: Arc::clone(&count),
        last: Arc::clone(&last),
    })]);
    Counted {
        dispatcher: Arc::new(dispatcher),
        count,
        last,
    }
}
