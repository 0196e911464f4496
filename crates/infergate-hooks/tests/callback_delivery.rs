//! Callback hook delivery against a real local HTTP receiver.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};

use infergate_core::{
    CallbackAuth, EndpointConfig, HookInvocation, HookKind, InferenceRequest,
};
use infergate_hooks::{HookDeps, HookDispatcher, JsonlEventStorage, TracingBillingQueue};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<(Option<String>, Value)>>>);

async fn receive(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    captured.0.lock().unwrap().push((auth, body));
    StatusCode::OK
}

async fn slow(Json(_body): Json<Value>) -> StatusCode {
    tokio::time::sleep(Duration::from_secs(5)).await;
    StatusCode::OK
}

async fn spawn_receiver(captured: Captured) -> SocketAddr {
    let app = Router::new()
        .route("/cb", post(receive))
        .route("/other", post(receive))
        .route("/slow", post(slow))
        .route("/fail", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .with_state(captured);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn deps(dir: &tempfile::TempDir) -> HookDeps {
    let mut deps = HookDeps::new(
        Arc::new(TracingBillingQueue),
        Arc::new(JsonlEventStorage::new(dir.path().join("events.jsonl"))),
    );
    deps.callback_timeout = Duration::from_millis(200);
    deps
}

fn endpoint(default_url: Option<String>, auth: Option<CallbackAuth>) -> EndpointConfig {
    EndpointConfig {
        endpoint_name: "llm".into(),
        bundle_name: "bundle".into(),
        user_id: "u1".into(),
        post_inference_hooks: vec!["callback".into()],
        default_callback_url: default_url,
        default_callback_auth: auth,
        ..EndpointConfig::default()
    }
}

#[tokio::test]
async fn delivers_to_default_url_with_bearer_auth() {
    let captured = Captured::default();
    let addr = spawn_receiver(captured.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let config = endpoint(
        Some(format!("http://{addr}/cb")),
        Some(CallbackAuth::Bearer {
            token: "secret".into(),
        }),
    );
    let dispatcher = HookDispatcher::from_config(&config, &deps(&dir)).unwrap();

    let request = InferenceRequest::parse(&json!({"prompt": "hi"})).unwrap();
    let result = json!({"result": "{\"text\": \"ok\"}"});
    let report = dispatcher
        .dispatch(HookInvocation::new(&request, &result, Some("task-1")))
        .await;

    assert!(report.all_succeeded());
    let calls = captured.0.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.as_deref(), Some("Bearer secret"));
    assert_eq!(
        calls[0].1,
        json!({"result": "{\"text\": \"ok\"}", "task_id": "task-1"})
    );
}

#[tokio::test]
async fn per_request_url_and_auth_override_defaults() {
    let captured = Captured::default();
    let addr = spawn_receiver(captured.clone()).await;
    let dir = tempfile::tempdir().unwrap();

    let config = endpoint(
        Some(format!("http://{addr}/cb")),
        Some(CallbackAuth::Bearer {
            token: "secret".into(),
        }),
    );
    let dispatcher = HookDispatcher::from_config(&config, &deps(&dir)).unwrap();

    let request = InferenceRequest::parse(&json!({
        "args": {"prompt": "hi"},
        "callback_url": format!("http://{addr}/other"),
        "callback_auth": {"kind": "basic", "username": "user", "password": "pass"}
    }))
    .unwrap();
    let result = json!({"result": 1});
    dispatcher
        .dispatch(HookInvocation::new(&request, &result, None))
        .await;

    let calls = captured.0.lock().unwrap().clone();
    assert_eq!(calls.len(), 1);
    // base64("user:pass")
    assert_eq!(calls[0].0.as_deref(), Some("Basic dXNlcjpwYXNz"));
    assert_eq!(calls[0].1, json!({"result": 1}));
}

#[tokio::test]
async fn slow_receiver_times_out_and_is_swallowed() {
    let addr = spawn_receiver(Captured::default()).await;
    let dir = tempfile::tempdir().unwrap();

    let mut config = endpoint(Some(format!("http://{addr}/slow")), None);
    config.post_inference_hooks.push("logging".into());
    let deps = deps(&dir);
    let dispatcher = HookDispatcher::from_config(&config, &deps).unwrap();

    let request = InferenceRequest::parse(&json!({"prompt": "hi"})).unwrap();
    let result = json!({"result": "x"});
    let started = std::time::Instant::now();
    let report = dispatcher
        .dispatch(HookInvocation::new(&request, &result, Some("t")))
        .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(report.failed, vec![HookKind::Callback]);
    assert_eq!(report.succeeded, vec![HookKind::Logging]);
}

#[tokio::test]
async fn error_status_and_refused_connection_are_contained() {
    let addr = spawn_receiver(Captured::default()).await;
    let dir = tempfile::tempdir().unwrap();

    for url in [
        format!("http://{addr}/fail"),
        "http://127.0.0.1:9/unreachable".to_string(),
    ] {
        let dispatcher =
            HookDispatcher::from_config(&endpoint(Some(url), None), &deps(&dir)).unwrap();
        let request = InferenceRequest::parse(&json!({})).unwrap();
        let result = json!({});
        let report = dispatcher
            .dispatch(HookInvocation::new(&request, &result, None))
            .await;
        assert_eq!(report.failed, vec![HookKind::Callback]);
    }
}

#[tokio::test]
async fn missing_callback_url_skips_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let dispatcher = HookDispatcher::from_config(&endpoint(None, None), &deps(&dir)).unwrap();
    let request = InferenceRequest::parse(&json!({})).unwrap();
    let result = json!({});
    let report = dispatcher
        .dispatch(HookInvocation::new(&request, &result, None))
        .await;
    assert_eq!(report.succeeded, vec![HookKind::Callback]);
}

#[test]
fn billing_without_queue_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = EndpointConfig {
        post_inference_hooks: vec!["billing".into()],
        ..EndpointConfig::default()
    };
    assert!(HookDispatcher::from_config(&config, &deps(&dir)).is_err());
}
