//! Batch jobs end to end against an in-process fake engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use mockall::mock;
use mockall::predicate::eq;
use serde_json::{Value, json};

use infergate_batch::{
    BatchError, BatchJobConfig, BatchOrchestrator, FlatBatch, NoopProgressSink,
    TracingMetricsGateway, run_job,
};
use infergate_core::{
    BatchCompletionsMetric, BatchItem, EngineClient, EngineError, EngineOutput, EngineStream,
    GenerateRequest, MetricsGateway, ProgressSink, SinkError, TokenOutput,
};

mock! {
    Sink {}

    #[async_trait]
    impl ProgressSink for Sink {
        async fn report(&self, completed: usize, total: usize) -> Result<(), SinkError>;
        async fn finish(&self, total: usize) -> Result<(), SinkError>;
    }
}

mock! {
    Metrics {}

    impl MetricsGateway for Metrics {
        fn emit_batch_completions(&self, metric: &BatchCompletionsMetric);
    }
}

/// Prompts steer the fake: `name:delay_ms` finishes after the delay,
/// `fail` is rejected, `hang` never finishes, `unfinished` ends early,
/// `ranked` returns two candidates in one step and `dead` reports a dead
/// engine.
#[derive(Debug, Default)]
struct FakeEngine {
    calls: AtomicUsize,
    inflight: AtomicUsize,
    peak: AtomicUsize,
    aborted: Mutex<Vec<String>>,
}

fn step(text: &str, out: u32, token: &str, finished: bool) -> EngineOutput {
    EngineOutput {
        text: text.into(),
        num_prompt_tokens: 3,
        num_completion_tokens: out,
        logprobs: Some(vec![TokenOutput {
            token: token.into(),
            log_prob: -0.5,
        }]),
        finished,
    }
}

fn parse_delay(prompt: &str) -> (String, Duration) {
    let (name, ms) = prompt.split_once(':').unwrap_or((prompt, "0"));
    (name.to_string(), Duration::from_millis(ms.parse().unwrap_or(0)))
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn check_health(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn generate(&self, request: GenerateRequest) -> Result<EngineStream, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match request.prompt.as_str() {
            "fail" => {
                return Err(EngineError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            "dead" => return Err(EngineError::Dead("out of memory".into())),
            "hang" => return Ok(stream::pending().boxed()),
            "unfinished" => {
                return Ok(stream::iter(vec![Ok(step("u", 1, "u", false))]).boxed());
            }
            "ranked" => {
                let mut output = step("r", 1, "sampled", true);
                output.logprobs = Some(vec![
                    TokenOutput {
                        token: "sampled".into(),
                        log_prob: -0.1,
                    },
                    TokenOutput {
                        token: "alt".into(),
                        log_prob: -2.0,
                    },
                ]);
                return Ok(stream::iter(vec![Ok(output)]).boxed());
            }
            _ => {}
        }
        let (name, delay) = parse_delay(&request.prompt);
        let outputs = vec![
            step(&name, 1, "x", false),
            step(&format!("{name}!"), 2, "y", true),
        ];
        Ok(stream::once(tokio::time::sleep(delay))
            .flat_map(move |()| stream::iter(outputs.clone()).map(Ok))
            .boxed())
    }

    async fn abort(&self, request_id: &str) -> Result<(), EngineError> {
        self.aborted.lock().unwrap().push(request_id.to_string());
        Ok(())
    }

    async fn complete(&self, item: &BatchItem, model: &str) -> Result<Value, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let prompt = item.body()["prompt"].as_str().unwrap_or("chat").to_string();
        let (name, delay) = parse_delay(&prompt);
        tokio::time::sleep(delay).await;
        self.inflight.fetch_sub(1, Ordering::SeqCst);

        if name == "fail" {
            return Err(EngineError::Status {
                status: 400,
                body: "bad".into(),
            });
        }
        Ok(json!({"echo": name, "model": model}))
    }
}

fn job(dir: &tempfile::TempDir, content: Value) -> BatchJobConfig {
    BatchJobConfig::from_value(json!({
        "output_data_path": dir.path().join("out.json"),
        "model_cfg": {"model": "llama"},
        "content": content,
    }))
    .unwrap()
}

fn flat(prompts: &[&str], log_probs: bool) -> Value {
    json!({
        "prompts": prompts,
        "max_new_tokens": 8,
        "temperature": 0.0,
        "return_token_log_probs": log_probs,
    })
}

async fn read_output(config: &BatchJobConfig) -> Value {
    let text = tokio::fs::read_to_string(&config.output_data_path)
        .await
        .unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn output_follows_submission_order_not_completion_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = job(&dir, flat(&["a:80", "b:0", "c:40"], false));
    let engine = Arc::new(FakeEngine::default());

    let mut sink = MockSink::new();
    sink.expect_report()
        .withf(|_, total| *total == 3)
        .times(3)
        .returning(|_, _| Ok(()));
    sink.expect_finish()
        .with(eq(3))
        .times(1)
        .returning(|_| Ok(()));
    let mut metrics = MockMetrics::new();
    metrics
        .expect_emit_batch_completions()
        .with(eq(BatchCompletionsMetric {
            model: "llama".into(),
            use_tool: false,
            num_prompt_tokens: 9,
            num_completion_tokens: 6,
            is_finetuned: false,
        }))
        .times(1)
        .return_const(());

    let report = run_job(&config, engine, Arc::new(sink), &metrics, "./w")
        .await
        .unwrap();
    assert_eq!(report.schema, "v1");
    assert_eq!((report.total, report.succeeded, report.failed), (3, 3, 0));
    assert!(!report.timed_out);

    let output = read_output(&config).await;
    let texts: Vec<_> = output
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(texts, ["a!", "b!", "c!"]);
    assert_eq!(output[0]["num_prompt_tokens"], 3);
    assert_eq!(output[0]["num_completion_tokens"], 2);
    assert!(output[0].get("tokens").is_none());
}

#[tokio::test]
async fn failed_items_become_nulls_without_aborting_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = job(&dir, flat(&["a:0", "fail", "c:0", "unfinished"], false));

    let report = run_job(
        &config,
        Arc::new(FakeEngine::default()),
        Arc::new(NoopProgressSink),
        &TracingMetricsGateway,
        "./w",
    )
    .await
    .unwrap();

    assert_eq!((report.succeeded, report.failed), (2, 2));
    let output = read_output(&config).await;
    assert_eq!(output[0]["text"], "a!");
    assert!(output[1].is_null());
    assert_eq!(output[2]["text"], "c!");
    assert!(output[3].is_null());
}

#[tokio::test]
async fn token_detail_only_when_requested() {
    let dir = tempfile::tempdir().unwrap();
    let config = job(&dir, flat(&["a:0"], true));
    run_job(
        &config,
        Arc::new(FakeEngine::default()),
        Arc::new(NoopProgressSink),
        &TracingMetricsGateway,
        "./w",
    )
    .await
    .unwrap();

    let output = read_output(&config).await;
    assert_eq!(
        output[0]["tokens"],
        json!([
            {"token": "x", "log_prob": -0.5},
            {"token": "y", "log_prob": -0.5}
        ])
    );
}

#[tokio::test]
async fn every_candidate_of_a_step_is_kept_in_engine_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = job(&dir, flat(&["ranked"], true));
    run_job(
        &config,
        Arc::new(FakeEngine::default()),
        Arc::new(NoopProgressSink),
        &TracingMetricsGateway,
        "./w",
    )
    .await
    .unwrap();

    let output = read_output(&config).await;
    assert_eq!(
        output[0]["tokens"],
        json!([
            {"token": "sampled", "log_prob": -0.1},
            {"token": "alt", "log_prob": -2.0}
        ])
    );
}

#[tokio::test]
async fn mixed_shapes_are_rejected_before_any_engine_call() {
    let dir = tempfile::tempdir().unwrap();
    let config = job(
        &dir,
        json!([
            {"prompt": "a"},
            {"messages": [{"role": "user", "content": "b"}]}
        ]),
    );
    let engine = Arc::new(FakeEngine::default());
    let mut metrics = MockMetrics::new();
    metrics.expect_emit_batch_completions().never();

    let err = run_job(&config, engine.clone(), Arc::new(NoopProgressSink), &metrics, "./w")
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::MixedShapes { index: 1, .. }));
    assert!(err.is_config_error());
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert!(!config.output_data_path.exists());
}

#[tokio::test]
async fn deadline_leaves_nulls_and_aborts_unfinished_generations() {
    let engine = Arc::new(FakeEngine::default());
    let orchestrator = BatchOrchestrator::new(
        engine.clone(),
        Arc::new(NoopProgressSink),
        Duration::from_millis(200),
    );
    let batch: FlatBatch = serde_json::from_value(flat(&["a:0", "hang", "c:0"], false)).unwrap();

    let outcome = orchestrator.run_flat(&batch).await.unwrap();

    assert!(outcome.timed_out);
    assert!(outcome.results[0].is_some());
    assert!(outcome.results[1].is_none());
    assert!(outcome.results[2].is_some());
    assert_eq!(engine.aborted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn deadline_still_writes_the_document() {
    let dir = tempfile::tempdir().unwrap();
    let mut value = serde_json::to_value(job(&dir, flat(&["a:0", "hang"], false))).unwrap();
    value["max_runtime_sec"] = json!(1);
    let config = BatchJobConfig::from_value(value).unwrap();

    let report = run_job(
        &config,
        Arc::new(FakeEngine::default()),
        Arc::new(NoopProgressSink),
        &TracingMetricsGateway,
        "./w",
    )
    .await
    .unwrap();

    assert!(report.timed_out);
    let output = read_output(&config).await;
    assert_eq!(output[0]["text"], "a!");
    assert!(output[1].is_null());
}

#[tokio::test]
async fn dead_engine_abandons_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = job(&dir, flat(&["a:50", "dead"], false));
    let mut metrics = MockMetrics::new();
    metrics.expect_emit_batch_completions().never();

    let err = run_job(
        &config,
        Arc::new(FakeEngine::default()),
        Arc::new(NoopProgressSink),
        &metrics,
        "./w",
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BatchError::EngineDead(EngineError::Dead(_))));
    assert!(!config.output_data_path.exists());
}

#[tokio::test]
async fn per_request_items_use_the_served_model_name() {
    let dir = tempfile::tempdir().unwrap();
    let mut value = serde_json::to_value(job(
        &dir,
        json!([{"prompt": "a:20", "model": "mine"}, {"prompt": "fail"}, {"prompt": "c:0"}]),
    ))
    .unwrap();
    value["model_cfg"]["checkpoint_path"] = json!("/ckpt");
    let config = BatchJobConfig::from_value(value).unwrap();
    let mut metrics = MockMetrics::new();
    metrics
        .expect_emit_batch_completions()
        .withf(|metric| metric.model == "./weights" && metric.is_finetuned)
        .times(1)
        .return_const(());

    let report = run_job(
        &config,
        Arc::new(FakeEngine::default()),
        Arc::new(NoopProgressSink),
        &metrics,
        "./weights",
    )
    .await
    .unwrap();

    assert_eq!(report.schema, "v2");
    assert_eq!(
        read_output(&config).await,
        json!([
            {"echo": "a", "model": "./weights"},
            null,
            {"echo": "c", "model": "./weights"}
        ])
    );
}

#[tokio::test]
async fn max_parallel_caps_inflight_items() {
    let items: Vec<BatchItem> = (0..4)
        .map(|_| BatchItem::from_value(json!({"prompt": "p:20"})).unwrap())
        .collect();

    let engine = Arc::new(FakeEngine::default());
    let orchestrator = BatchOrchestrator::new(
        engine.clone(),
        Arc::new(NoopProgressSink),
        Duration::from_secs(5),
    )
    .with_max_parallel(Some(1));
    let outcome = orchestrator.run_per_request(&items, "m").await.unwrap();
    assert_eq!(outcome.succeeded(), 4);
    assert_eq!(engine.peak.load(Ordering::SeqCst), 1);

    let engine = Arc::new(FakeEngine::default());
    let orchestrator = BatchOrchestrator::new(
        engine.clone(),
        Arc::new(NoopProgressSink),
        Duration::from_secs(5),
    );
    orchestrator.run_per_request(&items, "m").await.unwrap();
    assert!(engine.peak.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn progress_failures_do_not_fail_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let config = job(&dir, flat(&["a:0", "b:0"], false));

    let mut sink = MockSink::new();
    sink.expect_report()
        .returning(|_, _| Err(SinkError::Unavailable("down".into())));
    sink.expect_finish()
        .returning(|_| Err(SinkError::Unavailable("down".into())));

    let report = run_job(&config, Arc::new(FakeEngine::default()), Arc::new(sink), &TracingMetricsGateway, "./w")
        .await
        .unwrap();
    assert_eq!(report.succeeded, 2);
}

#[tokio::test]
async fn empty_batch_writes_an_empty_document() {
    let dir = tempfile::tempdir().unwrap();
    let config = job(&dir, flat(&[], false));
    let report = run_job(
        &config,
        Arc::new(FakeEngine::default()),
        Arc::new(NoopProgressSink),
        &TracingMetricsGateway,
        "./w",
    )
    .await
    .unwrap();
    assert_eq!(report.total, 0);
    assert_eq!(read_output(&config).await, json!([]));
}
