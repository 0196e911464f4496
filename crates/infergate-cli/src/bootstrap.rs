//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where concrete adapters are wired
//! together:
//! - Forwarder configs (file + overrides + env) and the HTTP forwarders
//! - Hook dispatcher with the tracing billing queue and JSONL event log
//! - HTTP engine client for batch jobs
//!
//! Handlers receive fully composed contexts through a `WorkerGuard`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use infergate_core::{
    ConfigError, EndpointConfig, EngineClient, EngineError, ForwarderConfig, apply_overrides,
};
use infergate_hooks::{HookDeps, HookDispatcher, JsonlEventStorage, TracingBillingQueue};
use infergate_proxy::{
    ForwardError, Forwarder, ForwarderSource, Forwarders, HttpEngineClient,
    READINESS_POLL_INTERVAL, StreamingForwarder, wait_for_engine_ready,
};
use infergate_runtime::{
    FatalHandler, Initializer, NamedContext, WorkerContext, WorkerError, WorkerGuard,
};
use reqwest::Client;
use serde_json::Value;
use tracing::{error, info};

/// Read a JSON config file into a value.
fn read_json(path: &Path) -> Result<Value, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&raw)?)
}

/// Resolve a forwarder config: defaults, then the file, then overrides.
///
/// The environment override is applied later, when the forwarder loads.
pub fn load_forwarder_config(
    path: Option<&Path>,
    overrides: &[String],
    streaming: bool,
) -> Result<ForwarderConfig, ConfigError> {
    let defaults = if streaming {
        ForwarderConfig::streaming()
    } else {
        ForwarderConfig::default()
    };
    let mut value = serde_json::to_value(defaults)?;
    if let Some(path) = path {
        let Value::Object(file) = read_json(path)? else {
            return Err(ConfigError::Invalid(format!(
                "{} must contain a JSON object",
                path.display()
            )));
        };
        if let Value::Object(base) = &mut value {
            base.extend(file);
        }
    }
    apply_overrides(&mut value, overrides)?;
    let config: ForwarderConfig = serde_json::from_value(value)?;
    config.validate()?;
    Ok(config)
}

/// Read a batch job file and apply overrides.
pub fn load_batch_job(
    path: &Path,
    overrides: &[String],
) -> Result<infergate_batch::BatchJobConfig, ConfigError> {
    let mut value = read_json(path)?;
    apply_overrides(&mut value, overrides)?;
    infergate_batch::BatchJobConfig::from_value(value)
}

/// Endpoint config from `path`, or an anonymous endpoint with no hooks.
pub fn load_endpoint_config(path: Option<&Path>) -> Result<EndpointConfig, ConfigError> {
    path.map_or_else(|| Ok(EndpointConfig::default()), EndpointConfig::load)
}

/// Context for the forwarding server.
#[derive(Debug)]
pub struct ServeContext {
    pub endpoint_name: String,
    pub forwarders: Forwarders,
}

impl NamedContext for ServeContext {
    fn endpoint_name(&self) -> &str {
        &self.endpoint_name
    }
}

/// Builds hooks and forwarders, waiting for the engine to come up.
#[derive(Debug, Clone)]
pub struct ServeInitializer {
    pub http: Client,
    pub sync: ForwarderConfig,
    pub streaming: ForwarderConfig,
    pub endpoint_config: Option<PathBuf>,
    pub event_log: PathBuf,
}

#[async_trait]
impl Initializer for ServeInitializer {
    type Context = ServeContext;

    async fn initialize(&self) -> Result<ServeContext, WorkerError> {
        let endpoint = load_endpoint_config(self.endpoint_config.as_deref())?;
        let mut deps = HookDeps::new(
            Arc::new(TracingBillingQueue),
            Arc::new(JsonlEventStorage::new(&self.event_log)),
        );
        deps.http = self.http.clone();
        let hooks = Arc::new(HookDispatcher::from_config(&endpoint, &deps)?);
        info!(hooks = ?hooks.kinds(), endpoint = %endpoint.endpoint_name, "Hooks configured");

        let forwarder = Forwarder::load(self.http.clone(), self.sync.clone(), hooks).await?;
        let streaming = StreamingForwarder::load(self.http.clone(), self.streaming.clone()).await?;

        Ok(ServeContext {
            endpoint_name: endpoint.endpoint_name,
            forwarders: Forwarders {
                sync: Arc::new(forwarder),
                streaming: Arc::new(streaming),
            },
        })
    }
}

/// The server's view of the worker: forwarders come from the guard, so the
/// first request initializes a lazily started worker. Initialization
/// failures and dead engines terminate the process.
#[derive(Debug)]
pub struct ServeWorker {
    guard: WorkerGuard<ServeInitializer>,
    fatal: FatalHandler,
}

impl ServeWorker {
    pub const fn new(guard: WorkerGuard<ServeInitializer>, fatal: FatalHandler) -> Self {
        Self { guard, fatal }
    }

    pub const fn guard(&self) -> &WorkerGuard<ServeInitializer> {
        &self.guard
    }
}

#[async_trait]
impl ForwarderSource for ServeWorker {
    async fn forwarders(&self) -> Result<Forwarders, ForwardError> {
        match self.guard.ensure_initialized().await {
            Ok(context) => Ok(context.forwarders.clone()),
            Err(e) => {
                error!(error = %e, "Worker initialization failed");
                self.fatal.terminate(e.exit_code(), &e.to_string());
                Err(ForwardError::Unavailable(e.to_string()))
            }
        }
    }

    fn engine_dead(&self, err: &ForwardError) {
        self.fatal.check(&EngineError::Dead(err.to_string()));
    }
}

/// Builds the engine client for a batch job once the engine is healthy.
#[derive(Debug, Clone)]
pub struct BatchInitializer {
    pub http: Client,
    pub engine_url: String,
    pub endpoint_config: Option<PathBuf>,
}

#[async_trait]
impl Initializer for BatchInitializer {
    type Context = WorkerContext;

    async fn initialize(&self) -> Result<WorkerContext, WorkerError> {
        let endpoint = load_endpoint_config(self.endpoint_config.as_deref())?;
        let engine = HttpEngineClient::new(self.http.clone(), self.engine_url.clone());
        wait_for_engine_ready(
            &self.http,
            &format!("{}/health", self.engine_url.trim_end_matches('/')),
            READINESS_POLL_INTERVAL,
        )
        .await;
        engine.check_health().await?;

        Ok(WorkerContext {
            engine: Arc::new(engine),
            endpoint,
            // Batch results go to the output document, not to hooks.
            hooks: Arc::new(HookDispatcher::empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn forwarder_config_layers_file_and_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"user_port": 6000, "predict_route": "/generate"}}"#).unwrap();

        let config = load_forwarder_config(
            Some(file.path()),
            &["wrap_response=false".to_string()],
            false,
        )
        .unwrap();

        assert_eq!(config.user_port, 6000);
        assert_eq!(config.predict_route, "/generate");
        assert!(!config.wrap_response);
        assert!(config.serialize_results_as_string);
    }

    #[test]
    fn streaming_defaults_to_raw_results() {
        let config = load_forwarder_config(None, &[], true).unwrap();
        assert!(!config.serialize_results_as_string);
    }

    #[test]
    fn invalid_forwarder_config_is_rejected() {
        let err = load_forwarder_config(None, &["use_grpc=true".to_string()], false).unwrap_err();
        assert!(matches!(err, ConfigError::Unsupported(_) | ConfigError::Invalid(_)));

        let err = load_forwarder_config(None, &["novalue".to_string()], false).unwrap_err();
        assert!(matches!(err, ConfigError::BadOverride(_)));
    }

    #[test]
    fn batch_job_overrides_apply_before_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"output_data_path": "/tmp/o.json", "model_cfg": {{"model": "m"}},
                "content": {{"prompts": ["a"], "max_new_tokens": 2, "temperature": 0.0}}}}"#
        )
        .unwrap();

        let job = load_batch_job(file.path(), &["max_runtime_sec=60".to_string()]).unwrap();
        assert_eq!(job.max_runtime_sec, 60);

        assert!(load_batch_job(file.path(), &["data_parallelism=0".to_string()]).is_err());
    }

    #[test]
    fn missing_endpoint_config_means_no_hooks() {
        let endpoint = load_endpoint_config(None).unwrap();
        assert!(endpoint.post_inference_hooks.is_empty());
    }
}
