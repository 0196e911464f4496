//! Forwarder configuration.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ConfigError, parse_bool_flag};
use crate::envelope::EnvelopePolicy;

/// Environment variable overriding `serialize_results_as_string`.
pub const ENV_SERIALIZE_RESULTS_AS_STRING: &str = "SERIALIZE_RESULTS_AS_STRING";

/// Default port of the local engine.
pub const DEFAULT_ENGINE_PORT: u16 = 5005;

/// How to reach the local engine and how to shape requests and results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    pub user_port: u16,
    pub user_hostname: String,
    pub use_grpc: bool,
    pub predict_route: String,
    pub healthcheck_route: String,
    /// Batch routes are not supported; must stay unset.
    pub batch_route: Option<String>,
    /// Forward the nested `args` object instead of the full payload.
    pub model_engine_unwrap: bool,
    pub serialize_results_as_string: bool,
    /// Wrap results as `{"result": ...}`. Sync forwarding only.
    pub wrap_response: bool,
    /// Return the engine's HTTP status to the caller. Sync forwarding only.
    pub forward_http_status: bool,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            user_port: DEFAULT_ENGINE_PORT,
            user_hostname: "localhost".to_string(),
            use_grpc: false,
            predict_route: "/predict".to_string(),
            healthcheck_route: "/readyz".to_string(),
            batch_route: None,
            model_engine_unwrap: true,
            serialize_results_as_string: true,
            wrap_response: true,
            forward_http_status: false,
        }
    }
}

impl ForwarderConfig {
    /// Defaults for the streaming forwarder, which returns raw chunks.
    #[must_use]
    pub fn streaming() -> Self {
        Self {
            serialize_results_as_string: false,
            ..Self::default()
        }
    }

    /// Reject configurations the forwarders cannot serve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.use_grpc {
            return Err(ConfigError::Unsupported(
                "engine must be reached over HTTP; gRPC is not implemented".into(),
            ));
        }
        if self.batch_route.is_some() {
            return Err(ConfigError::Unsupported(
                "batch routes are not supported; forwarders serve single requests".into(),
            ));
        }
        for (name, route) in [
            ("healthcheck route", &self.healthcheck_route),
            ("predict route", &self.predict_route),
        ] {
            if route.is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must be non-empty")));
            }
            if !route.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "{name} must start with '/': {route}"
                )));
            }
        }
        if self.user_port == 0 {
            return Err(ConfigError::Invalid(format!(
                "invalid port value: {}",
                self.user_port
            )));
        }
        if self.user_hostname.is_empty() {
            return Err(ConfigError::Invalid("hostname must be non-empty".into()));
        }
        if self.user_hostname != "localhost" {
            return Err(ConfigError::Unsupported(format!(
                "only localhost engines are supported, got {}",
                self.user_hostname
            )));
        }
        Ok(())
    }

    /// Apply the `SERIALIZE_RESULTS_AS_STRING` environment override.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = lookup(ENV_SERIALIZE_RESULTS_AS_STRING);
        if let Some(flag) = parse_bool_flag(ENV_SERIALIZE_RESULTS_AS_STRING, value)? {
            warn!(
                previous = self.serialize_results_as_string,
                new = flag,
                "{ENV_SERIALIZE_RESULTS_AS_STRING} overrides configured setting"
            );
            self.serialize_results_as_string = flag;
        }
        Ok(())
    }

    fn endpoint(&self, route: &str) -> String {
        format!("http://{}:{}{}", self.user_hostname, self.user_port, route)
    }

    /// Full URL of the engine's predict route.
    pub fn predict_url(&self) -> String {
        self.endpoint(&self.predict_route)
    }

    /// Full URL of the engine's readiness route.
    pub fn healthcheck_url(&self) -> String {
        self.endpoint(&self.healthcheck_route)
    }

    /// Base URL of the engine (no route).
    pub fn base_url(&self) -> String {
        self.endpoint("")
    }

    /// Envelope policy derived from this configuration.
    pub const fn envelope_policy(&self) -> EnvelopePolicy {
        EnvelopePolicy {
            unwrap_args: self.model_engine_unwrap,
            serialize_results_as_string: self.serialize_results_as_string,
        }
    }

    /// Log the resolved settings once at load time.
    pub fn log_summary(&self) {
        info!(
            host = %self.user_hostname,
            port = self.user_port,
            predict = %self.predict_url(),
            healthcheck = %self.healthcheck_url(),
            unwrap = self.model_engine_unwrap,
            serialize_results_as_string = self.serialize_results_as_string,
            "Forwarding to local engine"
        );
    }
}
