//! Endpoint identity and hook configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::domain::{CallbackAuth, HookKind};

/// Default callback credentials configured for the endpoint.
pub type CallbackAuthConfig = CallbackAuth;

/// Static description of the endpoint this process serves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub endpoint_name: String,
    pub endpoint_id: Option<String>,
    pub endpoint_type: Option<String>,
    pub bundle_name: String,
    pub bundle_id: Option<String>,
    pub user_id: String,
    /// Names of the hooks to run after each completed request.
    pub post_inference_hooks: Vec<String>,
    pub billing_queue: Option<String>,
    pub billing_tags: Option<serde_json::Value>,
    pub default_callback_url: Option<String>,
    pub default_callback_auth: Option<CallbackAuthConfig>,
    pub labels: BTreeMap<String, String>,
}

impl EndpointConfig {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Parse the configured hook names.
    pub fn hook_kinds(&self) -> Result<Vec<HookKind>, ConfigError> {
        let mut kinds = Vec::with_capacity(self.post_inference_hooks.len());
        for name in &self.post_inference_hooks {
            let kind = name.parse::<HookKind>().map_err(ConfigError::Invalid)?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}
