//! Callback delivery hook.

use std::time::Duration;

use async_trait::async_trait;
use infergate_core::{CallbackAuth, HookInvocation, HookKind};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dispatcher::PostInferenceHook;
use crate::error::HookError;

/// Upper bound on one callback delivery.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs the result to the request's callback URL, or the endpoint default.
pub struct CallbackHook {
    client: reqwest::Client,
    default_url: Option<String>,
    default_auth: Option<CallbackAuth>,
    timeout: Duration,
}

impl CallbackHook {
    pub const fn new(
        client: reqwest::Client,
        default_url: Option<String>,
        default_auth: Option<CallbackAuth>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            default_url,
            default_auth,
            timeout,
        }
    }
}

/// Callback body: object results gain the task id.
fn callback_body(result: &Value, task_id: Option<&str>) -> Value {
    match (result, task_id) {
        (Value::Object(map), Some(task_id)) => {
            let mut map = map.clone();
            map.insert("task_id".to_string(), Value::String(task_id.to_string()));
            Value::Object(map)
        }
        _ => result.clone(),
    }
}

#[async_trait]
impl PostInferenceHook for CallbackHook {
    fn kind(&self) -> HookKind {
        HookKind::Callback
    }

    async fn run(&self, invocation: HookInvocation<'_>) -> Result<(), HookError> {
        let Some(url) = invocation
            .request
            .callback_url()
            .or(self.default_url.as_deref())
        else {
            warn!(task_id = ?invocation.task_id, "Callback hook enabled but no callback URL, skipping");
            return Ok(());
        };
        let auth = invocation
            .request
            .callback_auth()
            .or(self.default_auth.as_ref());

        let mut builder = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&callback_body(invocation.result, invocation.task_id));
        builder = match auth {
            Some(CallbackAuth::Bearer { token }) => builder.bearer_auth(token),
            Some(CallbackAuth::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            Some(CallbackAuth::None) | None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| HookError::CallbackTransport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HookError::CallbackStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        debug!(url, status = status.as_u16(), "Callback delivered");
        Ok(())
    }
}
