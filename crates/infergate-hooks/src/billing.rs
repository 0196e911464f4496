//! Billing hook.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use infergate_core::{
    BillingQueue, BillingRecord, EndpointConfig, HookInvocation, HookKind, SinkError,
};
use tracing::info;

use crate::dispatcher::PostInferenceHook;
use crate::error::HookError;

/// Emits one billing record per completed request.
pub struct BillingHook {
    queue_name: String,
    user_id: String,
    endpoint_name: String,
    bundle_name: String,
    tags: Option<serde_json::Value>,
    queue: Arc<dyn BillingQueue>,
}

impl BillingHook {
    pub fn new(config: &EndpointConfig, queue_name: String, queue: Arc<dyn BillingQueue>) -> Self {
        Self {
            queue_name,
            user_id: config.user_id.clone(),
            endpoint_name: config.endpoint_name.clone(),
            bundle_name: config.bundle_name.clone(),
            tags: config.billing_tags.clone(),
            queue,
        }
    }

    fn record(&self, task_id: Option<&str>) -> BillingRecord {
        BillingRecord {
            idempotency_token: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            endpoint_name: self.endpoint_name.clone(),
            bundle_name: self.bundle_name.clone(),
            task_id: task_id.map(str::to_string),
            tags: self.tags.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl PostInferenceHook for BillingHook {
    fn kind(&self) -> HookKind {
        HookKind::Billing
    }

    async fn run(&self, invocation: HookInvocation<'_>) -> Result<(), HookError> {
        let record = self.record(invocation.task_id);
        self.queue.enqueue(&self.queue_name, &record).await?;
        Ok(())
    }
}

/// Billing queue that emits records as structured log events.
///
/// Used when no external queue is wired in; a log shipper picks the
/// `billing` target up downstream.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBillingQueue;

#[async_trait]
impl BillingQueue for TracingBillingQueue {
    async fn enqueue(&self, queue: &str, record: &BillingRecord) -> Result<(), SinkError> {
        let payload = serde_json::to_string(record)?;
        info!(target: "billing", queue, record = %payload, "billing record");
        Ok(())
    }
}
