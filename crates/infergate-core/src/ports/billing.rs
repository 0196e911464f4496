//! Billing queue port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SinkError;

/// One billable inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    /// Unique per record; consumers deduplicate on it.
    pub idempotency_token: String,
    pub user_id: String,
    pub endpoint_name: String,
    pub bundle_name: String,
    pub task_id: Option<String>,
    pub tags: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Destination for billing records.
#[async_trait]
pub trait BillingQueue: Send + Sync {
    /// Enqueue `record` on `queue`.
    async fn enqueue(&self, queue: &str, record: &BillingRecord) -> Result<(), SinkError>;
}
