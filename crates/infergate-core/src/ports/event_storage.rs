//! Durable inference event storage port.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::SinkError;

/// Durable record of one completed inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceEvent {
    pub request_id: Option<String>,
    pub endpoint_id: Option<String>,
    pub endpoint_name: String,
    pub bundle_id: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub request: Value,
    pub response: Value,
    pub timestamp: DateTime<Utc>,
}

/// Append-only sink for inference events.
#[async_trait]
pub trait EventStorage: Send + Sync {
    async fn put(&self, event: &InferenceEvent) -> Result<(), SinkError>;
}
