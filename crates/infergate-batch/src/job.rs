//! Batch job configuration and content loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use infergate_core::{BatchItem, ConfigError, SamplingParams};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::BatchError;

/// Environment variable naming the local weights folder.
pub const ENV_MODEL_WEIGHTS_FOLDER: &str = "MODEL_WEIGHTS_FOLDER";

/// Weights folder used when a checkpoint path is configured.
pub const DEFAULT_MODEL_WEIGHTS_FOLDER: &str = "./model_weights";

/// Weights folder from the environment, falling back to the default.
pub fn model_weights_folder() -> String {
    std::env::var(ENV_MODEL_WEIGHTS_FOLDER)
        .unwrap_or_else(|_| DEFAULT_MODEL_WEIGHTS_FOLDER.to_string())
}

const MAX_DATA_PARALLELISM: u32 = 64;
const DEFAULT_MAX_RUNTIME_SEC: u64 = 24 * 3600;
const MAX_RUNTIME_SEC_LIMIT: u64 = 2 * 24 * 3600;

/// Model settings for a batch job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchModelConfig {
    pub model: String,
    /// Fine-tuned weights to serve instead of the base model.
    #[serde(default)]
    pub checkpoint_path: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default = "default_num_shards")]
    pub num_shards: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub max_context_length: Option<u32>,
    /// Role of generated chat messages.
    #[serde(default)]
    pub response_role: Option<String>,
}

const fn default_num_shards() -> u32 {
    1
}

/// One batch completion job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJobConfig {
    #[serde(default)]
    pub input_data_path: Option<PathBuf>,
    pub output_data_path: PathBuf,
    /// Inline batch content; mutually exclusive with `input_data_path`.
    #[serde(default)]
    pub content: Option<Value>,
    pub model_cfg: BatchModelConfig,
    #[serde(default = "default_data_parallelism")]
    pub data_parallelism: u32,
    #[serde(default = "default_max_runtime_sec")]
    pub max_runtime_sec: u64,
    /// Cap on concurrently running items. Unbounded when unset.
    #[serde(default)]
    pub max_parallel: Option<usize>,
}

const fn default_data_parallelism() -> u32 {
    1
}

const fn default_max_runtime_sec() -> u64 {
    DEFAULT_MAX_RUNTIME_SEC
}

impl BatchJobConfig {
    /// Parse a job from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a job file.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_value(serde_json::from_str(&text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.content, &self.input_data_path) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(
                    "only one of content or input_data_path may be provided".into(),
                ));
            }
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "either content or input_data_path must be provided".into(),
                ));
            }
            _ => {}
        }
        if !(1..=MAX_DATA_PARALLELISM).contains(&self.data_parallelism) {
            return Err(ConfigError::Invalid(format!(
                "data_parallelism must be in 1..={MAX_DATA_PARALLELISM}, got {}",
                self.data_parallelism
            )));
        }
        if !(1..=MAX_RUNTIME_SEC_LIMIT).contains(&self.max_runtime_sec) {
            return Err(ConfigError::Invalid(format!(
                "max_runtime_sec must be in 1..={MAX_RUNTIME_SEC_LIMIT}, got {}",
                self.max_runtime_sec
            )));
        }
        if self.max_parallel == Some(0) {
            return Err(ConfigError::Invalid("max_parallel must be positive".into()));
        }
        if self.model_cfg.model.is_empty() {
            return Err(ConfigError::Invalid("model_cfg.model must be non-empty".into()));
        }
        Ok(())
    }

    /// Wall-clock budget for the whole job.
    pub const fn deadline(&self) -> Duration {
        Duration::from_secs(self.max_runtime_sec)
    }

    /// Model name the engine serves: the weights folder for fine-tuned
    /// checkpoints, the base model name otherwise.
    pub fn served_model_name(&self, weights_folder: &str) -> String {
        if self.model_cfg.checkpoint_path.is_some() {
            weights_folder.to_string()
        } else {
            self.model_cfg.model.clone()
        }
    }

    /// Inline content, or the parsed contents of `input_data_path`.
    pub async fn load_content(&self) -> Result<BatchContent, BatchError> {
        let raw = if let Some(content) = &self.content {
            content.clone()
        } else if let Some(path) = &self.input_data_path {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| BatchError::io(path, e))?;
            serde_json::from_str(&text)
                .map_err(|e| BatchError::InvalidContent(format!("{}: {e}", path.display())))?
        } else {
            return Err(ConfigError::Invalid("no batch content".into()).into());
        };
        let content = BatchContent::from_value(raw)?;
        info!(
            schema = content.schema(),
            items = content.len(),
            "Loaded batch content"
        );
        Ok(content)
    }
}

/// Flat batch: many prompts sharing one set of sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatBatch {
    pub prompts: Vec<String>,
    pub max_new_tokens: u32,
    pub temperature: f32,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub return_token_log_probs: bool,
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    #[serde(default)]
    pub top_k: Option<i32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub skip_special_tokens: Option<bool>,
    #[serde(default)]
    pub guided_json: Option<Value>,
    #[serde(default)]
    pub guided_regex: Option<String>,
    #[serde(default)]
    pub guided_choice: Option<Vec<String>>,
    #[serde(default)]
    pub guided_grammar: Option<String>,
}

impl FlatBatch {
    pub fn validate(&self) -> Result<(), BatchError> {
        let invalid = |msg: String| Err(BatchError::InvalidContent(msg));
        if !(0.0..=1.0).contains(&self.temperature) {
            return invalid(format!("temperature must be in [0, 1], got {}", self.temperature));
        }
        for (name, penalty) in [
            ("presence_penalty", self.presence_penalty),
            ("frequency_penalty", self.frequency_penalty),
        ] {
            if let Some(p) = penalty
                && !(0.0..=2.0).contains(&p)
            {
                return invalid(format!("{name} must be in [0, 2], got {p}"));
            }
        }
        if let Some(k) = self.top_k
            && k < -1
        {
            return invalid(format!("top_k must be >= -1, got {k}"));
        }
        if let Some(p) = self.top_p
            && !(p > 0.0 && p <= 1.0)
        {
            return invalid(format!("top_p must be in (0, 1], got {p}"));
        }
        self.sampling_params()
            .validate()
            .map_err(|e| BatchError::InvalidContent(e.to_string()))
    }

    /// Engine sampling parameters shared by every prompt.
    pub fn sampling_params(&self) -> SamplingParams {
        let defaults = SamplingParams::default();
        SamplingParams {
            max_tokens: self.max_new_tokens,
            temperature: self.temperature,
            stop: self.stop_sequences.clone(),
            presence_penalty: self.presence_penalty.unwrap_or(defaults.presence_penalty),
            frequency_penalty: self.frequency_penalty.unwrap_or(defaults.frequency_penalty),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            logprobs: self.return_token_log_probs.then_some(1),
            skip_special_tokens: self
                .skip_special_tokens
                .unwrap_or(defaults.skip_special_tokens),
            guided_json: self.guided_json.clone(),
            guided_regex: self.guided_regex.clone(),
            guided_choice: self.guided_choice.clone(),
            guided_grammar: self.guided_grammar.clone(),
        }
    }
}

/// Batch content in one of the two supported schemas.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchContent {
    /// `{prompts: [...], shared params}`.
    Flat(FlatBatch),
    /// A list of individually parameterised requests, all of one kind.
    PerRequest(Vec<BatchItem>),
}

impl BatchContent {
    /// Detect the schema and validate the content.
    ///
    /// Mixed chat and plain completion items are rejected here, before
    /// anything reaches the engine.
    pub fn from_value(value: Value) -> Result<Self, BatchError> {
        match value {
            Value::Object(_) => {
                let batch: FlatBatch = serde_json::from_value(value)
                    .map_err(|e| BatchError::InvalidContent(e.to_string()))?;
                batch.validate()?;
                Ok(Self::Flat(batch))
            }
            Value::Array(raw_items) => {
                let mut items = Vec::with_capacity(raw_items.len());
                for (index, raw) in raw_items.into_iter().enumerate() {
                    let item = BatchItem::from_value(raw).ok_or_else(|| {
                        BatchError::InvalidContent(format!(
                            "item {index} is neither a chat (`messages`) nor a completion (`prompt`) request"
                        ))
                    })?;
                    if let Some(first) = items.first().map(BatchItem::kind)
                        && item.kind() != first
                    {
                        return Err(BatchError::MixedShapes {
                            index,
                            expected: first,
                            found: item.kind(),
                        });
                    }
                    items.push(item);
                }
                Ok(Self::PerRequest(items))
            }
            other => Err(BatchError::InvalidContent(format!(
                "expected an object or an array, got {other}"
            ))),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Flat(batch) => batch.prompts.len(),
            Self::PerRequest(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn schema(&self) -> &'static str {
        match self {
            Self::Flat(_) => "v1",
            Self::PerRequest(_) => "v2",
        }
    }
}
