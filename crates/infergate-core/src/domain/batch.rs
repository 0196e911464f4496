//! Batch slots and per-item output types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Log probability of one generated token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenOutput {
    pub token: String,
    pub log_prob: f64,
}

/// Terminal output for one flat-schema batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOutput {
    pub text: String,
    pub num_prompt_tokens: u32,
    pub num_completion_tokens: u32,
    /// Present only when token log probabilities were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<TokenOutput>>,
}

/// Errors from slot bookkeeping.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("Slot {0} is out of range")]
    OutOfRange(usize),

    #[error("Slot {0} was already filled")]
    AlreadyFilled(usize),
}

/// Output position reserved for one batch item.
///
/// A slot moves from empty to filled at most once. A filled slot holds
/// either the item's terminal value or `None` for a failed item.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSlot<T> {
    index: usize,
    state: SlotState<T>,
}

#[derive(Debug, Clone, PartialEq)]
enum SlotState<T> {
    Empty,
    Filled(Option<T>),
}

impl<T> BatchSlot<T> {
    const fn new(index: usize) -> Self {
        Self {
            index,
            state: SlotState::Empty,
        }
    }

    /// Position of the request in the submitted batch.
    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn is_filled(&self) -> bool {
        matches!(self.state, SlotState::Filled(_))
    }

    fn fill(&mut self, value: Option<T>) -> Result<(), SlotError> {
        if self.is_filled() {
            return Err(SlotError::AlreadyFilled(self.index));
        }
        self.state = SlotState::Filled(value);
        Ok(())
    }

    fn into_value(self) -> Option<T> {
        match self.state {
            SlotState::Filled(value) => value,
            SlotState::Empty => None,
        }
    }
}

/// Fixed-size table of slots, one per submitted request.
///
/// Completion order is irrelevant: [`SlotTable::into_ordered`] always
/// yields values by original index, with `None` for failed or unfinished
/// slots.
#[derive(Debug, Clone)]
pub struct SlotTable<T> {
    slots: Vec<BatchSlot<T>>,
    filled: usize,
}

impl<T> SlotTable<T> {
    /// Reserve `len` empty slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(BatchSlot::new).collect(),
            filled: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots that have reached a terminal state.
    pub const fn filled(&self) -> usize {
        self.filled
    }

    pub fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Record the terminal value for `index`.
    pub fn fill(&mut self, index: usize, value: T) -> Result<(), SlotError> {
        self.fill_with(index, Some(value))
    }

    /// Record a terminal failure for `index`.
    pub fn fail(&mut self, index: usize) -> Result<(), SlotError> {
        self.fill_with(index, None)
    }

    fn fill_with(&mut self, index: usize, value: Option<T>) -> Result<(), SlotError> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(SlotError::OutOfRange(index))?;
        slot.fill(value)?;
        self.filled += 1;
        Ok(())
    }

    /// Indices that never reached a terminal state.
    pub fn pending(&self) -> Vec<usize> {
        self.slots
            .iter()
            .filter(|slot| !slot.is_filled())
            .map(BatchSlot::index)
            .collect()
    }

    /// Consume the table, yielding values ordered by index.
    pub fn into_ordered(self) -> Vec<Option<T>> {
        self.slots.into_iter().map(BatchSlot::into_value).collect()
    }
}

/// Which engine route a per-request batch item targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchItemKind {
    /// Plain completion (`prompt`).
    Completion,
    /// Chat completion (`messages`).
    Chat,
}

impl BatchItemKind {
    /// Engine route for this kind of item.
    pub const fn route(self) -> &'static str {
        match self {
            Self::Completion => "/v1/completions",
            Self::Chat => "/v1/chat/completions",
        }
    }
}

/// One individually parameterised request in a per-request batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    kind: BatchItemKind,
    body: Map<String, Value>,
}

impl BatchItem {
    /// Classify a raw item by shape. `messages` means chat, `prompt` means
    /// plain completion.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(body) = value else {
            return None;
        };
        let kind = if body.contains_key("messages") {
            BatchItemKind::Chat
        } else if body.contains_key("prompt") {
            BatchItemKind::Completion
        } else {
            return None;
        };
        Some(Self { kind, body })
    }

    pub const fn kind(&self) -> BatchItemKind {
        self.kind
    }

    pub const fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Body to send to the engine: the served model name replaces any
    /// caller-supplied model and streaming is forced off.
    pub fn engine_body(&self, model: &str) -> Value {
        let mut body = self.body.clone();
        body.retain(|_, v| !v.is_null());
        body.insert("model".to_string(), Value::String(model.to_string()));
        body.insert("stream".to_string(), Value::Bool(false));
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn slots_order_by_index_regardless_of_fill_order() {
        let mut table = SlotTable::new(3);
        table.fill(2, "c").unwrap();
        table.fill(0, "a").unwrap();
        table.fail(1).unwrap();
        assert!(table.is_complete());
        assert_eq!(table.into_ordered(), vec![Some("a"), None, Some("c")]);
    }

    #[test]
    fn slot_fills_at_most_once() {
        let mut table = SlotTable::new(1);
        table.fill(0, 1).unwrap();
        assert_eq!(table.fill(0, 2), Err(SlotError::AlreadyFilled(0)));
        assert_eq!(table.fail(0), Err(SlotError::AlreadyFilled(0)));
        assert_eq!(table.filled(), 1);
        assert_eq!(table.into_ordered(), vec![Some(1)]);
    }

    #[test]
    fn out_of_range_fill_is_rejected() {
        let mut table: SlotTable<u8> = SlotTable::new(2);
        assert_eq!(table.fill(2, 0), Err(SlotError::OutOfRange(2)));
    }

    #[test]
    fn pending_lists_unfilled_slots() {
        let mut table: SlotTable<u8> = SlotTable::new(3);
        table.fill(1, 0).unwrap();
        assert_eq!(table.pending(), vec![0, 2]);
        assert_eq!(table.into_ordered(), vec![None, Some(0), None]);
    }

    #[test]
    fn completion_output_omits_tokens_when_absent() {
        let out = CompletionOutput {
            text: "ok".into(),
            num_prompt_tokens: 2,
            num_completion_tokens: 1,
            tokens: None,
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(
            json,
            json!({"text": "ok", "num_prompt_tokens": 2, "num_completion_tokens": 1})
        );
    }

    #[test]
    fn batch_items_classify_by_shape() {
        let chat = BatchItem::from_value(json!({"messages": [], "model": "x"})).unwrap();
        assert_eq!(chat.kind(), BatchItemKind::Chat);
        assert_eq!(chat.kind().route(), "/v1/chat/completions");

        let completion = BatchItem::from_value(json!({"prompt": "hi"})).unwrap();
        assert_eq!(completion.kind(), BatchItemKind::Completion);

        assert!(BatchItem::from_value(json!({"foo": 1})).is_none());
        assert!(BatchItem::from_value(json!("prompt")).is_none());
    }

    #[test]
    fn engine_body_overrides_model_and_stream() {
        let item =
            BatchItem::from_value(json!({"prompt": "hi", "model": "user", "stream": true, "n": null}))
                .unwrap();
        let body = item.engine_body("served");
        assert_eq!(body, json!({"prompt": "hi", "model": "served", "stream": false}));
    }
}
