//! Request/response envelope rules.
//!
//! Callers may wrap a request as `{"args": {...}}` and expect results as
//! `{"result": ...}`, where the result is either the raw JSON value or the
//! value serialized into a JSON string. Whether the string form is used is
//! decided once per request with a three-level precedence:
//!
//! 1. an explicit call-level flag,
//! 2. the `serialize_results_as_string` key in the payload (outer payload
//!    first, then inside `args` when unwrapping),
//! 3. the configured default.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

/// Payload key that overrides the configured serialization mode.
pub const KEY_SERIALIZE_RESULTS_AS_STRING: &str = "serialize_results_as_string";

/// Key of the nested request body in a wrapped payload.
const KEY_ARGS: &str = "args";

/// Key of the result in a wrapped response.
const KEY_RESULT: &str = "result";

/// Configured envelope behaviour for one forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopePolicy {
    /// Forward the nested `args` object instead of the outer payload.
    /// A non-object `args` leaves the payload as is.
    pub unwrap_args: bool,
    /// Default for serializing results as a JSON string.
    pub serialize_results_as_string: bool,
}

/// Per-request envelope decision.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Body to send to the engine.
    pub body: Value,
    /// Whether the result is serialized as a string inside `{"result": ...}`.
    pub serialize_as_string: bool,
}

impl EnvelopePolicy {
    /// Decide the engine body and serialization mode for a payload.
    pub fn resolve(&self, payload: &Value, call_override: Option<bool>) -> Envelope {
        let mut flag = call_override.or_else(|| self.payload_flag(payload));

        let body = if self.unwrap_args {
            if let Value::Object(map) = payload {
                info!(keys = ?map.keys().collect::<Vec<_>>(), "Unwrapping payload");
            }
            let inner = payload
                .get(KEY_ARGS)
                .filter(|args| args.is_object())
                .unwrap_or(payload);
            if flag.is_none() {
                flag = self.payload_flag(inner);
            }
            inner.clone()
        } else {
            payload.clone()
        };

        Envelope {
            body,
            serialize_as_string: flag.unwrap_or(self.serialize_results_as_string),
        }
    }

    /// Read the serialization flag from a payload, if present.
    ///
    /// A present but non-boolean value falls back to the configured default.
    fn payload_flag(&self, payload: &Value) -> Option<bool> {
        let value = payload.get(KEY_SERIALIZE_RESULTS_AS_STRING)?;
        if let Some(flag) = value.as_bool() {
            warn!(
                configured = self.serialize_results_as_string,
                payload = flag,
                "Payload overrides {KEY_SERIALIZE_RESULTS_AS_STRING}"
            );
            Some(flag)
        } else {
            error!(
                value = %value,
                default = self.serialize_results_as_string,
                "Expected a boolean for {KEY_SERIALIZE_RESULTS_AS_STRING}, using default"
            );
            Some(self.serialize_results_as_string)
        }
    }
}

/// Wrap an engine result as `{"result": ...}`.
pub fn wrap_result(result: Value, as_string: bool) -> Result<Value, serde_json::Error> {
    let inner = if as_string {
        Value::String(to_spaced_json(&result)?)
    } else {
        result
    };
    let mut map = Map::with_capacity(1);
    map.insert(KEY_RESULT.to_string(), inner);
    Ok(Value::Object(map))
}

/// Serialize with `", "` and `": "` separators.
///
/// Downstream consumers compare serialized results byte-for-byte against
/// the conventional spaced layout, so the compact serde form is not used.
pub fn to_spaced_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut buf = Vec::with_capacity(128);
    let mut ser = Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(<serde_json::Error as serde::ser::Error>::custom)
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
