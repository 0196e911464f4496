//! `key.path=value` overrides applied to a JSON config document.

use serde_json::{Map, Value};

use super::ConfigError;

/// Apply overrides of the form `a.b.c=value` to `config`.
///
/// Intermediate objects are created as needed. Values made only of digits
/// become integers, `true`/`false` become booleans, everything else is a
/// string.
pub fn apply_overrides<S: AsRef<str>>(
    config: &mut Value,
    overrides: &[S],
) -> Result<(), ConfigError> {
    for raw in overrides {
        let raw = raw.as_ref();
        let mut parts = raw.split('=');
        let (Some(key_path), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ConfigError::BadOverride(raw.to_string()));
        };
        let keys: Vec<&str> = key_path.split('.').collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "empty key segment in override '{raw}'"
            )));
        }
        set_value(config, &keys, parse_scalar(value)).map_err(|reason| {
            ConfigError::Invalid(format!("cannot set {key_path} to {value}: {reason}"))
        })?;
    }
    Ok(())
}

fn parse_scalar(value: &str) -> Value {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(n) = value.parse::<u64>() {
            return Value::from(n);
        }
    }
    match value {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(value.to_string()),
    }
}

fn set_value(config: &mut Value, keys: &[&str], value: Value) -> Result<(), String> {
    let Value::Object(map) = config else {
        return Err("parent is not an object".to_string());
    };
    match keys {
        [] => Err("empty key path".to_string()),
        [last] => {
            map.insert((*last).to_string(), value);
            Ok(())
        }
        [first, rest @ ..] => {
            let child = map
                .entry((*first).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            set_value(child, rest, value)
        }
    }
}
