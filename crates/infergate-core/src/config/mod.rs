//! Static per-process configuration.
//!
//! Values come from serde defaults, an optional JSON file, `key.path=value`
//! overrides and a small set of environment variables. Environment lookups
//! go through a caller-supplied function so precedence rules can be tested
//! without touching the process environment.

mod endpoint;
mod forwarder;
mod overrides;

use thiserror::Error;

pub use endpoint::{CallbackAuthConfig, EndpointConfig};
pub use forwarder::{ENV_SERIALIZE_RESULTS_AS_STRING, ForwarderConfig};
pub use overrides::apply_overrides;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A requested feature is not supported.
    #[error("Unsupported configuration: {0}")]
    Unsupported(String),

    /// An environment variable has an unparseable value.
    #[error("Unrecognized value for env var '{name}': expecting 'true' or 'false' but got '{value}'")]
    BadEnvBool { name: String, value: String },

    /// A `key=value` override is malformed.
    #[error("Config override '{0}' must contain exactly one '='")]
    BadOverride(String),

    /// Reading the config file failed.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Parsing the config failed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Parse a `true`/`false` flag, case-insensitive and trimmed.
///
/// Returns `Ok(None)` when the variable is unset.
pub fn parse_bool_flag(name: &str, value: Option<String>) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = value else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(Some(true)),
        "false" => Ok(Some(false)),
        other => Err(ConfigError::BadEnvBool {
            name: name.to_string(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_flag_parsing() {
        assert_eq!(parse_bool_flag("X", None).unwrap(), None);
        assert_eq!(parse_bool_flag("X", Some(" TRUE ".into())).unwrap(), Some(true));
        assert_eq!(parse_bool_flag("X", Some("false".into())).unwrap(), Some(false));
        let err = parse_bool_flag("X", Some("1".into())).unwrap_err();
        assert!(err.to_string().contains("'X'"));
    }
}
