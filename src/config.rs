//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;

/// Maximum length of a derived conversation title, in characters.
pub const TITLE_MAX_CHARS: usize = 50;

/// Server configuration, read from `TODO_ASSIST_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Path to the libSQL database file.
    pub db_path: String,
    /// Upper bound on a single intent-classification call.
    pub classify_timeout: Duration,
    /// Upper bound on a single store operation issued by the dispatcher.
    pub store_timeout: Duration,
    /// `token:user` pairs accepted by the static verifier, comma-separated.
    pub api_tokens: String,
    /// API key for the LLM-backed classifier. Absent means rules-only.
    pub model_api_key: Option<secrecy::SecretString>,
    /// Model name for the LLM-backed classifier.
    pub model: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            db_path: "./data/todo-assist.db".to_string(),
            classify_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            api_tokens: String::new(),
            model_api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
        }
    }
}

impl ServerConfig {
    /// Build a config from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let classify_timeout = parse_secs("TODO_ASSIST_CLASSIFY_TIMEOUT_SECS")?
            .unwrap_or(defaults.classify_timeout);
        let store_timeout =
            parse_secs("TODO_ASSIST_STORE_TIMEOUT_SECS")?.unwrap_or(defaults.store_timeout);

        Ok(Self {
            bind_addr: std::env::var("TODO_ASSIST_ADDR").unwrap_or(defaults.bind_addr),
            db_path: std::env::var("TODO_ASSIST_DB_PATH").unwrap_or(defaults.db_path),
            classify_timeout,
            store_timeout,
            api_tokens: std::env::var("TODO_ASSIST_API_TOKENS").unwrap_or_default(),
            model_api_key: std::env::var("TODO_ASSIST_API_KEY")
                .ok()
                .map(secrecy::SecretString::from),
            model: std::env::var("TODO_ASSIST_MODEL").unwrap_or(defaults.model),
        })
    }
}

fn parse_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => {
            let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected an integer number of seconds, got {raw:?}"),
            })?;
            Ok(Some(Duration::from_secs(secs)))
        }
        Err(_) => Ok(None),
    }
}
