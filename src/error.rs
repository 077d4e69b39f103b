//! Error types for the todo-assist service.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors from the libSQL backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Intent classification errors.
///
/// Unparseable *text* is never an error — classifiers return
/// `IntentKind::Unknown` for that. These variants cover the classifier
/// itself failing (backend unreachable, malformed transport response).
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classifier backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("Classifier returned an unusable response: {0}")]
    InvalidResponse(String),
}
