use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BinderError {
    /// An update or delete named an item that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Share code not recognized: {0}")]
    MalformedCode(String),
    #[error("Import source is not valid JSON: {0}")]
    MalformedImport(String),
    /// No input hook, synthesizer or clipboard could be reached.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("Could not register trigger '{pattern}': {reason}")]
    RegistrationFailure { pattern: String, reason: String },
    #[error("Unknown content area: {0}")]
    UnknownArea(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Keyboard controller error: {0}")]
    Enigo(String),
    #[error("Clipboard error: {0}")]
    Clipboard(String),
    #[error("Daemon is not running")]
    DaemonNotRunning,
    #[error("Invalid PID in daemon file")]
    InvalidPid,
    #[error("Error: {0}")]
    Other(String),
}

impl BinderError {
    pub fn registration(pattern: &str, reason: impl Into<String>) -> Self {
        BinderError::RegistrationFailure {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BinderError>;
