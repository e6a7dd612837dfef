//! Error types for vocab-voice

use std::io;
use thiserror::Error;

/// Main error type for vocab-voice
///
/// Only `InvalidInput` ever escapes `Orchestrator::play`. The backend
/// variants describe individual attempts and end up in diagnostics.
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend '{0}' timed out")]
    BackendTimeout(String),

    #[error("Backend '{backend}' rejected playback: {reason}")]
    BackendRejected { backend: String, reason: String },

    #[error("Audio permission not granted yet")]
    PermissionNotGranted,

    #[error("Every audio backend degraded")]
    AllBackendsDegraded,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for vocab-voice operations
pub type Result<T> = std::result::Result<T, VoiceError>;

impl VoiceError {
    /// True for the one error class callers of `play` must handle
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, VoiceError::InvalidInput(_))
    }
}

impl From<String> for VoiceError {
    fn from(s: String) -> Self {
        VoiceError::Other(s)
    }
}

impl From<&str> for VoiceError {
    fn from(s: &str) -> Self {
        VoiceError::Other(s.to_string())
    }
}

impl From<hound::Error> for VoiceError {
    fn from(e: hound::Error) -> Self {
        VoiceError::AudioDecode(e.to_string())
    }
}
