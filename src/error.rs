//! Error types shared across the crate.

use std::path::PathBuf;

/// Failure reported by the model backend (transport, HTTP status, decoding).
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("request to model backend failed: {0}")]
    Transport(String),

    #[error("model backend error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode model backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err.to_string())
    }
}

/// Outcome of a submitted invocation that did not produce a response.
///
/// Deadline overruns are not errors: they resolve with the timeout sentinel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InvokeError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// The queue was dropped before the request was dispatched.
    #[error("invocation abandoned before dispatch")]
    Abandoned,

    #[error("prompt version {0} not found")]
    UnknownNode(u64),

    #[error("no prompt version is selected")]
    NoSelection,
}

/// Drafts the version tree refuses to store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("model name is empty")]
    EmptyModel,

    #[error("draft has no messages")]
    NoMessages,
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state blob is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("no state directory available; set PROMPT_STATE_PATH")]
    NoStateDir,
}
