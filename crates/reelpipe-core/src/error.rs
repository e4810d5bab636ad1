use thiserror::Error;

use crate::retry::ApiErrorKind;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config not found: run 'reelpipe config init'")]
    NotInitialized,

    #[error("missing required config key '{0}'")]
    MissingConfig(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid status '{0}': expected pending, processing, completed or failed")]
    InvalidStatus(String),

    #[error("invalid status transition for row {row}: {from} -> {to}")]
    InvalidTransition { row: usize, from: String, to: String },

    #[error("reel not found in sheet: {0}")]
    ReelNotFound(String),

    #[error("row {0} is out of range")]
    RowOutOfRange(usize),

    #[error("{kind} error from {service} (HTTP {status}): {message}")]
    Api {
        service: &'static str,
        kind: ApiErrorKind,
        status: u16,
        message: String,
    },

    #[error("transport error talking to {service}: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("failed to obtain access token: {0}")]
    Auth(String),

    #[error("yt-dlp is not installed or not on PATH")]
    YtDlpMissing,

    #[error("yt-dlp failed: {0}")]
    Tool(String),

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("invalid caption: {0}")]
    InvalidCaption(String),

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Category used by the retry loop and for user-facing hints.
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            PipelineError::Api { kind, .. } => Some(*kind),
            PipelineError::Transport { .. } => Some(ApiErrorKind::Transport),
            _ => None,
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            PipelineError::YtDlpMissing => Some("install yt-dlp: pip install -U yt-dlp"),
            PipelineError::Browser(_) => {
                Some("is chromedriver running? start it with: chromedriver --port=9515")
            }
            PipelineError::Auth(_) => {
                Some("set google.token_command (e.g. 'gcloud auth print-access-token') or export the token env var")
            }
            other => other.api_kind().map(|k| k.hint()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
