use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    /// Request rejected locally before any network call.
    #[error("{0}")]
    Validation(String),

    /// Network or HTTP failure with no usable payload.
    #[error("request failed: {0}")]
    Transport(String),

    /// Explicit error payload from the backend, surfaced verbatim.
    #[error("{0}")]
    Backend(String),

    #[error("Training timed out after {attempts} status checks. Please try again.")]
    Timeout { attempts: u32 },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainingError {
    /// Whether the poller may count this failure as a spent attempt and keep going.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Backend(_) | Self::Json(_))
    }
}

impl From<reqwest::Error> for TrainingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self::Transport(format!("backend not reachable: {err}"))
        } else if err.is_decode() {
            Self::Transport(format!("malformed response body: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}
