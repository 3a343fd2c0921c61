use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    /// Missing or unusable service credential. Raised before any network attempt.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required request field is missing or out of bounds.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Audio conversion failed. Temporary artifacts are already removed.
    #[error("audio transcoding failed: {0}")]
    Transcode(String),

    /// The remote service sent events out of protocol order.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The remote service reported `task-failed`.
    #[error("remote task failed: {message}")]
    RemoteTask {
        code: Option<String>,
        message: String,
    },

    /// The connection closed or errored before a terminal event.
    #[error("transport error: {0}")]
    Transport(String),

    /// Reading or writing a result artifact failed.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl SpeechError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Validation(_) => "validation",
            Self::Transcode(_) => "transcode",
            Self::Protocol(_) => "protocol",
            Self::RemoteTask { .. } => "remote_task",
            Self::Transport(_) => "transport",
            Self::Persistence(_) => "persistence",
        }
    }

    /// Whether the failure originated at the remote service or the link to it.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Protocol(_) | Self::RemoteTask { .. } | Self::Transport(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SpeechError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
