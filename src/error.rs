use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiftError {
    #[error("classifier call failed: {message}")]
    Classifier {
        message: String,
        status: Option<u16>,
    },

    #[error("classifier response cannot be mapped to submitted items: {0}")]
    MalformedResponse(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("feedback log error: {0}")]
    FeedbackLog(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SiftError {
    /// Returns true for transient errors where a later retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Classifier { status, .. } => {
                // 5xx = server error (retryable), 4xx = client error (not retryable)
                // status: None = ambiguous (timeout, connection), treat as transient
                status.is_none_or(|s| s >= 500)
            }
            // Never retry a response we could not map: the same batch against
            // a classifier that answered nonsense once must go through a fresh
            // run, not an automatic loop.
            Self::MalformedResponse(_) => false,
            Self::Storage(_) => false,
            Self::FeedbackLog(_) => false,
            Self::Config(_) => false,
        }
    }
}
