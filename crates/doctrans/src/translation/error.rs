use thiserror::Error;

/// Failure of a call to the remote translation service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// The service answered with a non-success status.
    #[error("ServiceError: translation service returned {status}: {body}")]
    Service { status: u16, body: String },

    /// No answer at all (connection refused, reset or timed out).
    #[error("ServiceUnavailable: {0}")]
    Unavailable(String),

    /// The request could not be built or was rejected before being sent.
    #[error("RequestError: {0}")]
    Request(String),
}

impl TranslateError {
    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Service { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Self::Unavailable(_) => true,
            Self::Request(_) => false,
        }
    }
}
