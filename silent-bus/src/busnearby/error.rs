//! BusNearby client error types.

/// Errors from the BusNearby HTTP client.
///
/// `Timeout` and `ConnectionFailure` are transient and retried by the client
/// before they surface; `NotFound` and `InvalidResponse` are returned at once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The query matched nothing upstream
    #[error("not found: {0}")]
    NotFound(String),

    /// Network failure or unsuccessful HTTP status
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// The request did not complete within the per-attempt timeout
    #[error("timeout: {0}")]
    Timeout(String),

    /// The payload was not shaped as expected
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Whether the client retries this kind of failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::ConnectionFailure(_) | ApiError::Timeout(_))
    }

    /// Same kind, with the cause annotated once retries are used up.
    pub fn exhausted(self, retries: u32) -> Self {
        match self {
            ApiError::Timeout(msg) => {
                ApiError::Timeout(format!("{msg} (gave up after {retries} retries)"))
            }
            ApiError::ConnectionFailure(msg) => {
                ApiError::ConnectionFailure(format!("{msg} (gave up after {retries} retries)"))
            }
            other => other,
        }
    }

    /// Classify a transport error from reqwest.
    pub(crate) fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_decode() || err.is_builder() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::ConnectionFailure(err.to_string())
        }
    }
}
